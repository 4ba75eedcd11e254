//! Child listing orderings applied by the HTTP layer.

use std::cmp::Ordering;
use std::sync::Arc;

use super::entry::Entry;

/// The six named orderings a directory page can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    AlphabetAsc,
    AlphabetDesc,
    LastModified,
    FirstModified,
    Kind,
    Size,
}

impl SortOrder {
    pub const ALL: [SortOrder; 6] = [
        SortOrder::AlphabetAsc,
        SortOrder::AlphabetDesc,
        SortOrder::LastModified,
        SortOrder::FirstModified,
        SortOrder::Kind,
        SortOrder::Size,
    ];

    /// Label used in the sort cookie and the page selector.
    pub fn label(self) -> &'static str {
        match self {
            SortOrder::AlphabetAsc => "A-Z",
            SortOrder::AlphabetDesc => "Z-A",
            SortOrder::LastModified => "Last Modified",
            SortOrder::FirstModified => "First Modified",
            SortOrder::Kind => "Type",
            SortOrder::Size => "Size",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|order| order.label() == label)
    }

    pub fn apply(self, items: &mut [Arc<Entry>]) {
        match self {
            SortOrder::AlphabetAsc => items.sort_by(|a, b| natural_cmp(&a.name, &b.name)),
            SortOrder::AlphabetDesc => items.sort_by(|a, b| natural_cmp(&b.name, &a.name)),
            SortOrder::LastModified => items.sort_by(|a, b| b.mod_time.cmp(&a.mod_time)),
            SortOrder::FirstModified => items.sort_by(|a, b| a.mod_time.cmp(&b.mod_time)),
            SortOrder::Kind => items.sort_by(|a, b| {
                (b.kind.value(), &b.name).cmp(&(a.kind.value(), &a.name))
            }),
            SortOrder::Size => items.sort_by(|a, b| b.origin_size.cmp(&a.origin_size)),
        }
    }
}

/// Compare names numerically when both parse as integers, otherwise
/// lexicographically, so `9.jpg` sorts before `10.jpg`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let stem = |name: &str| {
        name.rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| name.to_string())
    };
    match (stem(a).parse::<i64>(), stem(b).parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::entry::ContentKind;
    use std::path::PathBuf;

    fn entry(name: &str, kind: ContentKind, mod_time: i64, size: u64) -> Arc<Entry> {
        Arc::new(Entry {
            id: name.to_string(),
            absolute_path: PathBuf::from(name),
            relative_path: name.to_string(),
            name: name.to_string(),
            mod_time,
            origin_size: size,
            is_dir: kind == ContentKind::Dir,
            extension: String::new(),
            kind,
            duration: 0.0,
            resolution: Default::default(),
            preview: Default::default(),
        })
    }

    fn names(items: &[Arc<Entry>]) -> Vec<&str> {
        items.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn alphabetical_is_numeric_aware() {
        let mut items = vec![
            entry("10.jpg", ContentKind::Image, 0, 0),
            entry("9.jpg", ContentKind::Image, 0, 0),
            entry("2.jpg", ContentKind::Image, 0, 0),
        ];
        SortOrder::AlphabetAsc.apply(&mut items);
        assert_eq!(names(&items), ["2.jpg", "9.jpg", "10.jpg"]);

        SortOrder::AlphabetDesc.apply(&mut items);
        assert_eq!(names(&items), ["10.jpg", "9.jpg", "2.jpg"]);
    }

    #[test]
    fn alphabetical_falls_back_to_lexicographic() {
        let mut items = vec![
            entry("zebra.png", ContentKind::Image, 0, 0),
            entry("apple.png", ContentKind::Image, 0, 0),
        ];
        SortOrder::AlphabetAsc.apply(&mut items);
        assert_eq!(names(&items), ["apple.png", "zebra.png"]);
    }

    #[test]
    fn modified_orders_by_mtime() {
        let mut items = vec![
            entry("old", ContentKind::Other, 100, 0),
            entry("new", ContentKind::Other, 300, 0),
            entry("mid", ContentKind::Other, 200, 0),
        ];
        SortOrder::LastModified.apply(&mut items);
        assert_eq!(names(&items), ["new", "mid", "old"]);

        SortOrder::FirstModified.apply(&mut items);
        assert_eq!(names(&items), ["old", "mid", "new"]);
    }

    #[test]
    fn kind_sorts_by_value_then_reverse_name() {
        let mut items = vec![
            entry("clip.mp4", ContentKind::Video, 0, 0),
            entry("a-dir", ContentKind::Dir, 0, 0),
            entry("b.jpg", ContentKind::Image, 0, 0),
            entry("a.jpg", ContentKind::Image, 0, 0),
        ];
        SortOrder::Kind.apply(&mut items);
        assert_eq!(names(&items), ["a-dir", "b.jpg", "a.jpg", "clip.mp4"]);
    }

    #[test]
    fn size_is_descending() {
        let mut items = vec![
            entry("small", ContentKind::Other, 0, 10),
            entry("large", ContentKind::Other, 0, 1000),
        ];
        SortOrder::Size.apply(&mut items);
        assert_eq!(names(&items), ["large", "small"]);
    }

    #[test]
    fn labels_round_trip() {
        for order in SortOrder::ALL {
            assert_eq!(SortOrder::from_label(order.label()), Some(order));
        }
        assert_eq!(SortOrder::from_label("nope"), None);
    }
}
