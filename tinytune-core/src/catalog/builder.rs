//! Concurrent index builder.
//!
//! Merges a fresh crawl into a possibly-existing catalog: decode, an
//! optional stale-entry sweep, a semaphore-bounded preview dispatch loop
//! and the secondary-index rebuild. Runs once at startup with a single
//! writer; worker tasks own their entry until they publish it on the
//! result channel.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::crawler::FileInfo;
use crate::error::{CatalogError, PreviewError};
use crate::preview::PreviewGenerator;

use super::entry::Entry;
use super::format::{self, RawCatalog};
use super::Catalog;

type Callback = Box<dyn Fn() + Send + Sync>;

pub struct Builder {
    previewer: Option<Arc<dyn PreviewGenerator>>,
    workers: usize,
    remove_stale: bool,
    on_progress: Option<Callback>,
    on_new_file: Option<Callback>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("workers", &self.workers)
            .field("remove_stale", &self.remove_stale)
            .field("previewer", &self.previewer.is_some())
            .finish()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            previewer: None,
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            remove_stale: false,
            on_progress: None,
            on_new_file: None,
        }
    }

    /// Preview generator for new media entries; without one, every entry
    /// completes immediately with no preview.
    pub fn previewer(mut self, previewer: Arc<dyn PreviewGenerator>) -> Self {
        self.previewer = Some(previewer);
        self
    }

    /// Upper bound on in-flight preview tasks.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Drop entries whose path vanished from the crawl and compact the
    /// preview blob.
    pub fn remove_stale(mut self, enabled: bool) -> Self {
        self.remove_stale = enabled;
        self
    }

    /// Called once per dispatched crawl item.
    pub fn on_progress<F: Fn() + Send + Sync + 'static>(mut self, callback: F) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Called once per entry merged into the catalog.
    pub fn on_new_file<F: Fn() + Send + Sync + 'static>(mut self, callback: F) -> Self {
        self.on_new_file = Some(Box::new(callback));
        self
    }

    /// Run the build: decode `existing` (if any), diff it against the
    /// crawl and produce the final catalog. Cancellation stops dispatch
    /// without error; results already in flight still merge.
    pub async fn build<R: Read>(
        self,
        existing: Option<R>,
        mut files: Vec<FileInfo>,
        cancel: &CancellationToken,
    ) -> Result<Catalog, CatalogError> {
        let mut raw = match existing {
            Some(mut reader) => format::decode(&mut reader)?,
            None => RawCatalog::default(),
        };

        let mut dirty = false;
        if self.remove_stale {
            dirty |= sweep_stale(&mut raw, &files);
        }

        let mut entries: HashMap<String, Entry> = raw
            .entries
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        let mut blob = raw.blob;
        let mut by_path: HashMap<String, String> = entries
            .values()
            .map(|entry| (entry.relative_path.clone(), entry.id.clone()))
            .collect();

        // Heaviest first, so the longest previews start earliest and
        // their tails overlap the cheap remainder.
        files.sort_by(|a, b| b.size.cmp(&a.size));

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let (tx, mut rx) = mpsc::channel::<(Entry, Vec<u8>)>(files.len().max(1));

        for file in &files {
            let entry = Entry::from_file(file);
            if let Some(progress) = &self.on_progress {
                progress();
            }

            if entries.contains_key(&entry.id) {
                continue; // unchanged since the last run
            }
            if let Some(old_id) = by_path.insert(entry.relative_path.clone(), entry.id.clone()) {
                if old_id != entry.id {
                    // Same path, new mtime. The old preview bytes become
                    // dead blob space until the next stale sweep.
                    entries.remove(&old_id);
                    dirty = true;
                }
            }

            let Some(previewer) = self.previewer.as_ref().filter(|_| !entry.is_dir) else {
                if tx.send((entry, Vec::new())).await.is_err() {
                    break;
                }
                continue;
            };

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let previewer = previewer.clone();
            let results = tx.clone();
            let cancel = cancel.clone();
            let mut entry = entry;
            tokio::spawn(async move {
                let _permit = permit;
                match previewer.pull(&cancel, &entry).await {
                    Ok(preview) => {
                        entry.duration = preview.duration;
                        entry.resolution = preview.resolution;
                        entry.preview.length = preview.data.len() as u32;
                        let _ = results.send((entry, preview.data)).await;
                    }
                    Err(PreviewError::Cancelled) => {}
                    Err(error) => {
                        warn!(path = %entry.relative_path, %error, "preview failed");
                        let _ = results.send((entry, Vec::new())).await;
                    }
                }
            });
        }
        drop(tx);

        while let Some((mut entry, data)) = rx.recv().await {
            if let Some(new_file) = &self.on_new_file {
                new_file();
            }
            if entry.preview.length != 0 {
                entry.preview.offset = blob.len() as u32;
                blob.extend_from_slice(&data);
            }
            entries.insert(entry.id.clone(), entry);
            dirty = true;
        }

        Ok(Catalog::freeze(entries, blob, dirty))
    }
}

/// Drop decoded entries whose relative path is absent from the crawl and
/// rebuild the blob from the survivors, removing every gap. Returns
/// whether anything changed.
fn sweep_stale(raw: &mut RawCatalog, files: &[FileInfo]) -> bool {
    let alive: HashSet<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();

    let before = raw.entries.len();
    raw.entries
        .retain(|entry| alive.contains(entry.relative_path.as_str()));
    let removed = before - raw.entries.len();

    let mut order: Vec<usize> = (0..raw.entries.len())
        .filter(|&i| raw.entries[i].preview.length != 0)
        .collect();
    order.sort_by_key(|&i| raw.entries[i].preview.offset);

    let mut blob = Vec::new();
    for index in order {
        let entry = &mut raw.entries[index];
        let start = entry.preview.offset as usize;
        let end = start + entry.preview.length as usize;
        match raw.blob.get(start..end) {
            Some(slice) => {
                entry.preview.offset = blob.len() as u32;
                blob.extend_from_slice(slice);
            }
            None => {
                warn!(
                    path = %entry.relative_path,
                    "dropping preview with out-of-range blob window"
                );
                entry.preview = Default::default();
            }
        }
    }

    let changed = removed > 0 || blob != raw.blob;
    raw.blob = blob;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::{PreviewData, PreviewSource};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub generator: previews are the relative path bytes.
    struct PathBytes {
        pulls: AtomicUsize,
    }

    impl PathBytes {
        fn new() -> Arc<Self> {
            Arc::new(PathBytes {
                pulls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PreviewGenerator for PathBytes {
        async fn pull(
            &self,
            _cancel: &CancellationToken,
            source: &(dyn PreviewSource + '_),
        ) -> Result<PreviewData, PreviewError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(PreviewData {
                data: source.relative_path().as_bytes().to_vec(),
                resolution: Default::default(),
                duration: 0.0,
            })
        }
    }

    fn file(relative_path: &str, mod_time: i64, size: u64, is_dir: bool) -> FileInfo {
        FileInfo {
            absolute_path: PathBuf::from("/library").join(relative_path),
            relative_path: relative_path.to_string(),
            name: relative_path.rsplit('/').next().unwrap().to_string(),
            mod_time,
            size,
            is_dir,
        }
    }

    fn encode(catalog: &Catalog) -> Vec<u8> {
        let mut buf = Vec::new();
        catalog.encode(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn builds_entries_and_previews_from_scratch() {
        let files = vec![
            file("albums", 100, 0, true),
            file("albums/a.jpg", 100, 3, false),
            file("b.jpg", 100, 9, false),
        ];
        let catalog = Builder::new()
            .previewer(PathBytes::new())
            .build(None::<&[u8]>, files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(catalog.len(), 3);
        assert!(catalog.is_dirty());

        let id = crate::catalog::entry::derive_id("b.jpg", 100);
        let entry = catalog.pull(&id).unwrap();
        assert_eq!(entry.preview.length, 5);
        assert_eq!(
            catalog.pull_preview(&id).unwrap(),
            Some(&b"b.jpg"[..])
        );

        let dir_id = crate::catalog::entry::derive_id("albums", 100);
        assert!(catalog.pull(&dir_id).unwrap().is_dir);
        assert_eq!(catalog.pull_preview(&dir_id).unwrap(), None);
    }

    #[tokio::test]
    async fn reindex_over_unchanged_files_is_clean() {
        let files = vec![file("a.jpg", 100, 3, false), file("b.jpg", 200, 4, false)];
        let generator = PathBytes::new();

        let first = Builder::new()
            .previewer(generator.clone())
            .build(None::<&[u8]>, files.clone(), &CancellationToken::new())
            .await
            .unwrap();
        let persisted = encode(&first);

        let second = Builder::new()
            .previewer(generator.clone())
            .build(
                Some(persisted.as_slice()),
                files,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!second.is_dirty());
        assert_eq!(second.len(), first.len());
        assert_eq!(generator.pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn modified_files_replace_their_old_entry() {
        let generator = PathBytes::new();
        let first = Builder::new()
            .previewer(generator.clone())
            .build(
                None::<&[u8]>,
                vec![file("a.jpg", 100, 3, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let persisted = encode(&first);

        let old_id = crate::catalog::entry::derive_id("a.jpg", 100);
        let new_id = crate::catalog::entry::derive_id("a.jpg", 999);

        let second = Builder::new()
            .previewer(generator)
            .build(
                Some(persisted.as_slice()),
                vec![file("a.jpg", 999, 3, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(second.is_dirty());
        assert_eq!(second.len(), 1);
        assert!(second.pull(&old_id).is_err());
        assert_eq!(
            second.pull_preview(&new_id).unwrap(),
            Some(&b"a.jpg"[..])
        );
    }

    #[tokio::test]
    async fn stale_sweep_drops_vanished_entries_and_compacts_the_blob() {
        let generator = PathBytes::new();
        let first = Builder::new()
            .previewer(generator.clone())
            .build(
                None::<&[u8]>,
                vec![
                    file("gone.jpg", 100, 8, false),
                    file("kept.jpg", 100, 2, false),
                ],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let persisted = encode(&first);

        let second = Builder::new()
            .previewer(generator)
            .remove_stale(true)
            .build(
                Some(persisted.as_slice()),
                vec![file("kept.jpg", 100, 2, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(second.is_dirty());
        assert_eq!(second.len(), 1);
        let kept_id = crate::catalog::entry::derive_id("kept.jpg", 100);
        let kept = second.pull(&kept_id).unwrap();
        assert_eq!(kept.preview.offset, 0);
        assert_eq!(second.blob().len(), kept.preview.length as usize);
        assert_eq!(
            second.pull_preview(&kept_id).unwrap(),
            Some(&b"kept.jpg"[..])
        );
    }

    #[tokio::test]
    async fn rename_with_same_mtime_changes_the_id_but_keeps_bytes() {
        let generator = PathBytes::new();
        let first = Builder::new()
            .previewer(generator.clone())
            .build(
                None::<&[u8]>,
                vec![file("photo.jpg", 100, 4, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let persisted = encode(&first);

        let second = Builder::new()
            .previewer(generator)
            .remove_stale(true)
            .build(
                Some(persisted.as_slice()),
                vec![file("photo2.jpg", 100, 4, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let old_id = crate::catalog::entry::derive_id("photo.jpg", 100);
        let new_id = crate::catalog::entry::derive_id("photo2.jpg", 100);
        assert!(second.pull(&old_id).is_err());
        assert_eq!(
            second.pull_preview(&new_id).unwrap(),
            Some(&b"photo2.jpg"[..])
        );
    }

    #[tokio::test]
    async fn without_a_previewer_entries_have_no_previews() {
        let catalog = Builder::new()
            .build(
                None::<&[u8]>,
                vec![file("a.jpg", 100, 3, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let id = crate::catalog::entry::derive_id("a.jpg", 100);
        assert_eq!(catalog.pull_preview(&id).unwrap(), None);
        assert_eq!(catalog.stat().with_preview, 0);
    }

    #[tokio::test]
    async fn cancelled_build_keeps_partial_results() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let catalog = Builder::new()
            .previewer(PathBytes::new())
            .build(
                None::<&[u8]>,
                vec![file("a.jpg", 100, 3, false), file("b.jpg", 100, 2, false)],
                &cancel,
            )
            .await
            .unwrap();
        // Dispatch stops at the first acquire; nothing was merged.
        assert!(catalog.len() < 2);
    }

    #[tokio::test]
    async fn progress_callbacks_fire_per_file_and_per_merge() {
        let dispatched = Arc::new(AtomicUsize::new(0));
        let merged = Arc::new(AtomicUsize::new(0));
        let d = dispatched.clone();
        let m = merged.clone();

        Builder::new()
            .previewer(PathBytes::new())
            .on_progress(move || {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .on_new_file(move || {
                m.fetch_add(1, Ordering::SeqCst);
            })
            .build(
                None::<&[u8]>,
                vec![file("a.jpg", 100, 3, false), file("b.jpg", 100, 2, false)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(dispatched.load(Ordering::SeqCst), 2);
        assert_eq!(merged.load(Ordering::SeqCst), 2);
    }
}
