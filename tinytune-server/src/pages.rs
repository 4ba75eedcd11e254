//! HTML rendering of directory and search pages.
//!
//! The corpus keeps pages deliberately plain: a breadcrumb bar, the
//! search box, a sort selector and a zoomable grid of cards. Rendering
//! is direct string assembly; no template engine is involved.

use std::sync::Arc;

use regex::Regex;

use tinytune_core::catalog::sort::SortOrder;
use tinytune_core::{ContentKind, Entry};

/// One breadcrumb; crumbs without an href render as plain text.
#[derive(Debug, Clone)]
pub struct Crumb {
    pub name: String,
    pub href: Option<String>,
}

/// Everything a listing page needs.
#[derive(Debug)]
pub struct PageData {
    pub items: Vec<Arc<Entry>>,
    pub crumbs: Vec<Crumb>,
    pub zoom: String,
    pub active_sort: SortOrder,
    pub search: Option<String>,
    /// Directory scope for the search form, empty at the root.
    pub dir_id: String,
}

pub fn render(data: &PageData, streaming: &[Regex]) -> String {
    let mut html = String::with_capacity(4096 + data.items.len() * 256);

    html.push_str(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>tinytune</title>\n\
         <link rel=\"stylesheet\" href=\"/static/styles.css\">\n\
         </head>\n<body>\n",
    );

    render_header(&mut html, data);
    render_items(&mut html, data, streaming);

    html.push_str("<script src=\"/static/app.js\"></script>\n</body>\n</html>\n");
    html
}

fn render_header(html: &mut String, data: &PageData) {
    html.push_str("<header>\n<nav class=\"crumbs\">");
    html.push_str("<a href=\"/\">home</a>");
    for crumb in &data.crumbs {
        html.push_str(" / ");
        match &crumb.href {
            Some(href) => {
                html.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    escape(href),
                    escape(&crumb.name)
                ));
            }
            None => html.push_str(&escape(&crumb.name)),
        }
    }
    html.push_str("</nav>\n");

    let action = if data.dir_id.is_empty() {
        "/s".to_string()
    } else {
        format!("/s/{}/", data.dir_id)
    };
    html.push_str(&format!(
        "<form class=\"search\" action=\"{}\" method=\"get\">\
         <input type=\"search\" name=\"query\" placeholder=\"Search\" value=\"{}\">\
         </form>\n",
        escape(&action),
        escape(data.search.as_deref().unwrap_or_default()),
    ));

    html.push_str("<select class=\"sort\" data-cookie=\"sort\">");
    for order in SortOrder::ALL {
        let selected = if order == data.active_sort {
            " selected"
        } else {
            ""
        };
        html.push_str(&format!(
            "<option value=\"{label}\"{selected}>{label}</option>",
            label = order.label()
        ));
    }
    html.push_str("</select>\n</header>\n");
}

fn render_items(html: &mut String, data: &PageData, streaming: &[Regex]) {
    html.push_str(&format!(
        "<main class=\"grid zoom-{}\">\n",
        escape(&data.zoom)
    ));

    for item in &data.items {
        let href = item_href(item, streaming);
        html.push_str(&format!("<a class=\"card\" href=\"{}\">", escape(&href)));
        if item.preview.length > 0 {
            html.push_str(&format!(
                "<img loading=\"lazy\" src=\"/preview/{}/\" alt=\"\">",
                item.id
            ));
        } else {
            html.push_str(&format!(
                "<div class=\"placeholder kind-{}\"></div>",
                item.kind.value()
            ));
        }
        html.push_str(&format!("<span>{}</span>", escape(&item.name)));
        if item.duration > 0.0 {
            html.push_str(&format!(
                "<span class=\"duration\">{}</span>",
                tinytune_core::timefmt::timestamp(item.duration as u64)
            ));
        }
        html.push_str("</a>\n");
    }

    if data.items.is_empty() {
        html.push_str("<p class=\"empty\">Nothing here.</p>\n");
    }
    html.push_str("</main>\n");
}

/// Where a card click goes: directories descend, streaming-matched
/// videos play through HLS, everything else serves the origin file.
fn item_href(item: &Entry, streaming: &[Regex]) -> String {
    if item.kind == ContentKind::Dir {
        return format!("/d/{}/", item.id);
    }
    if item.kind == ContentKind::Video
        && streaming.iter().any(|p| p.is_match(&item.relative_path))
    {
        return format!("/rts/{}/", item.id);
    }
    format!("/origin/{}/", item.id)
}

/// Minimal HTML attribute/text escaping.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
