//! Route handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use include_dir::{include_dir, Dir};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use tower_http::services::ServeFile;
use tracing::error;

use tinytune_core::catalog::sort::SortOrder;
use tinytune_core::{hls, Entry};

use crate::pages::{self, Crumb, PageData};
use crate::resolve::{ResolvedDir, ResolvedFile};
use crate::AppState;

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Deadline for one on-demand chunk transcode.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(5);

const PREVIEW_CACHE_CONTROL: &str = "max-age=604800";
const ORIGIN_CACHE_CONTROL: &str = "max-age=3600";

pub async fn index_root(State(state): State<AppState>, headers: HeaderMap) -> Response {
    listing_page(&state, &headers, "", Vec::new())
}

pub async fn index_dir(
    State(state): State<AppState>,
    ResolvedDir(dir): ResolvedDir,
    headers: HeaderMap,
) -> Response {
    let crumbs = match ancestor_crumbs(&state, &dir.id) {
        Ok(crumbs) => crumbs,
        Err(status) => return status.into_response(),
    };
    listing_page(&state, &headers, &dir.id, crumbs)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    query: String,
}

pub async fn search_root(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Response {
    search_page(&state, &headers, "", Vec::new(), params)
}

pub async fn search_dir(
    State(state): State<AppState>,
    ResolvedDir(dir): ResolvedDir,
    Query(params): Query<SearchParams>,
    headers: HeaderMap,
) -> Response {
    let crumbs = match ancestor_crumbs(&state, &dir.id) {
        Ok(crumbs) => crumbs,
        Err(status) => return status.into_response(),
    };
    search_page(&state, &headers, &dir.id, crumbs, params)
}

pub async fn preview(State(state): State<AppState>, ResolvedFile(file): ResolvedFile) -> Response {
    let (content_type, data) = match state.catalog.pull_preview(&file.id) {
        Ok(Some(data)) if !data.is_empty() => (sniff_content_type(data), data.to_vec()),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    let mut response = Response::new(Body::from(data));
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PREVIEW_CACHE_CONTROL),
    );
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type),
    );
    response
}

pub async fn origin(
    State(_state): State<AppState>,
    ResolvedFile(file): ResolvedFile,
    request: Request,
) -> Response {
    // ServeFile owns range handling and conditional requests.
    let mut response = match ServeFile::new(&file.absolute_path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(infallible) => match infallible {},
    };
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(ORIGIN_CACHE_CONTROL),
    );
    response
}

pub async fn hls_playlist(ResolvedFile(file): ResolvedFile) -> Response {
    let playlist = hls::playlist(&file);
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        )],
        playlist,
    )
        .into_response()
}

pub async fn hls_chunk(
    ResolvedFile(file): ResolvedFile,
    axum::extract::Path((_, chunk_id)): axum::extract::Path<(String, String)>,
) -> Response {
    let cancel = CancellationToken::new();
    match hls::chunk(&cancel, &file, &chunk_id, CHUNK_TIMEOUT).await {
        Ok(data) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static("video/mp2t"))],
            data,
        )
            .into_response(),
        Err(err) => {
            error!(id = %file.id, chunk = %chunk_id, error = %err, "chunk transcode failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn static_asset(axum::extract::Path(path): axum::extract::Path<String>) -> Response {
    let Some(asset) = ASSETS.get_file(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(asset_content_type(&path)),
        )],
        asset.contents().to_vec(),
    )
        .into_response()
}

fn listing_page(
    state: &AppState,
    headers: &HeaderMap,
    dir_id: &str,
    crumbs: Vec<Crumb>,
) -> Response {
    let mut items = match state.catalog.pull_children(dir_id) {
        Ok(items) => items,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    let (zoom, sort) = page_settings(headers);
    sort.apply(&mut items);

    let data = PageData {
        items,
        crumbs,
        zoom,
        active_sort: sort,
        search: None,
        dir_id: dir_id.to_string(),
    };
    Html(pages::render(&data, &state.streaming)).into_response()
}

fn search_page(
    state: &AppState,
    headers: &HeaderMap,
    dir_id: &str,
    mut crumbs: Vec<Crumb>,
    params: SearchParams,
) -> Response {
    if params.query.is_empty() {
        return Redirect::to("/").into_response();
    }

    let mut items = state.catalog.search(&params.query, dir_id);
    let (zoom, sort) = page_settings(headers);
    sort.apply(&mut items);

    crumbs.push(Crumb {
        name: "Search".to_string(),
        href: None,
    });

    let data = PageData {
        items,
        crumbs,
        zoom,
        active_sort: sort,
        search: Some(params.query),
        dir_id: dir_id.to_string(),
    };
    Html(pages::render(&data, &state.streaming)).into_response()
}

fn ancestor_crumbs(state: &AppState, dir_id: &str) -> Result<Vec<Crumb>, StatusCode> {
    let chain = state
        .catalog
        .pull_paths(dir_id)
        .map_err(|_| StatusCode::NOT_FOUND)?;
    Ok(chain
        .iter()
        .map(|entry: &Arc<Entry>| Crumb {
            name: entry.name.clone(),
            href: Some(format!("/d/{}/", entry.id)),
        })
        .collect())
}

/// Zoom and sort preferences from the request cookies.
fn page_settings(headers: &HeaderMap) -> (String, SortOrder) {
    let zoom = cookie_value(headers, "zoom").unwrap_or_else(|| "medium".to_string());
    let sort = cookie_value(headers, "sort")
        .as_deref()
        .map(percent_decode)
        .and_then(|label| SortOrder::from_label(&label))
        .unwrap_or(SortOrder::Kind);
    (zoom, sort)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

/// Decode the few percent escapes a sort label can carry.
fn percent_decode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hex: Vec<u8> = bytes.by_ref().take(2).collect();
                match u8::from_str_radix(std::str::from_utf8(&hex).unwrap_or(""), 16) {
                    Ok(code) => out.push(code as char),
                    Err(_) => out.push('%'),
                }
            }
            b'+' => out.push(' '),
            other => out.push(other as char),
        }
    }
    out
}

/// Minimal content sniffing for preview bytes; previews are WebP today
/// but older catalogs may carry other encodings.
fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "image/png";
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if data.starts_with(b"GIF8") {
        return "image/gif";
    }
    "application/octet-stream"
}

fn asset_content_type(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
