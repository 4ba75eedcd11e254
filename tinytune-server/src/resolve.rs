//! Id-resolving extractors.
//!
//! Routes carrying `{dirID}` or `{fileID}` resolve the id against the
//! catalog before their handler runs; a miss short-circuits to 404. A
//! `.m3u8` suffix on a file id is stripped first, for players that
//! append it to playlist URLs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::StatusCode;

use tinytune_core::Entry;

use crate::AppState;

/// A `{dirID}` path parameter resolved to its catalog entry.
#[derive(Debug, Clone)]
pub struct ResolvedDir(pub Arc<Entry>);

/// A `{fileID}` path parameter resolved to its catalog entry.
#[derive(Debug, Clone)]
pub struct ResolvedFile(pub Arc<Entry>);

async fn resolve(
    parts: &mut Parts,
    state: &AppState,
    param: &str,
) -> Result<Arc<Entry>, StatusCode> {
    let Path(params): Path<HashMap<String, String>> = Path::from_request_parts(parts, state)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let id = params.get(param).ok_or(StatusCode::NOT_FOUND)?;
    let id = id.strip_suffix(".m3u8").unwrap_or(id);
    state.catalog.pull(id).map_err(|_| StatusCode::NOT_FOUND)
}

impl FromRequestParts<AppState> for ResolvedDir {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, StatusCode> {
        resolve(parts, state, "dirID").await.map(ResolvedDir)
    }
}

impl FromRequestParts<AppState> for ResolvedFile {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, StatusCode> {
        resolve(parts, state, "fileID").await.map(ResolvedFile)
    }
}
