//! HTTP surface of the tinytune media server.
//!
//! Routes map directly onto catalog operations; the only moving parts
//! are the id-resolving extractors in [`resolve`] and the on-demand HLS
//! synthesis the handlers delegate to `tinytune_core::hls`.

pub mod handlers;
pub mod pages;
pub mod resolve;
pub mod routes;

use std::sync::Arc;

use regex::Regex;

use tinytune_core::Catalog;

/// Shared server state: the read-only catalog plus the playback
/// selectors.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    /// Files matching one of these play through `/rts/` instead of
    /// `/origin/`.
    pub streaming: Arc<Vec<Regex>>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, streaming: Vec<Regex>) -> Self {
        AppState {
            catalog,
            streaming: Arc::new(streaming),
        }
    }
}
