//! Router assembly.

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_root))
        .route("/d/{dirID}/", get(handlers::index_dir))
        .route("/s", get(handlers::search_root))
        .route("/s/{dirID}/", get(handlers::search_dir))
        .route("/preview/{fileID}/", get(handlers::preview))
        .route("/origin/{fileID}/", get(handlers::origin))
        .route("/rts/{fileID}/", get(handlers::hls_playlist))
        .route("/rts/{fileID}/{chunkID}/", get(handlers::hls_chunk))
        .route("/static/{*path}", get(handlers::static_asset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
