use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

use state::AppState;

/// Route under which catalog images are served; ranked results point into it.
pub const CATALOG_ROUTE: &str = "/catalog_data";

/// Builds the HTTP API around `state`. Request bodies larger than `max_upload_bytes` are
/// rejected before they reach the upload handler.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let catalog_files = ServeDir::new(&state.catalog_dir);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .nest_service(CATALOG_ROUTE, catalog_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
