use std::sync::Arc;

use camino::Utf8PathBuf;
use lookalike_core::VisualSearch;

/// Shared, read-only application state.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<VisualSearch>,
    pub catalog_dir: Utf8PathBuf,
}

impl AppState {
    pub fn new(search: VisualSearch, catalog_dir: Utf8PathBuf) -> Self {
        AppState { search: Arc::new(search), catalog_dir }
    }
}
