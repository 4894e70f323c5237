pub mod app_config;
pub mod catalog;
pub mod embedding;
pub mod environment;
pub mod ranking;
pub mod search;

// Re-export key entry points
pub use catalog::{build_index, load_index, write_index, CatalogIndex};
pub use embedding::{Embedder, EmbeddingError, FeatureVector};
pub use environment::init_ort;
pub use ranking::{rank, RankedResult};
pub use search::{IndexState, SearchError, VisualSearch};
