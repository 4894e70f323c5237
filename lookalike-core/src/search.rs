use std::sync::Arc;

use camino::Utf8Path;
use log::{debug, warn};

use crate::{
    catalog::{load_index, CatalogIndex},
    embedding::{Embedder, EmbeddingError},
    ranking::{rank, RankError, RankedResult},
};

#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("Catalog index not loaded: {reason}")]
    IndexUnavailable { reason: String },
    #[error("Could not embed the query image")]
    Embedding(#[from] EmbeddingError),
    #[error("Could not rank the query against the catalog")]
    Rank(#[from] RankError),
}

/// Whether a usable catalog index was loaded at startup.
#[derive(Debug, Clone)]
pub enum IndexState {
    Ready(Arc<CatalogIndex>),
    Unavailable { reason: String },
}

impl IndexState {
    /// Loads the artifact at `path`. A failure is kept as the reason queries will be refused.
    pub fn load(path: &Utf8Path) -> Self {
        match load_index(path) {
            Ok(index) => IndexState::Ready(Arc::new(index)),
            Err(e) => IndexState::Unavailable { reason: e.to_string() },
        }
    }

    pub fn index(&self) -> Option<&Arc<CatalogIndex>> {
        match self {
            IndexState::Ready(index) => Some(index),
            IndexState::Unavailable { .. } => None,
        }
    }

    pub fn entries(&self) -> usize {
        self.index().map(|index| index.len()).unwrap_or(0)
    }
}

impl From<CatalogIndex> for IndexState {
    fn from(index: CatalogIndex) -> Self {
        IndexState::Ready(Arc::new(index))
    }
}

/// Query side of the service: embeds a query image with the shared [`Embedder`] and ranks it
/// against the loaded catalog index.
///
/// The index is checked before any embedding work, so an unavailable index refuses queries
/// cheaply.
pub struct VisualSearch {
    embedder: Arc<Embedder>,
    index: IndexState,
    default_top_k: usize,
}

impl VisualSearch {
    pub fn new(embedder: Arc<Embedder>, index: IndexState, default_top_k: usize) -> Self {
        if let Some(index) = index.index() {
            if index.dimension() != embedder.dimension() {
                warn!("Catalog index has dimension {} but the embedder produces {}; every query will fail. Rebuild the index with the current model.",
                    index.dimension(), embedder.dimension());
            }
        }
        VisualSearch { embedder, index, default_top_k }
    }

    pub fn is_ready(&self) -> bool {
        self.index.index().is_some()
    }

    pub fn index_state(&self) -> &IndexState {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Finds the catalog images most similar to the image file at `path`.
    pub fn search_path(&self, path: &Utf8Path, top_k: Option<usize>) -> Result<Vec<RankedResult>, SearchError> {
        let index = self.ready_index()?;
        let query = self.embedder.extract_features(path)?;
        self.rank_against(&query, index, top_k)
    }

    /// Finds the catalog images most similar to an in-memory encoded image. `label` names the
    /// upload in errors and logs.
    pub fn search_bytes(&self, label: &str, bytes: &[u8], top_k: Option<usize>) -> Result<Vec<RankedResult>, SearchError> {
        let index = self.ready_index()?;
        let query = self.embedder.extract_features_from_bytes(label, bytes)?;
        self.rank_against(&query, index, top_k)
    }

    /// Ranks an already computed query vector.
    pub fn search_vector(&self, query: &[f32], top_k: Option<usize>) -> Result<Vec<RankedResult>, SearchError> {
        let index = self.ready_index()?;
        self.rank_against(query, index, top_k)
    }

    // Private methods

    fn ready_index(&self) -> Result<&CatalogIndex, SearchError> {
        match &self.index {
            IndexState::Ready(index) => Ok(&**index),
            IndexState::Unavailable { reason } => Err(SearchError::IndexUnavailable { reason: reason.clone() }),
        }
    }

    fn rank_against(&self, query: &[f32], index: &CatalogIndex, top_k: Option<usize>) -> Result<Vec<RankedResult>, SearchError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let results = rank(query, index, top_k)?;
        debug!("Query ranked against {} catalog entries, returning {}", index.len(), results.len());
        Ok(results)
    }
}
