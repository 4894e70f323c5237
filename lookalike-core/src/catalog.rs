use camino::Utf8Path;
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::embedding::FeatureVector;

/// One catalog image: its identifier and the embedding computed from it at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub identifier: String,
    pub vector: FeatureVector,
}

/// Point-in-time snapshot of the catalog: an (N, D) embedding matrix row-aligned with N
/// identifiers. Immutable once constructed; a new catalog means a new index.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIndex {
    features: Array2<f32>,
    image_paths: Vec<String>,
    row_norms: Array1<f32>,
}

impl CatalogIndex {
    /// Builds an index from a matrix and its identifiers after checking that they agree, that
    /// the index is not empty, that every value is finite and that every identifier is a unique,
    /// forward-slash normalized relative path.
    pub fn new(features: Array2<f32>, image_paths: Vec<String>) -> Result<Self, IndexValidationError> {
        validate(&features, &image_paths)?;
        let row_norms = features.map_axis(Axis(1), |row| row.dot(&row).sqrt());
        Ok(CatalogIndex { features, image_paths, row_norms })
    }

    /// Stacks `entries` into an index, preserving their order.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, IndexValidationError> {
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(entries.len() * dimension);
        let mut image_paths = Vec::with_capacity(entries.len());
        for (row, entry) in entries.into_iter().enumerate() {
            if entry.vector.len() != dimension {
                return Err(IndexValidationError::RaggedRow { row, expected: dimension, actual: entry.vector.len() });
            }
            flat.extend(entry.vector);
            image_paths.push(entry.identifier);
        }

        let features = Array2::from_shape_vec((image_paths.len(), dimension), flat)
            .map_err(|e| IndexValidationError::Shape(e.to_string()))?;
        Self::new(features, image_paths)
    }

    /// Number of catalog entries, N.
    pub fn len(&self) -> usize {
        self.image_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_paths.is_empty()
    }

    /// Embedding length, D.
    pub fn dimension(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn image_paths(&self) -> &[String] {
        &self.image_paths
    }

    /// L2 norm of every row, computed once at construction.
    pub fn row_norms(&self) -> &Array1<f32> {
        &self.row_norms
    }

    pub fn entry(&self, row: usize) -> Option<(&str, ArrayView1<'_, f32>)> {
        self.image_paths.get(row)
            .map(|identifier| (identifier.as_str(), self.features.row(row)))
    }

    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.image_paths.iter().position(|p| p == identifier)
    }
}

/// Identifier of `path` relative to `root`, with `/` separators regardless of platform.
/// `None` if `path` is not under `root` or the result is not a valid identifier.
pub fn identifier_for(root: &Utf8Path, path: &Utf8Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let identifier = relative.components()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join("/");
    validate_identifier(&identifier).ok()?;
    Some(identifier)
}

/// Checks that `identifier` can be appended to the catalog serving route as is: non-empty,
/// relative, `/` separated, and free of empty, `.` and `..` segments.
pub fn validate_identifier(identifier: &str) -> Result<(), &'static str> {
    if identifier.is_empty() {
        return Err("identifier is empty");
    }
    if identifier.contains('\\') {
        return Err("identifier contains a backslash");
    }
    if identifier.starts_with('/') {
        return Err("identifier is an absolute path");
    }
    if identifier.contains(':') {
        return Err("identifier contains a drive or scheme separator");
    }
    for segment in identifier.split('/') {
        match segment {
            "" => return Err("identifier contains an empty path segment"),
            "." | ".." => return Err("identifier contains a relative path segment"),
            _ => {},
        }
    }
    Ok(())
}

pub use artifact::{write_index, ARTIFACT_VERSION};
pub use builder::{build_index, build_index_with_progress, discover_catalog_images, BuildEvent, BuildReport,
    CatalogBuild, CatalogImage, SkippedImage, CATALOG_EXTENSIONS};
pub use error::*;
pub use loader::load_index;

pub mod artifact;
pub mod builder;
pub mod loader;

// Private modules and functions

mod error;

fn validate(features: &Array2<f32>, image_paths: &[String]) -> Result<(), IndexValidationError> {
    if features.nrows() != image_paths.len() {
        return Err(IndexValidationError::RowCountMismatch {
            rows: features.nrows(),
            identifiers: image_paths.len(),
        });
    }
    if image_paths.is_empty() {
        return Err(IndexValidationError::Empty);
    }
    if features.ncols() == 0 {
        return Err(IndexValidationError::ZeroDimension);
    }
    if let Some((row, _)) = features.outer_iter().enumerate().find(|(_, r)| r.iter().any(|v| !v.is_finite())) {
        return Err(IndexValidationError::NonFinite { row });
    }

    let mut seen = std::collections::HashSet::with_capacity(image_paths.len());
    for identifier in image_paths {
        validate_identifier(identifier).map_err(|reason| IndexValidationError::InvalidIdentifier {
            identifier: identifier.clone(),
            reason,
        })?;
        if !seen.insert(identifier.as_str()) {
            return Err(IndexValidationError::DuplicateIdentifier { identifier: identifier.clone() });
        }
    }

    Ok(())
}
