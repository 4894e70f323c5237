use std::{fs::File, io::{self, BufReader}};

use camino::Utf8Path;
use log::{info, warn};
use ndarray::Array2;

use crate::catalog::{
    artifact::{CatalogArtifact, ARTIFACT_VERSION},
    CatalogIndex, IndexUnavailable, IndexValidationError,
};

/// Reads and validates the index artifact at `path`.
///
/// Never panics: a missing file, a file that is not a valid artifact, an empty index or a
/// matrix that disagrees with its identifier list all come back as [`IndexUnavailable`].
pub fn load_index(path: &Utf8Path) -> Result<CatalogIndex, IndexUnavailable> {
    let result = read_index(path);
    match &result {
        Ok(index) => info!("Loaded catalog index from {}: {} entries, dimension {}",
            path, index.len(), index.dimension()),
        Err(e) => warn!("Catalog index unavailable: {}", e),
    }
    result
}

// Private functions

fn read_index(path: &Utf8Path) -> Result<CatalogIndex, IndexUnavailable> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IndexUnavailable::Missing { path: path.to_owned() },
        _ => IndexUnavailable::Unreadable { path: path.to_owned(), source: e },
    })?;

    let artifact: CatalogArtifact = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| IndexUnavailable::Malformed { path: path.to_owned(), source: e })?;
    if artifact.version != ARTIFACT_VERSION {
        return Err(IndexUnavailable::UnsupportedVersion { path: path.to_owned(), version: artifact.version });
    }

    to_index(artifact).map_err(|e| IndexUnavailable::Invalid { path: path.to_owned(), source: e })
}

fn to_index(artifact: CatalogArtifact) -> Result<CatalogIndex, IndexValidationError> {
    let rows = artifact.features.len();
    let dimension = artifact.features.first().map(Vec::len).unwrap_or(0);
    if let Some((row, actual)) = artifact.features.iter()
        .map(Vec::len)
        .enumerate()
        .find(|(_, len)| *len != dimension)
    {
        return Err(IndexValidationError::RaggedRow { row, expected: dimension, actual });
    }

    let flat: Vec<f32> = artifact.features.into_iter().flatten().collect();
    let features = Array2::from_shape_vec((rows, dimension), flat)
        .map_err(|e| IndexValidationError::Shape(e.to_string()))?;
    CatalogIndex::new(features, artifact.image_paths)
}
