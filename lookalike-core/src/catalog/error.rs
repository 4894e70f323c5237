use camino::Utf8PathBuf;

/// Reasons a matrix and identifier list cannot form a [`super::CatalogIndex`].
#[derive(thiserror::Error, Debug)]
pub enum IndexValidationError {
    #[error("Matrix has {rows} rows but there are {identifiers} identifiers")]
    RowCountMismatch { rows: usize, identifiers: usize },
    #[error("Index has no entries")]
    Empty,
    #[error("Embeddings have zero length")]
    ZeroDimension,
    #[error("Row {row} has length {actual}, expected {expected}")]
    RaggedRow { row: usize, expected: usize, actual: usize },
    #[error("Row {row} contains a non-finite value")]
    NonFinite { row: usize },
    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: &'static str },
    #[error("Identifier {identifier:?} appears more than once")]
    DuplicateIdentifier { identifier: String },
    #[error("Could not shape embedding matrix: {0}")]
    Shape(String),
}

/// The catalog index could not be loaded. The service stays up and reports itself as not ready.
#[derive(thiserror::Error, Debug)]
pub enum IndexUnavailable {
    #[error("Index artifact does not exist at {path}")]
    Missing { path: Utf8PathBuf },
    #[error("Error reading index artifact at {path}")]
    Unreadable { path: Utf8PathBuf, #[source] source: std::io::Error },
    #[error("Index artifact at {path} is malformed")]
    Malformed { path: Utf8PathBuf, #[source] source: serde_json::Error },
    #[error("Index artifact at {path} has unsupported version {version}")]
    UnsupportedVersion { path: Utf8PathBuf, version: u32 },
    #[error("Index artifact at {path} is inconsistent")]
    Invalid { path: Utf8PathBuf, #[source] source: IndexValidationError },
}

/// The catalog index could not be built or persisted. No artifact is written when this is
/// returned, so a previously written index stays in place.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("Error reading catalog directory {path}")]
    CatalogDirectory { path: Utf8PathBuf, #[source] source: std::io::Error },
    #[error("No catalog images (jpg, jpeg, png) found in {path}")]
    NoImagesFound { path: Utf8PathBuf },
    #[error("None of the {attempted} catalog images in {path} could be embedded")]
    NothingEmbedded { path: Utf8PathBuf, attempted: usize },
    #[error("Embedded catalog does not form a valid index")]
    Validation(#[from] IndexValidationError),
    #[error("Error writing index artifact to {path}")]
    Persist { path: Utf8PathBuf, #[source] source: anyhow::Error },
}
