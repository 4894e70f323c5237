use std::io::{self, Cursor};

use camino::Utf8Path;
use image::{DynamicImage, ImageReader};
use log::{debug, warn};
use ndarray::Array4;

/// Fixed-length embedding of one image. Every vector produced by a given [`Embedder`] has the
/// same length, [`Embedder::dimension`].
pub type FeatureVector = Vec<f32>;

#[derive(thiserror::Error, Debug)]
pub enum EmbeddingError {
    #[error("Image file not found at path: {path}")]
    NotFound { path: String },
    #[error("Error reading image file at path: {path}")]
    IO { path: String, #[source] source: io::Error },
    #[error("Could not decode image (corrupt or unsupported format): {element}")]
    Decode { element: String, #[source] source: image::ImageError },
    #[error("Error while preprocessing image {element} at step: {step}")]
    Preprocessing { element: String, step: &'static str, #[source] source: anyhow::Error },
    #[error("Error while performing neural network calculations on {element} at step: {step}")]
    Calculation { element: String, step: &'static str, #[source] source: anyhow::Error },
    #[error("Backbone produced a vector of length {actual} for {element}, expected {expected}")]
    UnexpectedDimension { element: String, expected: usize, actual: usize },
    #[error("Backbone produced a non-finite value at position {position} for {element}")]
    NonFiniteOutput { element: String, position: usize },
    #[error("Error during initialization of the embedding backbone")]
    Initialization(#[source] anyhow::Error),
}

impl EmbeddingError {
    /// True for failures caused by the input image itself (missing, unreadable, undecodable)
    /// rather than by the model.
    pub fn is_input_error(&self) -> bool {
        matches!(self, EmbeddingError::NotFound { .. } | EmbeddingError::IO { .. } | EmbeddingError::Decode { .. })
    }
}

/// A frozen feature extraction network.
///
/// Implementors receive the preprocessed NCHW tensor of shape (1, 3, [`CROP_SIZE`], [`CROP_SIZE`])
/// and return the flattened pooled representation. Implementations must be deterministic and
/// must not mutate any learned state.
pub trait Backbone: Send + Sync {
    /// Length of every vector returned by [`Backbone::forward`].
    fn output_dimension(&self) -> usize;
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, anyhow::Error>;
}

/// Maps images to feature vectors: fixed preprocessing followed by a [`Backbone`] forward pass.
///
/// Constructed once and shared read-only (behind an `Arc`) by both the index builder
/// and the query path, so both produce vectors in the same embedding space.
pub struct Embedder {
    backbone: Box<dyn Backbone>,
}

impl Embedder {
    pub fn new(backbone: impl Backbone + 'static) -> Self {
        Embedder { backbone: Box::new(backbone) }
    }

    pub fn dimension(&self) -> usize {
        self.backbone.output_dimension()
    }

    /// Embeds the image file at `path`. A missing file and an undecodable file are reported as
    /// distinct error kinds.
    pub fn extract_features(&self, path: &Utf8Path) -> Result<FeatureVector, EmbeddingError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EmbeddingError::NotFound { path: path.to_string() },
            _ => EmbeddingError::IO { path: path.to_string(), source: e },
        })?;

        self.extract_features_from_bytes(path.as_str(), &bytes)
    }

    /// Embeds an in-memory encoded image. `label` only names the image in errors and logs.
    pub fn extract_features_from_bytes(&self, label: &str, bytes: &[u8]) -> Result<FeatureVector, EmbeddingError> {
        let image = decode_image(label, bytes)?;
        self.embed_image(label, &image)
    }

    /// Like [`Embedder::extract_features`], but logs the failure and yields `None`, for callers
    /// that treat a bad image as a skippable per-image condition.
    pub fn try_extract_features(&self, path: &Utf8Path) -> Option<FeatureVector> {
        match self.extract_features(path) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Could not extract features from {}: {}", path, e);
                None
            }
        }
    }

    /// Embeds an already decoded image. Any color mode is converted to RGB first.
    pub fn embed_image(&self, element: &str, image: &DynamicImage) -> Result<FeatureVector, EmbeddingError> {
        let input = preprocess::preprocess(image)
            .map_err(|e| EmbeddingError::Preprocessing {
                element: element.to_owned(),
                step: "Resizing and cropping",
                source: e.into(),
            })?;

        debug!("Embedding image {} ({}x{})", element, image.width(), image.height());
        let vector = self.backbone.forward(&input)
            .map_err(|e| EmbeddingError::Calculation {
                element: element.to_owned(),
                step: "Backbone forward pass",
                source: e,
            })?;

        let expected = self.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::UnexpectedDimension {
                element: element.to_owned(),
                expected,
                actual: vector.len(),
            });
        }

        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFiniteOutput { element: element.to_owned(), position });
        }

        Ok(vector)
    }
}

pub use preprocess::{CHANNEL_MEAN, CHANNEL_STD, CROP_SIZE, RESIZE_SHORTEST_SIDE};

pub mod onnx;
pub mod preprocess;
pub mod sessions;
pub mod stats;

// Private functions

fn decode_image(label: &str, bytes: &[u8]) -> Result<DynamicImage, EmbeddingError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EmbeddingError::IO { path: label.to_owned(), source: e })?
        .decode()
        .map_err(|e| EmbeddingError::Decode { element: label.to_owned(), source: e })
}
