use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use ndarray::Array4;
use ort::{inputs, value::TensorRef};

use crate::{
    app_config::AppConfig,
    embedding::{
        sessions::{create_session_pool, SessionPool, SessionPoolExt},
        Backbone, EmbeddingError,
    },
};

/// Output length of a ResNet-50 with its classification layer removed.
pub const RESNET50_FEATURE_DIMENSION: usize = 2048;

/// Settings for loading an exported feature extraction model.
#[derive(Debug, Clone)]
pub struct OnnxModelOptions {
    pub model_path: Utf8PathBuf,
    pub input_name: String,
    pub output_name: String,
    pub dimension: usize,
    pub pool_size: usize,
    pub intra_threads: usize,
}

impl OnnxModelOptions {
    pub fn new(model_path: impl Into<Utf8PathBuf>) -> Self {
        OnnxModelOptions {
            model_path: model_path.into(),
            input_name: "input".to_owned(),
            output_name: "output".to_owned(),
            dimension: RESNET50_FEATURE_DIMENSION,
            pool_size: 1,
            intra_threads: 4,
        }
    }
}

impl From<&AppConfig> for OnnxModelOptions {
    fn from(config: &AppConfig) -> Self {
        OnnxModelOptions {
            model_path: config.model_path.clone(),
            input_name: config.model_input_name.clone(),
            output_name: config.model_output_name.clone(),
            dimension: config.embedding_dimension,
            pool_size: config.session_pool_size,
            intra_threads: config.intra_threads,
        }
    }
}

/// A frozen CNN exported to ONNX with its classification head removed, so its output is the
/// pooled penultimate representation, e.g. (1, 2048, 1, 1) for ResNet-50.
///
/// [`crate::environment::init_ort`] must be called before constructing one.
pub struct OnnxBackbone {
    sessions: SessionPool,
    input_name: String,
    output_name: String,
    dimension: usize,
}

impl OnnxBackbone {
    pub fn load(options: &OnnxModelOptions) -> Result<Self, EmbeddingError> {
        if !options.model_path.is_file() {
            return Err(EmbeddingError::Initialization(anyhow::anyhow!(
                "Model file does not exist: {}", options.model_path)));
        }

        let sessions = create_session_pool(options.pool_size, options.intra_threads, &options.model_path)
            .map_err(EmbeddingError::Initialization)?;
        info!("Loaded feature extraction model {} ({} session(s), {} dimensions)",
            options.model_path, sessions.len(), options.dimension);

        Ok(OnnxBackbone {
            sessions,
            input_name: options.input_name.clone(),
            output_name: options.output_name.clone(),
            dimension: options.dimension,
        })
    }

    pub fn from_file(model_path: &Utf8Path) -> Result<Self, EmbeddingError> {
        Self::load(&OnnxModelOptions::new(model_path))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, EmbeddingError> {
        Self::load(&OnnxModelOptions::from(config))
    }
}

impl Backbone for OnnxBackbone {
    fn output_dimension(&self) -> usize {
        self.dimension
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, anyhow::Error> {
        let mut session = self.sessions.get_session();

        let outputs = session.run(inputs![
                self.input_name.as_str() => TensorRef::from_array_view(input)
                    .map_err(|e| anyhow::anyhow!("Converting input to tensor: {e}"))?
            ])
            .map_err(|e| anyhow::anyhow!("Running image embedding: {e}"))?;

        let output = outputs.get(self.output_name.as_str())
            .ok_or_else(|| anyhow::anyhow!("Model produced no output named '{}'", self.output_name))?
            .try_extract_array::<f32>()
            .map_err(|e| anyhow::anyhow!("Extracting output as f32 array: {e}"))?;

        // (1, D, 1, 1) pooled output flattened in logical order
        Ok(output.iter().copied().collect())
    }
}
