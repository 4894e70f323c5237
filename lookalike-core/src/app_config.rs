use std::{fs, sync::LazyLock};

use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use log::{debug, warn};
use serde::Deserialize;

/// Settings shared by the index builder, the query CLI and the server.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub catalog_dir: Utf8PathBuf,
    pub artifact_path: Utf8PathBuf,
    pub model_path: Utf8PathBuf,
    pub model_input_name: String,
    pub model_output_name: String,
    /// Directory containing the onnxruntime dynamic library. Standard search paths if unset.
    #[serde(default)]
    pub onnx_lib_dir: Option<Utf8PathBuf>,
    pub embedding_dimension: usize,
    pub session_pool_size: usize,
    pub intra_threads: usize,
    pub top_k: usize,
    pub bind_address: String,
    pub max_upload_bytes: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Error loading configuration")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Loads the configuration from, in increasing priority:
/// 1. the built-in defaults,
/// 2. `lookalike.toml` in the application data directory (created with the defaults if missing),
/// 3. `explicit_file`, when given (must exist),
/// 4. `LOOKALIKE_*` environment variables, e.g. `LOOKALIKE_CATALOG_DIR`.
///
/// The `%%AppDataDirectory%%` placeholder in path settings is replaced with the application
/// data directory.
pub fn load_config(explicit_file: Option<&Utf8Path>) -> Result<AppConfig, ConfigError> {
    let app_folder = get_app_folder();
    let user_file = ensure_user_config(app_folder);
    build_config(app_folder, user_file.as_deref(), explicit_file, true)
}

/// The per-user application data directory, `<data_local_dir>/lookalike`. Falls back to the
/// current directory when the platform has no data directory.
pub fn get_app_folder() -> &'static Utf8Path {
    APP_FOLDER.as_path()
}

impl AppConfig {
    fn expand_placeholders(&mut self, app_folder: &Utf8Path) {
        for path in [&mut self.catalog_dir, &mut self.artifact_path, &mut self.model_path] {
            *path = expand(path, app_folder);
        }
        if let Some(dir) = self.onnx_lib_dir.as_mut() {
            *dir = expand(dir, app_folder);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid { key: "top_k", reason: "must be at least 1".to_owned() });
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding_dimension",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

// Private constants and functions

const DEFAULT_CONFIG: &str = include_str!("../artifacts/defaults/lookalike.toml");
const CONFIG_FILE_NAME: &str = "lookalike.toml";
const APP_FOLDER_PLACEHOLDER: &str = "%%AppDataDirectory%%";
const ENV_PREFIX: &str = "LOOKALIKE";

static APP_FOLDER: LazyLock<Utf8PathBuf> = LazyLock::new(|| {
    match dirs::data_local_dir().map(Utf8PathBuf::from_path_buf) {
        Some(Ok(dir)) => dir.join("lookalike"),
        Some(Err(dir)) => {
            warn!("Local data directory is not valid UTF-8 ({:?}), using current directory", dir);
            Utf8PathBuf::from(".")
        },
        None => {
            warn!("No local data directory on this platform, using current directory");
            Utf8PathBuf::from(".")
        },
    }
});

/// Writes the defaults to the user config file if it does not exist yet. Returns the file path
/// when it is usable.
fn ensure_user_config(app_folder: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_file_path = app_folder.join(CONFIG_FILE_NAME);
    if config_file_path.is_file() {
        return Some(config_file_path);
    }

    let created = fs::create_dir_all(app_folder)
        .and_then(|_| fs::write(&config_file_path, DEFAULT_CONFIG));
    match created {
        Ok(()) => {
            debug!("Created default configuration file at {}", config_file_path);
            Some(config_file_path)
        },
        Err(e) => {
            warn!("Could not create default configuration file at {}: {}", config_file_path, e);
            None
        },
    }
}

fn build_config(app_folder: &Utf8Path, user_file: Option<&Utf8Path>, explicit_file: Option<&Utf8Path>,
    read_environment: bool) -> Result<AppConfig, ConfigError>
{
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
    if let Some(file) = user_file {
        builder = builder.add_source(File::with_name(file.as_str()).format(FileFormat::Toml).required(false));
    }
    if let Some(file) = explicit_file {
        builder = builder.add_source(File::with_name(file.as_str()).format(FileFormat::Toml).required(true));
    }
    if read_environment {
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
    }

    let mut config: AppConfig = builder.build()?.try_deserialize()?;
    config.expand_placeholders(app_folder);
    config.validate()?;
    Ok(config)
}

fn expand(path: &Utf8Path, app_folder: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(path.as_str().replace(APP_FOLDER_PLACEHOLDER, app_folder.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = build_config(Utf8Path::new("/data/lookalike"), None, None, false).unwrap();
        assert_eq!(config.catalog_dir, Utf8PathBuf::from("catalog_data"));
        assert_eq!(config.artifact_path, Utf8PathBuf::from("features/catalog_features.json"));
        assert_eq!(config.model_path, Utf8PathBuf::from("/data/lookalike/models/resnet50_features.onnx"));
        assert_eq!(config.embedding_dimension, 2048);
        assert_eq!(config.top_k, 5);
        assert!(config.onnx_lib_dir.is_none());
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = Utf8PathBuf::from_path_buf(dir.path().join("custom.toml")).unwrap();
        fs::write(&file, "top_k = 9\ncatalog_dir = \"%%AppDataDirectory%%/shirts\"\n").unwrap();

        let config = build_config(Utf8Path::new("/app"), None, Some(&file), false).unwrap();
        assert_eq!(config.top_k, 9);
        assert_eq!(config.catalog_dir, Utf8PathBuf::from("/app/shirts"));
        assert_eq!(config.bind_address, "0.0.0.0:5000");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = build_config(Utf8Path::new("/app"), None, Some(Utf8Path::new("/no/such/file.toml")), false);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = Utf8PathBuf::from_path_buf(dir.path().join("bad.toml")).unwrap();
        fs::write(&file, "top_k = 0\n").unwrap();

        let result = build_config(Utf8Path::new("/app"), None, Some(&file), false);
        assert!(matches!(result, Err(ConfigError::Invalid { key: "top_k", .. })));
    }
}
