//! On-disk format of the catalog index.
//!
//! A single JSON object:
//!
//! ```json
//! { "version": 1, "features": [[0.12, ...], ...], "image_paths": ["red.png", ...] }
//! ```
//!
//! `features` holds N rows of D numbers and `image_paths` the N row-aligned identifiers. Legacy
//! artifacts carry only `features` and `image_paths`; a missing `version` reads as version 1.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::{Deserialize, Serialize};

use crate::catalog::{BuildError, CatalogIndex};

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CatalogArtifact {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub features: Vec<Vec<f32>>,
    pub image_paths: Vec<String>,
}

impl From<&CatalogIndex> for CatalogArtifact {
    fn from(index: &CatalogIndex) -> Self {
        CatalogArtifact {
            version: ARTIFACT_VERSION,
            features: index.features().outer_iter().map(|row| row.to_vec()).collect(),
            image_paths: index.image_paths().to_vec(),
        }
    }
}

/// Persists `index` to `path`, creating parent directories as needed.
///
/// The artifact is written to a temporary sibling file first and then renamed over `path`, so a
/// failure at any point leaves an existing artifact untouched.
pub fn write_index(index: &CatalogIndex, path: &Utf8Path) -> Result<(), BuildError> {
    let persist_error = |source: anyhow::Error| BuildError::Persist { path: path.to_owned(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persist_error(e.into()))?;
    }

    let temp_path = temp_path_for(path);
    let written = write_artifact(&CatalogArtifact::from(index), &temp_path)
        .and_then(|_| fs::rename(&temp_path, path).map_err(anyhow::Error::from));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(persist_error(e));
    }

    info!("Wrote catalog index with {} entries of dimension {} to {}", index.len(), index.dimension(), path);
    Ok(())
}

// Private functions

fn legacy_version() -> u32 {
    1
}

fn temp_path_for(path: &Utf8Path) -> Utf8PathBuf {
    let file_name = path.file_name().unwrap_or("catalog_features.json");
    path.with_file_name(format!(".{}.tmp", file_name))
}

fn write_artifact(artifact: &CatalogArtifact, path: &Utf8Path) -> Result<(), anyhow::Error> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, artifact)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
