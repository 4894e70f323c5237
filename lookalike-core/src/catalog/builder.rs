use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

use crate::{
    catalog::{identifier_for, BuildError, CatalogEntry, CatalogIndex},
    embedding::{Embedder, EmbeddingError},
};

/// File extensions (compared case-insensitively) picked up from the catalog directory.
pub const CATALOG_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// An image file found directly inside the catalog directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogImage {
    pub identifier: String,
    pub path: Utf8PathBuf,
}

/// Per-file progress of a build, in processing order.
#[derive(Debug)]
pub enum BuildEvent<'a> {
    Started { total: usize },
    Embedded { position: usize, total: usize, identifier: &'a str },
    Skipped { position: usize, total: usize, identifier: &'a str, error: &'a EmbeddingError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Catalog images found in the directory.
    pub candidates: usize,
    pub embedded: usize,
    pub skipped: Vec<SkippedImage>,
}

/// A freshly built index together with what happened to each candidate image.
#[derive(Debug)]
pub struct CatalogBuild {
    pub index: CatalogIndex,
    pub report: BuildReport,
}

/// Lists the catalog images directly inside `catalog_dir`, sorted by identifier.
///
/// Subdirectories, files with other extensions and names that are not valid UTF-8 or not valid
/// identifiers are ignored.
pub fn discover_catalog_images(catalog_dir: &Utf8Path) -> Result<Vec<CatalogImage>, BuildError> {
    let directory_error = |source| BuildError::CatalogDirectory { path: catalog_dir.to_owned(), source };

    let mut images = vec![];
    for entry_result in fs::read_dir(catalog_dir).map_err(directory_error)? {
        let entry = entry_result.map_err(directory_error)?;
        let path = match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => path,
            Err(path) => {
                warn!("Ignoring catalog file with a non UTF-8 name: {:?}", path);
                continue;
            },
        };

        if !path.is_file() || !has_catalog_extension(&path) {
            debug!("Ignoring non catalog entry: {}", path);
            continue;
        }

        match identifier_for(catalog_dir, &path) {
            Some(identifier) => images.push(CatalogImage { identifier, path }),
            None => warn!("Ignoring catalog file whose name cannot be used as an identifier: {}", path),
        }
    }

    images.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(images)
}

/// Embeds every catalog image in `catalog_dir` into a new index. See [`build_index_with_progress`].
pub fn build_index(catalog_dir: &Utf8Path, embedder: &Embedder) -> Result<CatalogBuild, BuildError> {
    build_index_with_progress(catalog_dir, embedder, |_| {})
}

/// Embeds every catalog image in `catalog_dir`, in identifier order, into a new index.
///
/// Images that fail to embed are logged, reported to `on_event` and left out of the index; the
/// build goes on with the rest. Fails without producing an index when the directory holds no
/// catalog images or none of them could be embedded.
pub fn build_index_with_progress(
    catalog_dir: &Utf8Path,
    embedder: &Embedder,
    mut on_event: impl FnMut(BuildEvent<'_>),
) -> Result<CatalogBuild, BuildError> {
    let images = discover_catalog_images(catalog_dir)?;
    let total = images.len();
    if total == 0 {
        return Err(BuildError::NoImagesFound { path: catalog_dir.to_owned() });
    }

    info!("Found {} catalog images to process in {}", total, catalog_dir);
    on_event(BuildEvent::Started { total });

    let mut entries = Vec::with_capacity(total);
    let mut report = BuildReport { candidates: total, ..Default::default() };
    for (i, image) in images.into_iter().enumerate() {
        let position = i + 1;
        debug!("Processing [{}/{}]: {}", position, total, image.identifier);

        match embedder.extract_features(&image.path) {
            Ok(vector) => {
                on_event(BuildEvent::Embedded { position, total, identifier: &image.identifier });
                entries.push(CatalogEntry { identifier: image.identifier, vector });
            },
            Err(e) => {
                warn!("Skipping catalog image {}: {}", image.identifier, e);
                on_event(BuildEvent::Skipped { position, total, identifier: &image.identifier, error: &e });
                report.skipped.push(SkippedImage { identifier: image.identifier, reason: error_chain(&e) });
            },
        }
    }

    if entries.is_empty() {
        return Err(BuildError::NothingEmbedded { path: catalog_dir.to_owned(), attempted: total });
    }

    report.embedded = entries.len();
    let index = CatalogIndex::from_entries(entries)?;
    info!("Embedded {} of {} catalog images ({} dimensions)", report.embedded, total, index.dimension());

    Ok(CatalogBuild { index, report })
}

// Private functions

fn has_catalog_extension(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| CATALOG_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use ndarray::Array4;

    use super::*;
    use crate::embedding::Backbone;

    /// Emits NaN for bright images, as a broken model might for some inputs.
    struct NanOnBright;

    impl Backbone for NanOnBright {
        fn output_dimension(&self) -> usize { 2 }
        fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, anyhow::Error> {
            if input[[0, 0, 0, 0]] > 0.0 {
                Ok(vec![f32::NAN, 1.0])
            } else {
                Ok(vec![1.0, 2.0])
            }
        }
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_catalog_extension(Utf8Path::new("a.jpg")));
        assert!(has_catalog_extension(Utf8Path::new("a.JPEG")));
        assert!(has_catalog_extension(Utf8Path::new("a.Png")));
        assert!(!has_catalog_extension(Utf8Path::new("a.gif")));
        assert!(!has_catalog_extension(Utf8Path::new("png")));
        assert!(!has_catalog_extension(Utf8Path::new("notes.txt")));
    }

    #[test]
    fn test_discovery_is_sorted_and_flat() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        for name in ["zebra.png", "apple.JPG", "mango.jpeg", "readme.md"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("nested.png")).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/inner.png"), b"x").unwrap();

        let identifiers: Vec<String> = discover_catalog_images(&root).unwrap()
            .into_iter()
            .map(|image| image.identifier)
            .collect();
        assert_eq!(identifiers, vec!["apple.JPG", "mango.jpeg", "zebra.png"]);
    }

    #[test]
    fn test_missing_directory() {
        let result = discover_catalog_images(Utf8Path::new("/definitely/not/a/catalog"));
        assert!(matches!(result, Err(BuildError::CatalogDirectory { .. })));
    }

    #[test]
    fn test_non_finite_embedding_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([0, 0, 0])).save(root.join("a.png")).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])).save(root.join("b.png")).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([5, 5, 5])).save(root.join("c.png")).unwrap();

        let build = build_index(&root, &Embedder::new(NanOnBright)).unwrap();
        assert_eq!(build.index.image_paths(), &["a.png".to_owned(), "c.png".to_owned()]);
        assert_eq!(build.report.embedded, 2);
        assert_eq!(build.report.skipped.len(), 1);
        assert_eq!(build.report.skipped[0].identifier, "b.png");
    }
}
