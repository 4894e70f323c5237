use std::{fs, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use image::{ImageFormat, Rgb, RgbImage};
use lookalike_core::{
    catalog::{build_index_with_progress, BuildError, BuildEvent},
    embedding::stats::ChannelStatsBackbone,
    build_index, load_index, write_index, Embedder, IndexState, SearchError, VisualSearch,
};

fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
}

fn save_solid(path: &Utf8Path, color: [u8; 3], format: ImageFormat) {
    RgbImage::from_pixel(40, 30, Rgb(color))
        .save_with_format(path, format)
        .unwrap();
}

fn sample_catalog() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    save_solid(&root.join("red.png"), [230, 20, 20], ImageFormat::Png);
    save_solid(&root.join("blue.jpg"), [20, 20, 230], ImageFormat::Jpeg);
    save_solid(&root.join("green.PNG"), [20, 230, 20], ImageFormat::Png);
    fs::write(root.join("corrupt.jpg"), b"definitely not a jpeg").unwrap();
    fs::write(root.join("notes.txt"), b"ignored").unwrap();
    fs::create_dir(root.join("archive")).unwrap();
    save_solid(&root.join("archive/old.png"), [0, 0, 0], ImageFormat::Png);
    (dir, root)
}

fn embedder() -> Embedder {
    Embedder::new(ChannelStatsBackbone)
}

#[test]
fn build_skips_bad_images_and_keeps_identifier_order() {
    let (_dir, root) = sample_catalog();

    let mut skipped_events = vec![];
    let build = build_index_with_progress(&root, &embedder(), |event| {
        if let BuildEvent::Skipped { identifier, .. } = event {
            skipped_events.push(identifier.to_owned());
        }
    }).unwrap();

    assert_eq!(build.report.candidates, 4);
    assert_eq!(build.report.embedded, 3);
    assert_eq!(build.report.skipped.len(), 1);
    assert_eq!(build.report.skipped[0].identifier, "corrupt.jpg");
    assert_eq!(skipped_events, vec!["corrupt.jpg"]);

    assert_eq!(build.index.image_paths(), &["blue.jpg".to_owned(), "green.PNG".to_owned(), "red.png".to_owned()]);
    assert_eq!(build.index.features().dim(), (3, ChannelStatsBackbone::DIMENSION));
}

#[test]
fn written_index_reloads_and_answers_queries() {
    let (_dir, root) = sample_catalog();
    let artifact = root.join("features/catalog_features.json");

    let build = build_index(&root, &embedder()).unwrap();
    write_index(&build.index, &artifact).unwrap();
    let loaded = load_index(&artifact).unwrap();
    assert_eq!(loaded, build.index);

    let search = VisualSearch::new(Arc::new(embedder()), IndexState::load(&artifact), 2);
    assert!(search.is_ready());

    let query = root.join("query.png");
    save_solid(&query, [230, 20, 20], ImageFormat::Png);
    let results = search.search_path(&query, None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].identifier, "red.png");
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
    assert!(results[0].similarity >= results[1].similarity);

    let missing = search.search_path(&root.join("absent.png"), None);
    assert!(matches!(missing, Err(SearchError::Embedding(e)) if e.is_input_error()));
}

#[test]
fn rebuilding_is_deterministic() {
    let (_dir, root) = sample_catalog();
    let first = build_index(&root, &embedder()).unwrap();
    let second = build_index(&root, &embedder()).unwrap();
    assert_eq!(first.index, second.index);
}

#[test]
fn failed_builds_leave_existing_artifact_untouched() {
    let (_dir, root) = sample_catalog();
    let artifact = root.join("catalog_features.json");
    write_index(&build_index(&root, &embedder()).unwrap().index, &artifact).unwrap();
    let before = fs::read(&artifact).unwrap();

    let empty = tempfile::tempdir().unwrap();
    let result = build_index(&utf8_dir(&empty), &embedder());
    assert!(matches!(result, Err(BuildError::NoImagesFound { .. })));

    let broken = tempfile::tempdir().unwrap();
    let broken_root = utf8_dir(&broken);
    fs::write(broken_root.join("a.png"), b"nope").unwrap();
    fs::write(broken_root.join("b.jpeg"), b"").unwrap();
    let result = build_index(&broken_root, &embedder());
    assert!(matches!(result, Err(BuildError::NothingEmbedded { attempted: 2, .. })));

    assert_eq!(fs::read(&artifact).unwrap(), before);
}

#[test]
fn missing_artifact_makes_queries_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let search = VisualSearch::new(Arc::new(embedder()), IndexState::load(&root.join("nothing.json")), 5);

    assert!(!search.is_ready());
    let query = root.join("query.png");
    save_solid(&query, [1, 2, 3], ImageFormat::Png);
    assert!(matches!(search.search_path(&query, None), Err(SearchError::IndexUnavailable { .. })));
}
