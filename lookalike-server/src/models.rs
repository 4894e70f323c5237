use serde::{Deserialize, Serialize};

/// Query string of `POST /upload`.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub index: &'static str,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct MatchItem {
    /// Route under which the matching catalog image is served.
    pub path: String,
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<MatchItem>,
}
