use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use lookalike_core::{catalog::CATALOG_EXTENSIONS, IndexState, SearchError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, info};

use crate::{
    error::{ServerError, ServerResult},
    models::{HealthResponse, MatchItem, UploadParams, UploadResponse},
    state::AppState,
    CATALOG_ROUTE,
};

/// Characters escaped in each identifier segment of a result path, so the path can be requested
/// as is from the catalog route.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'%').add(b'/').add(b'<').add(b'>').add(b'?')
    .add(b'[').add(b'\\').add(b']').add(b'^').add(b'`').add(b'{').add(b'|').add(b'}');

/// Handler for `GET /health`
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let search = &state.search;
    Json(HealthResponse {
        status: "ok",
        index: if search.is_ready() { "ready" } else { "unavailable" },
        entries: search.index_state().entries(),
    })
}

/// Handler for `POST /upload`
/// Embeds the image in the multipart field `file` and returns the most similar catalog images.
#[axum::debug_handler]
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    if let IndexState::Unavailable { reason } = state.search.index_state() {
        return Err(SearchError::IndexUnavailable { reason: reason.clone() }.into());
    }

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(ServerError::BadRequest("No file part in the request".to_string()));
    };
    if file_name.is_empty() {
        return Err(ServerError::BadRequest("No selected file".to_string()));
    }
    if !has_allowed_extension(&file_name) {
        return Err(ServerError::BadRequest(format!(
            "Unsupported file type, expected one of: {}", CATALOG_EXTENSIONS.join(", "))));
    }
    if bytes.is_empty() {
        return Err(ServerError::BadRequest("Uploaded file is empty".to_string()));
    }
    info!(file = %file_name, size = bytes.len(), top_k = ?params.top_k, "Received query image");

    let search = state.search.clone();
    let results = tokio::task::spawn_blocking(move || search.search_bytes(&file_name, &bytes, params.top_k))
        .await
        .map_err(|e| ServerError::Internal(format!("Query task failed: {}", e)))??;
    debug!(count = results.len(), "Returning matches");

    Ok(Json(UploadResponse {
        results: results.into_iter()
            .map(|r| MatchItem { path: catalog_path(&r.identifier), similarity: r.similarity })
            .collect(),
    }))
}

/// Route-relative path under which the catalog image `identifier` is served.
pub fn catalog_path(identifier: &str) -> String {
    let encoded: Vec<String> = identifier.split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect();
    format!("{}/{}", CATALOG_ROUTE.trim_start_matches('/'), encoded.join("/"))
}

// Private functions

fn has_allowed_extension(file_name: &str) -> bool {
    file_name.rsplit_once('.')
        .map(|(_, ext)| CATALOG_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
        .unwrap_or(false)
}
