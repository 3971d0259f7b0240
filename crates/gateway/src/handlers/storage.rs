use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use dropshare_protocol::Action;

use crate::error::ApiError;
use crate::AppState;

/// Cap for raw object and part bodies.
pub const UPLOAD_BODY_LIMIT: usize = 100 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    key: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartQuery {
    key: Option<String>,
    upload_id: Option<String>,
    part_number: Option<u32>,
    token: Option<String>,
}

/// Buffers the body up to `limit`; anything larger is rejected before
/// any storage I/O happens.
async fn collect_body(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    let mut buffered = Vec::new();
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let data = chunk.map_err(|_| ApiError::Validation("Stream error".to_string()))?;
        if buffered.len() + data.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        buffered.extend_from_slice(&data);
    }
    Ok(Bytes::from(buffered))
}

// ── Direct storage endpoints ────────────────────────────────────
// Trust is carried entirely by the capability token: these routes are
// reached without any bearer credential.

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObjectQuery>,
    body: Body,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (key, token) = match (query.key, query.token) {
        (Some(key), Some(token)) => (key, token),
        _ => return Err(ApiError::Validation("Missing key or token".to_string())),
    };

    let claims = state.capabilities.verify(&token, Action::Upload)?;
    if !claims.binds(&key, None, None) {
        return Err(ApiError::Forbidden("Key mismatch".to_string()));
    }

    let bytes = collect_body(body, UPLOAD_BODY_LIMIT).await?;
    state.objects.store(&key, &bytes).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, ApiError> {
    let (key, token) = match (query.key, query.token) {
        (Some(key), Some(token)) => (key, token),
        _ => return Err(ApiError::Validation("Missing key or token".to_string())),
    };

    let claims = state.capabilities.verify(&token, Action::Download)?;
    if !claims.binds(&key, None, None) {
        return Err(ApiError::Forbidden("Key mismatch".to_string()));
    }

    let bytes = state
        .objects
        .read(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, bytes.len().to_string()),
        ],
        bytes,
    )
        .into_response())
}

pub async fn upload_part(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PartQuery>,
    body: Body,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (key, upload_id, part_number, token) =
        match (query.key, query.upload_id, query.part_number, query.token) {
            (Some(key), Some(upload_id), Some(part_number), Some(token)) => {
                (key, upload_id, part_number, token)
            }
            _ => return Err(ApiError::Validation("Missing query params".to_string())),
        };

    let claims = state.capabilities.verify(&token, Action::UploadPart)?;
    if !claims.binds(&key, Some(&upload_id), Some(part_number)) {
        return Err(ApiError::Forbidden("Params mismatch".to_string()));
    }

    let bytes = collect_body(body, UPLOAD_BODY_LIMIT).await?;
    state
        .multipart
        .append_part(&upload_id, part_number, &bytes)
        .await?;

    // Placeholder identifier, not a content digest.
    let etag = format!("\"{}-{}\"", bytes.len(), part_number);
    Ok(Json(json!({ "etag": etag })))
}
