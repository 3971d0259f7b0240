use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::warn;

use dropshare_protocol::Role;

use crate::auth::{hash_password, verify_password};
use crate::error::ApiError;
use crate::metadata::is_valid_record_id;
use crate::models::{
    AuthRequest, CreateShareRequest, CreateShareResponse, DeleteResponse, DownloadUrlResponse,
    FileEntry, FilesResponse, MultipartCompleteRequest, MultipartInitResponse, PartUrlRequest,
    PartUrlResponse, TokenResponse, UploadCompleteRequest, UploadCompleteResponse,
    UploadUrlRequest, UploadUrlResponse, MIN_PASSWORD_LENGTH,
};
use crate::multipart::MultipartStore;
use crate::store::ObjectStore;
use crate::AppState;

fn key_prefix(share_id: &str) -> String {
    format!("shares/{share_id}")
}

/// Stale-session sweep, detached from the response cycle. Failures are
/// logged inside the sweep, never propagated.
fn spawn_session_reaper(state: &Arc<AppState>) {
    let multipart = state.multipart.clone();
    tokio::spawn(async move { multipart.reap_stale().await });
}

// ── Share lifecycle ─────────────────────────────────────────────

pub async fn create_share(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateShareRequest>,
) -> Result<Json<CreateShareResponse>, ApiError> {
    if payload.upload_password.len() < MIN_PASSWORD_LENGTH
        || payload.download_password.len() < MIN_PASSWORD_LENGTH
    {
        return Err(ApiError::Validation(
            "Passwords must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.upload_password).await?;
    let download_password_hash = hash_password(&payload.download_password).await?;
    let share = state
        .metadata
        .create_share(
            payload.name.unwrap_or_default(),
            password_hash,
            download_password_hash,
        )
        .await;

    let origin = state.config.share_link_origin();
    tracing::info!("created share {}", share.id);
    Ok(Json(CreateShareResponse {
        upload_link: format!("{origin}/share/{}", share.id),
        upload_password: payload.upload_password,
        download_link: format!("{origin}/share/{}/download", share.id),
        download_password: payload.download_password,
        id: share.id,
    }))
}

async fn authenticate(
    state: &AppState,
    share_id: &str,
    password: &str,
    role: Role,
) -> Result<TokenResponse, ApiError> {
    if !is_valid_record_id(share_id) {
        return Err(ApiError::Validation("Invalid share id".to_string()));
    }
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }
    let share = state
        .metadata
        .share(share_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Share not found".to_string()))?;

    let stored_hash = match role {
        Role::Uploader => &share.password_hash,
        Role::Viewer => &share.download_password_hash,
    };
    if !verify_password(password, stored_hash).await? {
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    let token = state.auth.issue(share_id, role)?;
    Ok(TokenResponse { token })
}

pub async fn auth_uploader(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    authenticate(&state, &id, &payload.password, Role::Uploader)
        .await
        .map(Json)
}

pub async fn auth_viewer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AuthRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    authenticate(&state, &id, &payload.password, Role::Viewer)
        .await
        .map(Json)
}

// ── Uploader-gated routes ───────────────────────────────────────

pub async fn upload_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;
    let share = state
        .metadata
        .share(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Share not found".to_string()))?;

    let (file_name, content_type) = payload.validate()?;
    let key = ObjectStore::generate_key(&key_prefix(&share.id));
    let file = state
        .metadata
        .create_file(&share.id, key.clone(), file_name, content_type, None)
        .await;

    let presigned = state.capabilities.upload_url(&key)?;
    Ok(Json(UploadUrlResponse {
        url: presigned.url,
        method: presigned.method,
        expires_in: presigned.expires_in,
        file_id: file.id,
        key,
    }))
}

pub async fn upload_complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UploadCompleteRequest>,
) -> Result<Json<UploadCompleteResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;

    let file = state
        .metadata
        .file(&id, &payload.file_id)
        .await
        .filter(|file| file.upload_id.is_none())
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    state.metadata.finish_upload(&file.id, payload.size).await;
    spawn_session_reaper(&state);

    Ok(Json(UploadCompleteResponse {
        file_id: payload.file_id,
        completed: true,
    }))
}

pub async fn multipart_init(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UploadUrlRequest>,
) -> Result<Json<MultipartInitResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;
    let share = state
        .metadata
        .share(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Share not found".to_string()))?;

    let (file_name, content_type) = payload.validate()?;
    let key = ObjectStore::generate_key(&key_prefix(&share.id));
    let upload_id = MultipartStore::new_upload_id();
    let file = state
        .metadata
        .create_file(
            &share.id,
            key.clone(),
            file_name,
            content_type,
            Some(upload_id.clone()),
        )
        .await;

    Ok(Json(MultipartInitResponse {
        upload_id,
        file_id: file.id,
        key,
    }))
}

pub async fn part_url(
    State(state): State<Arc<AppState>>,
    Path((id, upload_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<PartUrlRequest>,
) -> Result<Json<PartUrlResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;

    let file = state
        .metadata
        .file_by_upload_id(&id, &upload_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Upload not found".to_string()))?;

    if payload.part_number < 1 {
        return Err(ApiError::Validation("Invalid part number".to_string()));
    }

    let presigned = state
        .capabilities
        .part_url(&file.key, &upload_id, payload.part_number)?;
    Ok(Json(PartUrlResponse {
        url: presigned.url,
        method: presigned.method,
        part_number: payload.part_number,
    }))
}

pub async fn multipart_complete(
    State(state): State<Arc<AppState>>,
    Path((id, upload_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<MultipartCompleteRequest>,
) -> Result<Json<UploadCompleteResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;

    let file = state
        .metadata
        .file_by_upload_id(&id, &upload_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Upload not found".to_string()))?;

    let part_numbers: Vec<u32> = payload.parts.iter().map(|part| part.part_number).collect();
    let size = state
        .multipart
        .complete(&upload_id, &file.key, &part_numbers)
        .await?;

    state.metadata.finish_multipart(&file.id, size).await;
    spawn_session_reaper(&state);

    Ok(Json(UploadCompleteResponse {
        file_id: file.id,
        completed: true,
    }))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Uploader)?;
    if !is_valid_record_id(&file_id) {
        return Err(ApiError::Validation("Invalid file id".to_string()));
    }

    let file = state
        .metadata
        .remove_file(&id, &file_id)
        .await
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    // The record is gone; object removal happens detached and its
    // failure never reaches the caller.
    let objects = state.objects.clone();
    tokio::spawn(async move {
        if let Err(err) = objects.delete(&file.key).await {
            warn!("detached delete of {} failed: {err}", file.key);
        }
    });

    Ok(Json(DeleteResponse {
        deleted: true,
        file_id,
    }))
}

// ── Viewer-gated routes ─────────────────────────────────────────

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FilesResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Viewer)?;

    let files = state
        .metadata
        .completed_files(&id)
        .await
        .into_iter()
        .map(|file| FileEntry {
            id: file.id,
            original_name: file.original_name,
            size: file.size,
            content_type: file.content_type,
            created_at: file.created_at,
        })
        .collect();

    Ok(Json(FilesResponse { files }))
}

pub async fn download_url(
    State(state): State<Arc<AppState>>,
    Path((id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DownloadUrlResponse>, ApiError> {
    state.auth.authorize(&headers, &id, Role::Viewer)?;
    if !is_valid_record_id(&file_id) {
        return Err(ApiError::Validation("Invalid file id".to_string()));
    }

    let file = state
        .metadata
        .file(&id, &file_id)
        .await
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    let presigned = state.capabilities.download_url(&file.key)?;
    Ok(Json(DownloadUrlResponse {
        url: presigned.url,
        method: presigned.method,
        expires_in: presigned.expires_in,
        original_name: file.original_name,
    }))
}
