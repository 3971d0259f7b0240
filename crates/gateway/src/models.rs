use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_CONTENT_TYPE_LENGTH: usize = 100;
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const DANGEROUS_TYPES: [&str; 2] = ["application/x-msdownload", "application/x-msdos-program"];

// ── Request payloads ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub upload_password: String,
    pub download_password: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_name: String,
    pub content_type: Option<String>,
}

impl UploadUrlRequest {
    /// Returns the sanitized file name and effective content type, or a
    /// validation error.
    pub fn validate(&self) -> Result<(String, String), ApiError> {
        if self.file_name.is_empty() || self.file_name.chars().count() > MAX_FILE_NAME_LENGTH {
            return Err(ApiError::Validation("Invalid file name".to_string()));
        }
        let content_type = self
            .content_type
            .clone()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        if content_type.len() > MAX_CONTENT_TYPE_LENGTH {
            return Err(ApiError::Validation("Content type too long".to_string()));
        }
        if DANGEROUS_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::Validation("Content type not allowed".to_string()));
        }
        Ok((sanitize_file_name(&self.file_name), content_type))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteRequest {
    pub file_id: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlRequest {
    pub part_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Debug, Deserialize)]
pub struct MultipartCompleteRequest {
    pub parts: Vec<CompletedPart>,
}

// ── Response payloads ───────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareResponse {
    pub id: String,
    pub upload_link: String,
    pub upload_password: String,
    pub download_link: String,
    pub download_password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub url: String,
    pub method: &'static str,
    pub expires_in: i64,
    pub file_id: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInitResponse {
    pub upload_id: String,
    pub file_id: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrlResponse {
    pub url: String,
    pub method: &'static str,
    pub part_number: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteResponse {
    pub file_id: String,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: String,
    pub original_name: String,
    pub size: u64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub url: String,
    pub method: &'static str,
    pub expires_in: i64,
    pub original_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: bool,
    pub file_id: String,
}

/// Strips `..` sequences and path separators, caps the length, falls
/// back to `"file"` when nothing survives.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base: String = file_name
        .replace("..", "")
        .chars()
        .filter(|c| *c != '/' && *c != '\\')
        .collect();
    let trimmed: String = base.chars().take(MAX_FILE_NAME_LENGTH).collect();
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal_and_separators() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_file_name("dir\\evil.exe"), "direvil.exe");
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("..//"), "file");

        let long = "x".repeat(400);
        assert_eq!(sanitize_file_name(&long).chars().count(), MAX_FILE_NAME_LENGTH);
    }

    #[test]
    fn upload_request_validation() {
        let ok = UploadUrlRequest {
            file_name: "notes.txt".into(),
            content_type: Some("text/plain".into()),
        };
        assert_eq!(
            ok.validate().unwrap(),
            ("notes.txt".to_string(), "text/plain".to_string())
        );

        let defaulted = UploadUrlRequest {
            file_name: "notes.txt".into(),
            content_type: None,
        };
        assert_eq!(defaulted.validate().unwrap().1, DEFAULT_CONTENT_TYPE);

        let dangerous = UploadUrlRequest {
            file_name: "setup.exe".into(),
            content_type: Some("application/x-msdownload".into()),
        };
        assert!(dangerous.validate().is_err());

        let empty = UploadUrlRequest {
            file_name: String::new(),
            content_type: None,
        };
        assert!(empty.validate().is_err());

        let oversized_type = UploadUrlRequest {
            file_name: "a".into(),
            content_type: Some("t".repeat(MAX_CONTENT_TYPE_LENGTH + 1)),
        };
        assert!(oversized_type.validate().is_err());
    }
}
