use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::RwLock;

/// 12 random bytes hex-encoded: a 24-hex-char record id.
pub fn new_record_id() -> String {
    let mut raw = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

pub fn is_valid_record_id(id: &str) -> bool {
    id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Clone)]
pub struct ShareRecord {
    pub id: String,
    pub name: String,
    pub password_hash: String,
    pub download_password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub share_id: String,
    pub key: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    /// Present while a multipart upload is in flight; cleared on
    /// completion so the record can no longer be addressed as an upload.
    pub upload_id: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// In-process stand-in for the external metadata store. The core only
/// ever consumes it as a lookup-by-id / create / update-field interface.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    shares: RwLock<HashMap<String, ShareRecord>>,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_share(
        &self,
        name: String,
        password_hash: String,
        download_password_hash: String,
    ) -> ShareRecord {
        let record = ShareRecord {
            id: new_record_id(),
            name,
            password_hash,
            download_password_hash,
            created_at: Utc::now(),
        };
        self.shares
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    pub async fn share(&self, id: &str) -> Option<ShareRecord> {
        self.shares.read().await.get(id).cloned()
    }

    pub async fn create_file(
        &self,
        share_id: &str,
        key: String,
        original_name: String,
        content_type: String,
        upload_id: Option<String>,
    ) -> FileRecord {
        let record = FileRecord {
            id: new_record_id(),
            share_id: share_id.to_string(),
            key,
            original_name,
            content_type,
            size: 0,
            upload_id,
            completed: false,
            created_at: Utc::now(),
        };
        self.files
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    pub async fn file(&self, share_id: &str, file_id: &str) -> Option<FileRecord> {
        self.files
            .read()
            .await
            .get(file_id)
            .filter(|file| file.share_id == share_id)
            .cloned()
    }

    pub async fn file_by_upload_id(&self, share_id: &str, upload_id: &str) -> Option<FileRecord> {
        self.files
            .read()
            .await
            .values()
            .find(|file| file.share_id == share_id && file.upload_id.as_deref() == Some(upload_id))
            .cloned()
    }

    pub async fn finish_upload(&self, file_id: &str, size: u64) -> Option<FileRecord> {
        let mut files = self.files.write().await;
        let file = files.get_mut(file_id)?;
        file.completed = true;
        file.size = size;
        Some(file.clone())
    }

    /// Marks the file complete and clears its upload id so the session
    /// can no longer be completed twice.
    pub async fn finish_multipart(&self, file_id: &str, size: u64) -> Option<FileRecord> {
        let mut files = self.files.write().await;
        let file = files.get_mut(file_id)?;
        file.completed = true;
        file.size = size;
        file.upload_id = None;
        Some(file.clone())
    }

    pub async fn remove_file(&self, share_id: &str, file_id: &str) -> Option<FileRecord> {
        let mut files = self.files.write().await;
        if files.get(file_id)?.share_id != share_id {
            return None;
        }
        files.remove(file_id)
    }

    /// Completed files only, oldest first.
    pub async fn completed_files(&self, share_id: &str) -> Vec<FileRecord> {
        let mut files: Vec<FileRecord> = self
            .files
            .read()
            .await
            .values()
            .filter(|file| file.share_id == share_id && file.completed)
            .cloned()
            .collect();
        files.sort_by_key(|file| file.created_at);
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_look_like_object_ids() {
        let id = new_record_id();
        assert!(is_valid_record_id(&id));
        assert_ne!(id, new_record_id());

        assert!(!is_valid_record_id("short"));
        assert!(!is_valid_record_id(&"g".repeat(24)));
        assert!(!is_valid_record_id(&"a".repeat(25)));
    }

    #[tokio::test]
    async fn files_are_scoped_to_their_share() {
        let index = MetadataIndex::new();
        let share = index.create_share(String::new(), "h".into(), "h".into()).await;
        let file = index
            .create_file(&share.id, "k".into(), "n".into(), "t".into(), None)
            .await;

        assert!(index.file(&share.id, &file.id).await.is_some());
        assert!(index.file(&"0".repeat(24), &file.id).await.is_none());
        assert!(index.remove_file(&"0".repeat(24), &file.id).await.is_none());
        assert!(index.remove_file(&share.id, &file.id).await.is_some());
    }

    #[tokio::test]
    async fn listing_returns_only_completed_files() {
        let index = MetadataIndex::new();
        let share = index.create_share(String::new(), "h".into(), "h".into()).await;
        let done = index
            .create_file(&share.id, "k1".into(), "a".into(), "t".into(), None)
            .await;
        index
            .create_file(&share.id, "k2".into(), "b".into(), "t".into(), None)
            .await;

        index.finish_upload(&done.id, 42).await.unwrap();

        let listed = index.completed_files(&share.id).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, done.id);
        assert_eq!(listed[0].size, 42);
    }

    #[tokio::test]
    async fn finishing_a_multipart_file_clears_its_upload_id() {
        let index = MetadataIndex::new();
        let share = index.create_share(String::new(), "h".into(), "h".into()).await;
        let file = index
            .create_file(
                &share.id,
                "k".into(),
                "n".into(),
                "t".into(),
                Some("mp-1-aaaaaaaa".into()),
            )
            .await;

        assert!(index
            .file_by_upload_id(&share.id, "mp-1-aaaaaaaa")
            .await
            .is_some());

        index.finish_multipart(&file.id, 10).await.unwrap();
        assert!(index
            .file_by_upload_id(&share.id, "mp-1-aaaaaaaa")
            .await
            .is_none());
        let finished = index.file(&share.id, &file.id).await.unwrap();
        assert!(finished.completed);
        assert_eq!(finished.size, 10);
    }
}
