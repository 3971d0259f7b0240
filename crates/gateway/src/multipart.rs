use std::time::{Duration, SystemTime};

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use crate::store::{ObjectStore, StoreError};

/// Sessions untouched for longer than this are considered abandoned.
pub const STALE_SESSION_AGE: Duration = Duration::from_secs(60 * 60);

const SESSION_PREFIX: &str = "multipart";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Chunked-upload sessions layered over the object store. Parts live at
/// `multipart/{uploadId}/{partNumber}` until `complete` concatenates them
/// into one object in ascending part-number order.
#[derive(Debug, Clone)]
pub struct MultipartStore {
    objects: ObjectStore,
}

impl MultipartStore {
    pub fn new(objects: ObjectStore) -> Self {
        Self { objects }
    }

    /// Time-derived id plus 8 random base36 chars. Uniqueness is
    /// probabilistic: two sessions started in the same millisecond with
    /// the same suffix would merge their part storage.
    pub fn new_upload_id() -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..8)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!("mp-{}-{}", Utc::now().timestamp_millis(), suffix)
    }

    fn part_key(upload_id: &str, part_number: u32) -> String {
        format!("{SESSION_PREFIX}/{upload_id}/{part_number}")
    }

    /// Re-uploading a part number overwrites it, so a client can retry a
    /// failed chunk without re-initiating the session.
    pub async fn append_part(
        &self,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.objects
            .store(&Self::part_key(upload_id, part_number), bytes)
            .await
    }

    pub async fn read_part(
        &self,
        upload_id: &str,
        part_number: u32,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.objects
            .read(&Self::part_key(upload_id, part_number))
            .await
    }

    /// Reassembles the session into `target_key`. Part numbers may arrive
    /// in any order; they are sorted ascending before concatenation.
    /// Missing parts are skipped rather than failing the upload (the
    /// part-url flow never hands out numbers that were not uploaded, but
    /// a lost part file silently shortens the object). Completion is a
    /// snapshot, not a barrier: a part landing after the list was read is
    /// not included. Returns the assembled byte count.
    pub async fn complete(
        &self,
        upload_id: &str,
        target_key: &str,
        part_numbers: &[u32],
    ) -> Result<u64, StoreError> {
        let mut sorted = part_numbers.to_vec();
        sorted.sort_unstable();

        let mut assembled = Vec::new();
        for part_number in sorted {
            if let Some(chunk) = self.read_part(upload_id, part_number).await? {
                assembled.extend_from_slice(&chunk);
            }
        }

        let size = assembled.len() as u64;
        self.objects.store(target_key, &assembled).await?;

        // The object is durably written; cleanup failure must never fail
        // the logical upload.
        if let Err(err) = self.remove_session(upload_id).await {
            warn!("cleanup of multipart session {upload_id} failed: {err}");
        }
        Ok(size)
    }

    async fn remove_session(&self, upload_id: &str) -> Result<(), StoreError> {
        let dir = self
            .objects
            .resolve_key(&format!("{SESSION_PREFIX}/{upload_id}"))?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes session directories whose mtime exceeds the stale age.
    /// Runs detached from any request; a failure on one directory does
    /// not stop the sweep.
    pub async fn reap_stale(&self) {
        self.reap_older_than(STALE_SESSION_AGE).await;
    }

    async fn reap_older_than(&self, max_age: Duration) {
        let sessions_dir = match self.objects.resolve_key(SESSION_PREFIX) {
            Ok(dir) => dir,
            Err(_) => return,
        };
        // The multipart dir may not exist until the first part upload.
        let mut entries = match tokio::fs::read_dir(&sessions_dir).await {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!("stale-session sweep stopped early: {err}");
                    break;
                }
            };
            if let Err(err) = reap_entry(&entry, now, max_age).await {
                warn!(
                    "failed to reap multipart session {:?}: {err}",
                    entry.file_name()
                );
            }
        }
    }
}

async fn reap_entry(
    entry: &tokio::fs::DirEntry,
    now: SystemTime,
    max_age: Duration,
) -> std::io::Result<()> {
    let meta = entry.metadata().await?;
    if !meta.is_dir() {
        return Ok(());
    }
    let age = now
        .duration_since(meta.modified()?)
        .unwrap_or_default();
    if age > max_age {
        tokio::fs::remove_dir_all(entry.path()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multipart_in(dir: &tempfile::TempDir) -> MultipartStore {
        MultipartStore::new(ObjectStore::new(dir.path()).unwrap())
    }

    #[test]
    fn upload_ids_are_well_formed_and_distinct() {
        let id = MultipartStore::new_upload_id();
        let rest = id.strip_prefix("mp-").unwrap();
        let (millis, suffix) = rest.split_once('-').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        assert_ne!(id, MultipartStore::new_upload_id());
    }

    #[tokio::test]
    async fn parts_assemble_in_part_number_order() {
        let dir = tempfile::tempdir().unwrap();
        let multipart = multipart_in(&dir);

        // Arrival order 2, 1, 3; completion list in arbitrary order.
        multipart.append_part("mp-1-aaaaaaaa", 2, b"bbb").await.unwrap();
        multipart.append_part("mp-1-aaaaaaaa", 1, b"aaa").await.unwrap();
        multipart.append_part("mp-1-aaaaaaaa", 3, b"ccc").await.unwrap();

        let size = multipart
            .complete("mp-1-aaaaaaaa", "out/object", &[3, 1, 2])
            .await
            .unwrap();
        assert_eq!(size, 9);

        let store = ObjectStore::new(dir.path()).unwrap();
        assert_eq!(store.read("out/object").await.unwrap().unwrap(), b"aaabbbccc");
    }

    #[tokio::test]
    async fn reuploaded_part_wins() {
        let dir = tempfile::tempdir().unwrap();
        let multipart = multipart_in(&dir);

        multipart.append_part("mp-2-bbbbbbbb", 1, b"one").await.unwrap();
        multipart.append_part("mp-2-bbbbbbbb", 2, b"stale").await.unwrap();
        multipart.append_part("mp-2-bbbbbbbb", 2, b"fresh").await.unwrap();

        multipart
            .complete("mp-2-bbbbbbbb", "out/object", &[1, 2])
            .await
            .unwrap();

        let store = ObjectStore::new(dir.path()).unwrap();
        assert_eq!(store.read("out/object").await.unwrap().unwrap(), b"onefresh");
    }

    #[tokio::test]
    async fn missing_parts_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let multipart = multipart_in(&dir);

        multipart.append_part("mp-3-cccccccc", 1, b"head").await.unwrap();
        multipart.append_part("mp-3-cccccccc", 3, b"tail").await.unwrap();

        let size = multipart
            .complete("mp-3-cccccccc", "out/object", &[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(size, 8);

        let store = ObjectStore::new(dir.path()).unwrap();
        assert_eq!(store.read("out/object").await.unwrap().unwrap(), b"headtail");
    }

    #[tokio::test]
    async fn complete_removes_the_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        let multipart = multipart_in(&dir);

        multipart.append_part("mp-4-dddddddd", 1, b"x").await.unwrap();
        multipart
            .complete("mp-4-dddddddd", "out/object", &[1])
            .await
            .unwrap();

        assert!(!dir.path().join("multipart/mp-4-dddddddd").exists());
    }

    #[tokio::test]
    async fn reaper_removes_only_aged_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let multipart = multipart_in(&dir);

        multipart.append_part("mp-5-eeeeeeee", 1, b"x").await.unwrap();

        // Fresh sessions survive the normal threshold.
        multipart.reap_older_than(STALE_SESSION_AGE).await;
        assert!(dir.path().join("multipart/mp-5-eeeeeeee").exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        multipart.reap_older_than(Duration::from_millis(1)).await;
        assert!(!dir.path().join("multipart/mp-5-eeeeeeee").exists());
    }

    #[tokio::test]
    async fn reaper_tolerates_a_missing_session_area() {
        let dir = tempfile::tempdir().unwrap();
        multipart_in(&dir).reap_stale().await;
    }
}
