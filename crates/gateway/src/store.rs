use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::RngCore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key: path traversal not allowed")]
    Traversal,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// File-system-backed object store. Every logical key resolves to a
/// physical path contained in the storage root; keys that attempt to
/// escape are rejected before any I/O.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize-then-verify key resolution. Keys carrying `..` segments
    /// or absolute prefixes are traversal attempts and rejected outright;
    /// the remaining segments are joined under the root and the result is
    /// checked for containment before it is ever used.
    pub fn resolve_key(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.starts_with('/') || key.starts_with('\\') {
            return Err(StoreError::Traversal);
        }
        if key.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(StoreError::Traversal);
        }

        let mut resolved = self.root.clone();
        for segment in key.split(['/', '\\']) {
            if segment.is_empty() {
                continue;
            }
            resolved.push(segment);
        }

        if resolved != self.root && !resolved.starts_with(&self.root) {
            return Err(StoreError::Traversal);
        }
        Ok(resolved)
    }

    /// Full overwrite write; parent directories are created as needed.
    pub async fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve_key(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    /// Absence is `None`, not an error; callers translate it to 404.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve_key(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Best effort; a missing target is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve_key(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// `prefix/` + 12 random bytes hex-encoded. 96 bits of entropy per
    /// key; collisions are not checked.
    pub fn generate_key(prefix: &str) -> String {
        let mut raw = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut raw);
        format!("{}/{}", prefix, hex::encode(raw))
    }
}
