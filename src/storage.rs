use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::{ModyfireError, Result};

/// Where generated artifacts are kept, partitioned by owner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `bytes` and return a locator for them.
    async fn write(&self, owner_id: &str, filename: &str, bytes: &[u8]) -> Result<String>;

    /// Remove everything stored for `owner_id`, returning how many files went away.
    async fn delete_all(&self, owner_id: &str) -> Result<u64>;
}

/// Filesystem storage rooted at a directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_dir(&self, owner_id: &str) -> Result<PathBuf> {
        if !is_valid_owner(owner_id) {
            return Err(ModyfireError::Storage(format!("invalid owner id '{}'", owner_id.escape_debug())));
        }
        Ok(self.root.join(owner_id))
    }
}

/// Owner ids name a directory verbatim, so two distinct ids never share one.
fn is_valid_owner(owner_id: &str) -> bool {
    !owner_id.is_empty()
        && owner_id != "."
        && owner_id != ".."
        && owner_id.trim() == owner_id
        && !owner_id.chars().any(|c| c == '/' || c == '\\' || c == ':' || c.is_control())
}

/// Final path component of `name`, or None if nothing usable is left.
fn safe_component(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

#[async_trait]
impl Storage for LocalStorage {
    async fn write(&self, owner_id: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.owner_dir(owner_id)?;
        let name = safe_component(filename).unwrap_or_else(|| "artifact".to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}_{}", Uuid::new_v4(), name));
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn delete_all(&self, owner_id: &str) -> Result<u64> {
        let dir = self.owner_dir(owner_id)?;
        if !dir.exists() {
            return Ok(0);
        }
        let count = WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count() as u64;
        tokio::fs::remove_dir_all(&dir).await?;
        info!("Deleted {} stored files for {}", count, owner_id);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;

    #[tokio::test]
    async fn test_write_partitions_by_owner() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path());

        let a = storage.write("alice", "deck.pdf", b"%PDF-1.5").await.unwrap();
        let b = storage.write("alice", "deck.pdf", b"%PDF-1.5").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(&temp.path().join("alice").to_string_lossy().into_owned()));
        assert!(a.ends_with("_deck.pdf"));
        assert_eq!(std::fs::read(&a).unwrap(), b"%PDF-1.5");
    }

    #[tokio::test]
    async fn test_filename_cannot_escape_owner_dir() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path());

        let locator = storage.write("bob", "../../etc/passwd", b"x").await.unwrap();
        assert!(Path::new(&locator).starts_with(temp.path().join("bob")));
        assert!(storage.write("..", "a.txt", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_owner_id_with_separator_is_rejected() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path());
        let alice = storage.write("alice", "deck.pdf", b"%PDF").await.unwrap();

        for owner in ["mallory/alice", "x\\alice", "../alice", "", " alice", "al\nice", "C:alice"] {
            let err = storage.delete_all(owner).await.unwrap_err();
            assert!(matches!(err, ModyfireError::Storage(_)), "{:?} was accepted", owner);
            assert!(storage.write(owner, "a.txt", b"x").await.is_err());
        }
        assert!(Path::new(&alice).exists());
        assert_eq!(storage.delete_all("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_all_counts_files() {
        let temp = TempDir::new().unwrap();
        temp.child("carol/one.pdf").write_binary(b"1").unwrap();
        temp.child("carol/nested/two.mp3").write_binary(b"2").unwrap();
        temp.child("dave/keep.pdf").write_binary(b"3").unwrap();
        let storage = LocalStorage::new(temp.path());

        assert_eq!(storage.delete_all("carol").await.unwrap(), 2);
        assert!(!temp.child("carol").path().exists());
        assert!(temp.child("dave/keep.pdf").path().exists());
        assert_eq!(storage.delete_all("nobody").await.unwrap(), 0);
    }
}
