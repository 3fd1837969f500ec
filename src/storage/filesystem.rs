use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::NamedTempFile;

/// Stores blobs as files below a root directory per bucket.
#[derive(Debug, Clone, Default)]
pub struct FilesystemStore;

impl FilesystemStore {
    pub fn new() -> Self {
        Self
    }

    fn resolve(bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(Path::new(bucket).join(relative))
    }

    fn write_atomic(path: PathBuf, data: Vec<u8>) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Storage(format!("No parent directory: {}", path.display())))?;
        // Concurrent workers may race on the same directory; create_dir_all
        // treats an existing directory as success.
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = Self::resolve(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(path.display().to_string()))
            }
            Err(e) => Err(Error::Read(format!("{}: {}", path.display(), e))),
        }
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = Self::resolve(bucket, key)?;
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || Self::write_atomic(path, data))
            .await
            .map_err(|e| Error::Storage(format!("Write task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_creates_directories_and_get_reads_back() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().to_string_lossy().to_string();
        let store = FilesystemStore::new();

        store
            .put(&bucket, "comp/2024/photo.jpeg", b"jpeg bytes", "image/jpeg")
            .await
            .unwrap();

        assert!(dir.path().join("comp/2024/photo.jpeg").exists());
        let bytes = store.get(&bucket, "comp/2024/photo.jpeg").await.unwrap();
        assert_eq!(bytes, b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().to_string_lossy().to_string();
        let store = FilesystemStore::new();

        store.put(&bucket, "a.jpeg", b"first", "image/jpeg").await.unwrap();
        store.put(&bucket, "a.jpeg", b"second", "image/jpeg").await.unwrap();

        assert_eq!(store.get(&bucket, "a.jpeg").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().to_string_lossy().to_string();

        let err = FilesystemStore::new()
            .get(&bucket, "missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_parent_traversal() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().to_string_lossy().to_string();

        let err = FilesystemStore::new()
            .get(&bucket, "../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_concurrent_puts_into_same_directory() {
        let dir = TempDir::new().unwrap();
        let bucket = dir.path().to_string_lossy().to_string();
        let store = FilesystemStore::new();

        let writes = (0..8).map(|i| {
            let store = store.clone();
            let bucket = bucket.clone();
            tokio::spawn(async move {
                store
                    .put(&bucket, &format!("comp/shared/{}.jpeg", i), b"x", "image/jpeg")
                    .await
            })
        });

        for handle in futures::future::join_all(writes).await {
            handle.unwrap().unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path().join("comp/shared")).unwrap().count(), 8);
    }
}
