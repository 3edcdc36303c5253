//! The [`BlobBackend`] capability and its filesystem implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use meridian_core::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

/// A content-addressed physical key: `sha256(content)`, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalKey(String);

impl PhysicalKey {
    /// Compute the physical key for the given bytes.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-computed hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Borrow the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Byte-range put/get/delete of physical blobs keyed by content hash
/// (spec C1).
///
/// This is the capability boundary between the object engine and whatever
/// durable store backs it; the S3/console HTTP surfaces and any
/// network-attached object store are out of scope (§1) and would implement
/// the same trait.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Store `data` under `key`, overwriting any existing blob.
    async fn put(&self, key: &PhysicalKey, data: &[u8]) -> CoreResult<()>;

    /// Store a multipart upload part under `key` with the given part
    /// number, using the `.part.<n>` staging layout (§6.3) until the
    /// upload is composed.
    async fn put_part(&self, key: &PhysicalKey, part_number: u32, data: &[u8]) -> CoreResult<()>;

    /// Read the full blob stored under `key`.
    async fn get(&self, key: &PhysicalKey) -> CoreResult<Vec<u8>>;

    /// Read a byte range `[start, end)` of the blob stored under `key`.
    async fn get_range(&self, key: &PhysicalKey, start: u64, end: u64) -> CoreResult<Vec<u8>>;

    /// Remove the blob stored under `key`. Not an error if absent.
    async fn delete(&self, key: &PhysicalKey) -> CoreResult<()>;

    /// Remove a staged multipart part. Not an error if absent.
    async fn delete_part(&self, key: &PhysicalKey, part_number: u32) -> CoreResult<()>;

    /// Whether a blob exists under `key`.
    async fn exists(&self, key: &PhysicalKey) -> CoreResult<bool>;
}

/// A [`BlobBackend`] backed by the local filesystem.
///
/// Layout (§6.3): files are named by `sha256(content)`; the first two hex
/// characters form a fan-out directory so no single directory holds every
/// blob in the store. Multipart parts are stored alongside the eventual
/// composed object's directory with a `.part.<n>` suffix until composition.
#[derive(Debug, Clone)]
pub struct FilesystemBlobBackend {
    root: PathBuf,
}

impl FilesystemBlobBackend {
    /// Construct a backend rooted at `root`, creating it if necessary.
    ///
    /// # Errors
    /// Returns [`CoreError::TransientStorage`] if the root directory cannot
    /// be created.
    pub fn new(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| CoreError::TransientStorage(format!("create blob root: {e}")))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &PhysicalKey) -> PathBuf {
        let hex = key.as_str();
        let fanout = &hex[..hex.len().min(2)];
        self.root.join(fanout).join(hex)
    }

    fn part_path_for(&self, key: &PhysicalKey, part_number: u32) -> PathBuf {
        let mut path = self.path_for(key).into_os_string();
        path.push(format!(".part.{part_number}"));
        PathBuf::from(path)
    }

    async fn write_file(path: &Path, data: &[u8]) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::TransientStorage(format!("create blob dir: {e}")))?;
        }
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| CoreError::TransientStorage(format!("create blob file: {e}")))?;
        file.write_all(data)
            .await
            .map_err(|e| CoreError::TransientStorage(format!("write blob: {e}")))?;
        file.flush()
            .await
            .map_err(|e| CoreError::TransientStorage(format!("flush blob: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl BlobBackend for FilesystemBlobBackend {
    async fn put(&self, key: &PhysicalKey, data: &[u8]) -> CoreResult<()> {
        let path = self.path_for(key);
        trace!(path = %path.display(), len = data.len(), "writing blob");
        Self::write_file(&path, data).await
    }

    async fn put_part(&self, key: &PhysicalKey, part_number: u32, data: &[u8]) -> CoreResult<()> {
        let path = self.part_path_for(key, part_number);
        Self::write_file(&path, data).await
    }

    async fn get(&self, key: &PhysicalKey) -> CoreResult<Vec<u8>> {
        let path = self.path_for(key);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(format!("blob {}", key.as_str()))
            } else {
                CoreError::TransientStorage(format!("read blob: {e}"))
            }
        })
    }

    async fn get_range(&self, key: &PhysicalKey, start: u64, end: u64) -> CoreResult<Vec<u8>> {
        let path = self.path_for(key);
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(format!("blob {}", key.as_str()))
            } else {
                CoreError::TransientStorage(format!("open blob: {e}"))
            }
        })?;
        use tokio::io::AsyncSeekExt;
        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| CoreError::TransientStorage(format!("seek blob: {e}")))?;
        let len = usize::try_from(end.saturating_sub(start)).unwrap_or(usize::MAX);
        let mut buf = vec![0_u8; len];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| CoreError::TransientStorage(format!("read blob range: {e}")))?;
        Ok(buf)
    }

    async fn delete(&self, key: &PhysicalKey) -> CoreResult<()> {
        let path = self.path_for(key);
        debug!(path = %path.display(), "deleting blob");
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(CoreError::TransientStorage(format!("delete blob: {e}"))),
        }
    }

    async fn delete_part(&self, key: &PhysicalKey, part_number: u32) -> CoreResult<()> {
        let path = self.part_path_for(key, part_number);
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(CoreError::TransientStorage(format!("delete part: {e}"))),
        }
    }

    async fn exists(&self, key: &PhysicalKey) -> CoreResult<bool> {
        Ok(self.path_for(key).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBlobBackend::new(dir.path()).unwrap();
        let key = PhysicalKey::of(b"hello");
        backend.put(&key, b"hello").await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), b"hello");
        assert!(backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_range_reads_subrange() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBlobBackend::new(dir.path()).unwrap();
        let key = PhysicalKey::of(b"0123456789");
        backend.put(&key, b"0123456789").await.unwrap();
        assert_eq!(backend.get_range(&key, 2, 5).await.unwrap(), b"234");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBlobBackend::new(dir.path()).unwrap();
        let key = PhysicalKey::of(b"x");
        backend.delete(&key).await.unwrap();
        backend.put(&key, b"x").await.unwrap();
        backend.delete(&key).await.unwrap();
        assert!(!backend.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBlobBackend::new(dir.path()).unwrap();
        let key = PhysicalKey::from_hex("deadbeef");
        let err = backend.get(&key).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_multipart_parts_are_staged_separately() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBlobBackend::new(dir.path()).unwrap();
        let key = PhysicalKey::of(b"composed");
        backend.put_part(&key, 1, b"part-one").await.unwrap();
        backend.put_part(&key, 2, b"part-two").await.unwrap();
        assert!(!backend.exists(&key).await.unwrap());
        backend.delete_part(&key, 1).await.unwrap();
        backend.delete_part(&key, 2).await.unwrap();
    }
}
