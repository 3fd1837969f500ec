//! Blob storage for original and compressed images
//!
//! A bucket is a root directory for [`FilesystemStore`] and an object store
//! bucket for [`S3Store`]. The backend is picked once at startup.

pub mod filesystem;
pub mod mock;
pub mod s3;

pub use filesystem::FilesystemStore;
pub use mock::MockBlobStore;
pub use s3::S3Store;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches an object. A missing object is [`crate::Error::NotFound`].
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Creates or overwrites an object.
    async fn put(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) -> Result<()>;
}
