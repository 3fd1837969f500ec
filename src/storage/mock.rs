use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// In-memory store keyed by `bucket/key`, with scripted read failures.
#[derive(Clone, Default)]
pub struct MockBlobStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    content_types: Arc<Mutex<HashMap<String, String>>>,
    get_attempts: Arc<Mutex<Vec<Instant>>>,
    put_count: Arc<Mutex<usize>>,
    read_failures: Arc<Mutex<usize>>,
    fail_puts: Arc<Mutex<bool>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, bucket: &str, key: &str, content: Vec<u8>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(Self::path(bucket, key), content);
        self
    }

    /// Fails the next `count` reads with a read error before serving files.
    pub fn with_read_failures(self, count: usize) -> Self {
        *self.read_failures.lock().unwrap() = count;
        self
    }

    pub fn with_put_failure(self, should_fail: bool) -> Self {
        *self.fail_puts.lock().unwrap() = should_fail;
        self
    }

    pub fn get_attempts(&self) -> Vec<Instant> {
        self.get_attempts.lock().unwrap().clone()
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_file(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&Self::path(bucket, key))
            .cloned()
    }

    pub fn get_content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.content_types
            .lock()
            .unwrap()
            .get(&Self::path(bucket, key))
            .cloned()
    }

    fn path(bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get_attempts.lock().unwrap().push(Instant::now());

        {
            let mut failures = self.read_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Read("Mock read failure".to_string()));
            }
        }

        let path = Self::path(bucket, key);
        self.files
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or(Error::NotFound(path))
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        if *self.fail_puts.lock().unwrap() {
            return Err(Error::Storage("Mock write failure".to_string()));
        }

        *self.put_count.lock().unwrap() += 1;
        let path = Self::path(bucket, key);
        self.content_types
            .lock()
            .unwrap()
            .insert(path.clone(), content_type.to_string());
        self.files.lock().unwrap().insert(path, data.to_vec());
        Ok(())
    }
}
