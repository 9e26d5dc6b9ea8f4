use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Storage, StorageError, StorageResult};

/// In-memory storage implementation
///
/// Suitable for tests and single-process deployments; contents are lost
/// when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.data
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.data
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match self.data.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::KeyNotFound(key.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.read().await.contains_key(key))
    }

    /// Keys are returned sorted, so hydration order is deterministic
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let map = self.data.read().await;
        let mut keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}
