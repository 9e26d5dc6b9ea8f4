//! Storage abstraction for the PAO governance core
//!
//! The core persists one durable record per organization, one per in-flight
//! transition and one per in-flight action evaluation. The concrete layout
//! (ledger account, database row, file) is a collaborator concern; this
//! crate only fixes the key/value contract and ships an in-memory
//! implementation for tests and single-process deployments.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod memory_storage;

pub use memory_storage::MemoryStorage;

/// Storage-related errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            StorageError::DeserializationError(err.to_string())
        } else {
            StorageError::SerializationError(err.to_string())
        }
    }
}

impl From<StorageError> for pao_common::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyNotFound(key) => pao_common::Error::NotFound(key),
            StorageError::SerializationError(msg) | StorageError::DeserializationError(msg) => {
                pao_common::Error::Serialization(msg)
            }
            other => pao_common::Error::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value storage backend
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store raw bytes under a key
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Fetch the bytes stored under a key
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove a key
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Whether a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys starting with a prefix
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Typed JSON access over any [`Storage`] backend
#[async_trait]
pub trait JsonStorage: Storage {
    /// Fetch and deserialize a JSON record
    async fn get_json<T>(&self, key: &str) -> StorageResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let data = self.get(key).await?;
        serde_json::from_slice(&data)
            .map_err(|e| StorageError::DeserializationError(e.to_string()))
    }

    /// Serialize and store a JSON record
    async fn put_json<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let data = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.put(key, &data).await
    }
}

#[async_trait]
impl<S: Storage + ?Sized> JsonStorage for S {}
