pub mod memory;
pub mod s3;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store bucket does not exist. {0}")]
    BucketDoesNotExist(String),
    #[error("Object does not exist. {0}")]
    DoesNotExist(String),
    #[error("Not authorized to access store. {0}")]
    NotAuthorized(String),
    #[error("Error connecting to store. {0}")]
    ConnectionError(String),
    #[error("Store I/O error. {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed metadata for key {key}. {message}")]
    BadMetadata { key: String, message: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A value read back together with the metadata written alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub metadata: Option<Value>,
}

/// Key under which backends without a native metadata slot keep the sidecar.
pub fn metadata_key(key: &str) -> String {
    format!("{}.meta.json", key)
}

pub fn encode_metadata(metadata: &Value) -> Vec<u8> {
    // Serializing a `Value` cannot fail.
    serde_json::to_vec(metadata).unwrap_or_default()
}

pub fn decode_metadata(key: &str, bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::BadMetadata {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn init(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>>;
    /// Replaces the value and its metadata. Passing `None` clears any previous metadata.
    async fn put(&self, key: &str, value: Vec<u8>, metadata: Option<Value>) -> Result<()>;
    /// Removing a key that does not exist is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}
