use crate::{
    api_types::ConfigMetadata,
    current_timestamp,
    store::{Store, StoreError},
};
use std::sync::Arc;
use thiserror::Error;

/// The single key holding the dashboard config.
pub const CONFIG_KEY: &str = "dashy-config-yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Stored config is not valid UTF-8")]
    NotUtf8,
    #[error("Stored metadata is malformed: {0}")]
    BadMetadata(#[from] serde_json::Error),
}

/// Whole-document access to the config blob and its metadata sidecar.
/// Writes replace the document wholesale; concurrent writers are last-write-wins.
#[derive(Clone)]
pub struct ConfigDocument {
    store: Arc<dyn Store>,
    key: String,
}

impl ConfigDocument {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_key(store, CONFIG_KEY)
    }

    pub fn with_key(store: Arc<dyn Store>, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
        }
    }

    pub async fn load(&self) -> Result<Option<String>, ConfigError> {
        match self.store.get(&self.key).await? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8)?,
            )),
            None => Ok(None),
        }
    }

    pub async fn save(&self, text: &str) -> Result<ConfigMetadata, ConfigError> {
        let metadata = ConfigMetadata {
            last_modified: current_timestamp(),
            size: text.len() as u64,
        };
        self.store
            .put(
                &self.key,
                text.as_bytes().to_vec(),
                Some(serde_json::to_value(&metadata)?),
            )
            .await?;
        Ok(metadata)
    }

    pub async fn reset(&self) -> Result<(), ConfigError> {
        self.store.remove(&self.key).await?;
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool, ConfigError> {
        Ok(self.store.exists(&self.key).await?)
    }

    /// Metadata as recorded at write time, or `None` when no config or no sidecar is stored.
    pub async fn metadata(&self) -> Result<Option<ConfigMetadata>, ConfigError> {
        let Some(entry) = self.store.get_with_metadata(&self.key).await? else {
            return Ok(None);
        };
        match entry.metadata {
            Some(metadata) => Ok(Some(serde_json::from_value(metadata)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn doc() -> ConfigDocument {
        ConfigDocument::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let doc = doc();
        let text = "pageInfo:\n  title: Home ✓\n";
        let metadata = doc.save(text).await.unwrap();
        assert_eq!(metadata.size, text.len() as u64);
        assert_eq!(doc.load().await.unwrap().as_deref(), Some(text));
        assert_eq!(doc.metadata().await.unwrap(), Some(metadata));
        assert!(doc.exists().await.unwrap());
    }

    #[tokio::test]
    async fn reset_makes_config_absent() {
        let doc = doc();
        doc.save("foo: bar").await.unwrap();
        doc.reset().await.unwrap();
        assert_eq!(doc.load().await.unwrap(), None);
        assert_eq!(doc.metadata().await.unwrap(), None);
        assert!(!doc.exists().await.unwrap());
        // Resetting an absent config is fine.
        doc.reset().await.unwrap();
    }

    #[tokio::test]
    async fn save_replaces_whole_document() {
        let doc = doc();
        doc.save("a: 1\nb: 2\n").await.unwrap();
        doc.save("c: 3\n").await.unwrap();
        assert_eq!(doc.load().await.unwrap().as_deref(), Some("c: 3\n"));
        assert_eq!(doc.metadata().await.unwrap().unwrap().size, 5);
    }
}
