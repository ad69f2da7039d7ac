use async_trait::async_trait;
use kvconf_core::store::{decode_metadata, encode_metadata, metadata_key, KvEntry, Result, Store};
use serde_json::Value;
use std::{io::ErrorKind, path::PathBuf};

/// Keeps each key as a file under `base_path`, with metadata in a `<key>.meta.json` sidecar.
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    pub fn new(base_path: PathBuf) -> std::result::Result<Self, std::io::Error> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.base_path.join(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.base_path.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Store for FileSystemStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read(key).await
    }

    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>> {
        let Some(value) = self.read(key).await? else {
            return Ok(None);
        };
        let sidecar = metadata_key(key);
        let metadata = match self.read(&sidecar).await? {
            Some(bytes) => Some(decode_metadata(&sidecar, &bytes)?),
            None => None,
        };
        Ok(Some(KvEntry { value, metadata }))
    }

    async fn put(&self, key: &str, value: Vec<u8>, metadata: Option<Value>) -> Result<()> {
        self.write(key, &value).await?;
        let sidecar = metadata_key(key);
        match metadata {
            Some(metadata) => self.write(&sidecar, &encode_metadata(&metadata)).await,
            None => self.delete(&sidecar).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete(key).await?;
        self.delete(&metadata_key(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.base_path.join(key)).await?)
    }
}
