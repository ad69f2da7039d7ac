use super::{decode_metadata, encode_metadata, metadata_key, KvEntry, Result, Store, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode, Url};
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct S3Config {
    pub key: String,
    pub endpoint: String,
    pub secret: String,
    pub token: Option<String>,
    pub bucket: String,
    pub region: String,
    pub bucket_prefix: Option<String>,
}

const SIGNED_URL_DURATION: Duration = Duration::from_secs(60 * 60);

/// Stores each key as an object, with its metadata in a `<key>.meta.json` sidecar object.
pub struct S3Store {
    bucket: Bucket,
    bucket_checked: OnceLock<()>,
    client: Client,
    credentials: Credentials,
    prefix: Option<String>,
}

impl S3Store {
    pub fn new(config: S3Config) -> Result<Self> {
        let credentials = if let Some(token) = config.token {
            Credentials::new_with_token(config.key, config.secret, token)
        } else {
            Credentials::new(config.key, config.secret)
        };
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            StoreError::ConnectionError(format!("Invalid endpoint {}: {}", config.endpoint, e))
        })?;
        // localhost endpoints (minio and friends) need http://localhost:<port>/<bucket>
        // instead of <scheme>://<bucket>.<endpoint>
        let url_style = if endpoint.host_str() == Some("localhost") {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };
        let bucket = Bucket::new(endpoint, url_style, config.bucket, config.region)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        Ok(S3Store {
            bucket,
            bucket_checked: OnceLock::new(),
            client: Client::new(),
            credentials,
            prefix: config.bucket_prefix.filter(|p| !p.is_empty()),
        })
    }

    async fn store_request<'a, A: S3Action<'a>>(
        &self,
        method: Method,
        action: A,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        let url = action.sign_with_time(SIGNED_URL_DURATION, &OffsetDateTime::now_utc());
        let mut request = self.client.request(method, url);

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::DoesNotExist(
                "Received NOT_FOUND from S3-compatible API.".to_string(),
            )),
            StatusCode::FORBIDDEN => Err(StoreError::NotAuthorized(
                "Received FORBIDDEN from S3-compatible API.".to_string(),
            )),
            StatusCode::UNAUTHORIZED => Err(StoreError::NotAuthorized(
                "Received UNAUTHORIZED from S3-compatible API.".to_string(),
            )),
            status => Err(StoreError::ConnectionError(format!(
                "Received {} from S3-compatible API.",
                status
            ))),
        }
    }

    async fn read_response_bytes(response: Response) -> Result<Bytes> {
        response
            .bytes()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))
    }

    fn prefixed_key(&self, key: &str) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}/{}", prefix, key)
        } else {
            key.to_string()
        }
    }

    async fn check_bucket(&self) -> Result<()> {
        if self.bucket_checked.get().is_some() {
            return Ok(());
        }

        let action = self.bucket.head_bucket(Some(&self.credentials));
        match self.store_request(Method::HEAD, action, None).await {
            // A 404 on a bucket HEAD means the bucket itself is missing.
            Err(StoreError::DoesNotExist(_)) => {
                return Err(StoreError::BucketDoesNotExist(
                    "Bucket does not exist.".to_string(),
                ))
            }
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        let _ = self.bucket_checked.set(());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_bucket().await?;
        let prefixed_key = self.prefixed_key(key);
        let action = self
            .bucket
            .get_object(Some(&self.credentials), &prefixed_key);

        match self.store_request(Method::GET, action, None).await {
            Ok(response) => Ok(Some(Self::read_response_bytes(response).await?.to_vec())),
            Err(StoreError::DoesNotExist(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_object(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_bucket().await?;
        let prefixed_key = self.prefixed_key(key);
        let action = self
            .bucket
            .put_object(Some(&self.credentials), &prefixed_key);
        self.store_request(Method::PUT, action, Some(value)).await?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.check_bucket().await?;
        let prefixed_key = self.prefixed_key(key);
        let action = self
            .bucket
            .delete_object(Some(&self.credentials), &prefixed_key);
        match self.store_request(Method::DELETE, action, None).await {
            Ok(_) | Err(StoreError::DoesNotExist(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn init(&self) -> Result<()> {
        self.check_bucket().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_object(key).await
    }

    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>> {
        let Some(value) = self.get_object(key).await? else {
            return Ok(None);
        };
        let sidecar = metadata_key(key);
        let metadata = match self.get_object(&sidecar).await? {
            Some(bytes) => Some(decode_metadata(&sidecar, &bytes)?),
            None => None,
        };
        Ok(Some(KvEntry { value, metadata }))
    }

    async fn put(&self, key: &str, value: Vec<u8>, metadata: Option<Value>) -> Result<()> {
        // Value first: a failed sidecar write leaves stale metadata, never metadata
        // describing a value that was not stored.
        self.put_object(key, value).await?;
        let sidecar = metadata_key(key);
        match metadata {
            Some(metadata) => self.put_object(&sidecar, encode_metadata(&metadata)).await,
            None => self.delete_object(&sidecar).await,
        }
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete_object(key).await?;
        self.delete_object(&metadata_key(key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_bucket().await?;
        let prefixed_key = self.prefixed_key(key);
        let action = self
            .bucket
            .head_object(Some(&self.credentials), &prefixed_key);
        match self.store_request(Method::HEAD, action, None).await {
            Ok(_) => Ok(true),
            Err(StoreError::DoesNotExist(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
