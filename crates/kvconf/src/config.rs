use crate::stores::filesystem::FileSystemStore;
use anyhow::Result;
use kvconf_core::auth::Authenticator;
use kvconf_core::store::{
    s3::{S3Config, S3Store},
    Store,
};
use std::{env, path::PathBuf};

const DEFAULT_S3_REGION: &str = "us-east-1";
const S3_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const S3_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const S3_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const S3_REGION: &str = "AWS_REGION";
const S3_ENDPOINT: &str = "AWS_ENDPOINT_URL_S3";

pub fn parse_s3_config_from_env(bucket: String, prefix: String) -> Result<S3Config> {
    let region = env::var(S3_REGION).unwrap_or_else(|_| DEFAULT_S3_REGION.to_string());
    Ok(S3Config {
        key: env::var(S3_ACCESS_KEY_ID)
            .map_err(|_| anyhow::anyhow!("{} env var not supplied", S3_ACCESS_KEY_ID))?,
        endpoint: env::var(S3_ENDPOINT)
            .unwrap_or_else(|_| format!("https://s3.dualstack.{}.amazonaws.com", region)),
        secret: env::var(S3_SECRET_ACCESS_KEY)
            .map_err(|_| anyhow::anyhow!("{} env var not supplied", S3_SECRET_ACCESS_KEY))?,
        token: env::var(S3_SESSION_TOKEN).ok(),
        bucket,
        region,
        bucket_prefix: Some(prefix),
    })
}

/// Build a store from `s3://bucket/prefix` or a local directory path.
pub fn store_from_path(store_path: &str) -> Result<Box<dyn Store>> {
    if store_path.starts_with("s3://") {
        let url = url::Url::parse(store_path)?;
        let bucket = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid S3 URL"))?
            .to_owned();
        let prefix = url.path().trim_start_matches('/').to_owned();
        let config = parse_s3_config_from_env(bucket, prefix)?;
        Ok(Box::new(S3Store::new(config)?))
    } else {
        Ok(Box::new(FileSystemStore::new(PathBuf::from(store_path))?))
    }
}

/// An unset or empty token leaves writes unauthenticated.
pub fn authenticator_from_token(api_token: Option<&str>) -> Result<Option<Authenticator>> {
    match api_token.filter(|t| !t.is_empty()) {
        Some(api_token) => Ok(Some(Authenticator::new(api_token)?)),
        None => {
            tracing::warn!("No API token set. Only use this for local development!");
            Ok(None)
        }
    }
}
