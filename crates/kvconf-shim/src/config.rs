use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT_FALLBACK_CONFIG_PATH: &str = "/conf.yml";
const DEFAULT_CONFIG_FILENAME: &str = "conf.yml";
const DEFAULT_CACHE_DURATION_MS: u64 = 60_000;

/// Static shim settings, fixed when the shim is installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShimConfig {
    /// Base URL of the config service, e.g. `https://config.example.workers.dev`.
    pub service_url: Url,
    /// Sent as `X-API-Token` on writes when set.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Static file to fall back to when the service has no config or is unreachable.
    #[serde(default = "default_fallback_config_path")]
    pub fallback_config_path: String,
    /// File name that marks a request as a config request.
    #[serde(default = "default_config_filename")]
    pub config_filename: String,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_duration_ms")]
    pub cache_duration_ms: u64,
    #[serde(default)]
    pub debug: bool,
}

fn default_fallback_config_path() -> String {
    DEFAULT_FALLBACK_CONFIG_PATH.to_string()
}

fn default_config_filename() -> String {
    DEFAULT_CONFIG_FILENAME.to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_duration_ms() -> u64 {
    DEFAULT_CACHE_DURATION_MS
}

impl ShimConfig {
    pub fn new(service_url: Url) -> Self {
        Self {
            service_url,
            api_token: None,
            fallback_config_path: default_fallback_config_path(),
            config_filename: default_config_filename(),
            cache_enabled: default_cache_enabled(),
            cache_duration_ms: default_cache_duration_ms(),
            debug: false,
        }
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms)
    }

    /// The configured token, treating an empty string as unset.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Service URL for `path`, appended to the base URL as-is so path prefixes survive.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.service_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
