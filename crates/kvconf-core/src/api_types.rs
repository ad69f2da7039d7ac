use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";
pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Snapshot taken when the config was written. Never re-validated against the stored text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConfigMetadata {
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    pub size: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SaveConfigResponse {
    pub success: bool,
    pub message: String,
    pub metadata: ConfigMetadata,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResetConfigResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ConfigMetaResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConfigMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(rename = "storeAvailable")]
    pub store_available: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NotFoundResponse {
    pub error: String,
    #[serde(rename = "availableEndpoints")]
    pub available_endpoints: Vec<String>,
}

pub const AVAILABLE_ENDPOINTS: &[&str] = &[
    "GET  /api/config - fetch the stored config",
    "POST /api/config - save the config (requires API token)",
    "POST /api/config/reset - delete the stored config (requires API token)",
    "GET  /api/config/meta - fetch config metadata",
    "GET  /api/health - health check",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Config must be valid UTF-8 text")]
    InvalidUtf8,
    #[error("Config data must not be empty")]
    Empty,
}

/// Extract the config document from a save request body.
///
/// JSON bodies (by content type) yield their `config` field, then their `data` field,
/// and otherwise the whole value re-serialized. Anything else is taken as raw text.
/// Empty or whitespace-only documents are rejected.
pub fn extract_config_payload(content_type: Option<&str>, body: &[u8]) -> Result<String, PayloadError> {
    let is_json = content_type
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    let text = if is_json {
        let json: Value =
            serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;
        non_empty_str(&json, "config")
            .or_else(|| non_empty_str(&json, "data"))
            .map(str::to_string)
            .unwrap_or_else(|| json.to_string())
    } else {
        String::from_utf8(body.to_vec()).map_err(|_| PayloadError::InvalidUtf8)?
    };

    if text.trim().is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(text)
}

fn non_empty_str<'a>(json: &'a Value, field: &str) -> Option<&'a str> {
    json.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}
