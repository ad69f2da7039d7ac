use crate::{
    config::ShimConfig,
    error::ShimError,
    shim::ConfigShim,
    transport::{Fetch, FetchRequest, FetchResponse},
};
use async_trait::async_trait;
use http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode};
use kvconf_core::api_types::{
    extract_config_payload, ConfigMetaResponse, ConfigMetadata, ErrorResponse,
    ResetConfigResponse, SaveConfigResponse, API_TOKEN_HEADER, YAML_CONTENT_TYPE,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use url::Url;

#[derive(Default)]
struct MockState {
    config: Option<String>,
    token: Option<String>,
    fail_service: bool,
    fail_fallback: bool,
    requests: Vec<FetchRequest>,
}

/// In-process stand-in for both the config service and the static file host.
#[derive(Clone, Default)]
pub(crate) struct MockService {
    state: Arc<Mutex<MockState>>,
}

fn path_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(url) => url.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or_default().to_string(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> FetchResponse {
    FetchResponse::synthesized(
        status,
        "application/json",
        serde_json::to_vec(body).unwrap(),
    )
}

fn error_response(status: StatusCode, error: &str, message: String) -> FetchResponse {
    json_response(
        status,
        &ErrorResponse {
            error: error.to_string(),
            message: Some(message),
        },
    )
}

impl MockService {
    pub const FALLBACK: &'static str = "pageInfo:\n  title: Default\n";

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_config(config: &str) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().config = Some(config.to_string());
        service
    }

    pub fn require_token(&self, token: &str) {
        self.state.lock().unwrap().token = Some(token.to_string());
    }

    pub fn fail_service(&self, fail: bool) {
        self.state.lock().unwrap().fail_service = fail;
    }

    pub fn fail_fallback(&self, fail: bool) {
        self.state.lock().unwrap().fail_fallback = fail;
    }

    pub fn stored(&self) -> Option<String> {
        self.state.lock().unwrap().config.clone()
    }

    /// Number of GET (or method-less) requests made to `path`.
    pub fn gets(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method.as_ref().map_or(true, |m| *m == Method::GET))
            .filter(|r| path_of(&r.url) == path)
            .count()
    }

    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn last_request_to(&self, path: &str) -> Option<FetchRequest> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .rev()
            .find(|r| path_of(&r.url) == path)
            .cloned()
    }
}

#[async_trait]
impl Fetch for MockService {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ShimError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let path = path_of(&request.url);
        let method = request.method.clone().unwrap_or(Method::GET);

        if path == "/conf.yml" {
            return Ok(if state.fail_fallback {
                FetchResponse::synthesized(StatusCode::NOT_FOUND, "text/plain", "missing")
            } else {
                FetchResponse::synthesized(StatusCode::OK, YAML_CONTENT_TYPE, Self::FALLBACK)
            });
        }

        if path == "/items.json" {
            let mut response =
                FetchResponse::synthesized(StatusCode::OK, "application/json", "[1,2,3]");
            response
                .headers
                .insert("x-served-by", HeaderValue::from_static("native"));
            return Ok(response);
        }

        if state.fail_service {
            return Err(ShimError::Transport("connection refused".to_string()));
        }

        let authorized = match &state.token {
            Some(token) => request
                .headers
                .get(API_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                == Some(token.as_str()),
            None => true,
        };

        if path == "/api/config" && method == Method::GET {
            return Ok(match &state.config {
                Some(config) => {
                    FetchResponse::synthesized(StatusCode::OK, YAML_CONTENT_TYPE, config.clone())
                }
                None => error_response(
                    StatusCode::NOT_FOUND,
                    "Config not found",
                    "No config has been saved yet.".to_string(),
                ),
            });
        }

        if path == "/api/config" && method == Method::POST {
            if !authorized {
                return Ok(error_response(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized",
                    "The API token is not valid".to_string(),
                ));
            }
            let content_type = request
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let body = request.body.clone().unwrap_or_default();
            return Ok(match extract_config_payload(content_type, &body) {
                Ok(config) => {
                    let metadata = ConfigMetadata {
                        last_modified: "2024-01-01T00:00:00Z".to_string(),
                        size: config.len() as u64,
                    };
                    state.config = Some(config);
                    json_response(
                        StatusCode::OK,
                        &SaveConfigResponse {
                            success: true,
                            message: "Config saved".to_string(),
                            metadata,
                        },
                    )
                }
                Err(e) => error_response(StatusCode::BAD_REQUEST, "Invalid config data", e.to_string()),
            });
        }

        if path == "/api/config/reset" && method == Method::POST {
            if !authorized {
                return Ok(error_response(
                    StatusCode::UNAUTHORIZED,
                    "Unauthorized",
                    "The API token is not valid".to_string(),
                ));
            }
            state.config = None;
            return Ok(json_response(
                StatusCode::OK,
                &ResetConfigResponse {
                    success: true,
                    message: "Config reset".to_string(),
                },
            ));
        }

        if path == "/api/config/meta" && method == Method::GET {
            let metadata = state.config.as_ref().map(|config| ConfigMetadata {
                last_modified: "2024-01-01T00:00:00Z".to_string(),
                size: config.len() as u64,
            });
            return Ok(json_response(
                StatusCode::OK,
                &ConfigMetaResponse {
                    exists: metadata.is_some(),
                    metadata,
                    message: None,
                },
            ));
        }

        Ok(error_response(
            StatusCode::NOT_FOUND,
            "Not Found",
            format!("{} {}", method, path),
        ))
    }
}

pub(crate) fn shim_with(
    service: &MockService,
    configure: impl FnOnce(&mut ShimConfig),
) -> Arc<ConfigShim> {
    let mut config = ShimConfig::new(Url::parse("http://service.test").unwrap());
    configure(&mut config);
    ConfigShim::new(config, Arc::new(service.clone()))
}
