use crate::{
    error::ShimError,
    shim::{ConfigShim, Route},
    transport::{Fetch, FetchRequest, FetchResponse},
};
use async_trait::async_trait;
use http::StatusCode;
use kvconf_core::api_types::YAML_CONTENT_TYPE;
use serde_json::json;
use std::sync::Arc;

/// Promise-style client. Config reads resolve with the config text, config writes
/// resolve with a JSON status body, and every other request goes to the original
/// transport.
#[derive(Clone)]
pub struct InterceptingFetch {
    shim: Arc<ConfigShim>,
}

impl InterceptingFetch {
    pub(crate) fn new(shim: Arc<ConfigShim>) -> Self {
        Self { shim }
    }
}

#[async_trait]
impl Fetch for InterceptingFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ShimError> {
        match self.shim.route(request) {
            Route::Passthrough(request) => self.shim.transport().fetch(request).await,
            Route::Read => {
                let config = self.shim.get_config().await?;
                Ok(FetchResponse::synthesized(
                    StatusCode::OK,
                    YAML_CONTENT_TYPE,
                    config,
                ))
            }
            Route::Write(body) => {
                let (status, body) = match self.shim.save_config(&body).await {
                    Ok(saved) => (StatusCode::OK, serde_json::to_vec(&saved)),
                    Err(e) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        serde_json::to_vec(&json!({ "error": e.to_string() })),
                    ),
                };
                let body = body.map_err(|e| ShimError::Decode(e.to_string()))?;
                Ok(FetchResponse::synthesized(status, "application/json", body))
            }
        }
    }
}
