use crate::error::ShimError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{
    header::{HeaderName, CONTENT_TYPE},
    HeaderMap, HeaderValue, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use url::Url;

/// Requests carrying this header are never intercepted.
pub const BYPASS_HEADER: &str = "x-bypass-adapter";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    /// `None` behaves like GET.
    pub method: Option<Method>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Some(method),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_bypassed(&self) -> bool {
        self.headers
            .get(BYPASS_HEADER)
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// A response built locally, shaped like one received from the network.
    pub fn synthesized(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> Result<String, ShimError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| ShimError::Decode(e.to_string()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ShimError> {
        serde_json::from_slice(&self.body).map_err(|e| ShimError::Decode(e.to_string()))
    }
}

/// The platform HTTP client the shim wraps.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ShimError>;
}

/// Native transport. Relative URLs are resolved against `base_url`, the way a browser
/// resolves them against the page.
#[derive(Clone, Default)]
pub struct ReqwestFetch {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl ReqwestFetch {
    pub fn new(base_url: Option<Url>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn resolve(&self, url: &str) -> Result<Url, ShimError> {
        let resolved = match (Url::parse(url), &self.base_url) {
            (Ok(url), _) => Ok(url),
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => base.join(url),
            (Err(e), _) => Err(e),
        };
        resolved.map_err(|e| ShimError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ShimError> {
        let url = self.resolve(&request.url)?;
        let mut builder = self
            .client
            .request(request.method.unwrap_or(Method::GET), url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ShimError::Transport(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ShimError::Transport(e.to_string()))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
