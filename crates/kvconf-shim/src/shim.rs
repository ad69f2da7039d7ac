use crate::{
    cache::ConfigCache,
    config::ShimConfig,
    error::ShimError,
    fetch::InterceptingFetch,
    matcher::ConfigPathMatcher,
    transport::{Fetch, FetchRequest, FetchResponse, BYPASS_HEADER},
    xhr::XmlHttpRequest,
};
use http::{
    header::{HeaderName, ACCEPT, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use kvconf_core::api_types::{
    ConfigMetaResponse, ErrorResponse, SaveConfigResponse, API_TOKEN_HEADER, YAML_CONTENT_TYPE,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, warn};

const CONFIG_ENDPOINT: &str = "/api/config";
const RESET_ENDPOINT: &str = "/api/config/reset";
const META_ENDPOINT: &str = "/api/config/meta";

/// Informational events, only emitted while debug logging is on.
macro_rules! debug_info {
    ($shim:expr, $($arg:tt)+) => {
        if $shim.debug_enabled() {
            tracing::info!($($arg)+);
        }
    };
}

/// What an intercepting client should do with a request.
pub(crate) enum Route {
    /// Hand the request, untouched, to the original transport.
    Passthrough(FetchRequest),
    Read,
    Write(String),
}

/// Shared detection-and-redirect policy behind both client conventions.
pub struct ConfigShim {
    config: ShimConfig,
    transport: Arc<dyn Fetch>,
    matcher: ConfigPathMatcher,
    cache: ConfigCache,
    debug: AtomicBool,
}

impl ConfigShim {
    /// Capture the original transport. Call once at startup, before the application
    /// issues any request, and hand out clients from the returned shim.
    pub fn new(config: ShimConfig, transport: Arc<dyn Fetch>) -> Arc<Self> {
        let shim = Arc::new(Self {
            matcher: ConfigPathMatcher::new(&config.config_filename),
            cache: ConfigCache::new(config.cache_enabled, config.cache_duration()),
            debug: AtomicBool::new(config.debug),
            transport,
            config,
        });

        debug_info!(
            shim,
            message = "Config shim installed",
            event = "shim_installed",
            service_url = %shim.config.service_url,
            api_token_configured = shim.config.api_token().is_some()
        );
        shim
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// The transport captured at installation.
    pub fn transport(&self) -> &Arc<dyn Fetch> {
        &self.transport
    }

    pub fn fetch_client(self: &Arc<Self>) -> InterceptingFetch {
        InterceptingFetch::new(self.clone())
    }

    pub fn xhr(self: &Arc<Self>) -> XmlHttpRequest {
        XmlHttpRequest::new(self.clone())
    }

    pub fn intercepts(&self, request: &FetchRequest) -> bool {
        !request.is_bypassed() && self.matcher.matches(&request.url)
    }

    pub(crate) fn route(&self, request: FetchRequest) -> Route {
        if !self.intercepts(&request) {
            return Route::Passthrough(request);
        }

        let method = request.method.clone().unwrap_or(Method::GET);
        debug_info!(
            self,
            message = "Intercepted config request",
            event = "config_request_intercepted",
            url = %request.url,
            method = %method
        );

        if method == Method::GET {
            Route::Read
        } else if method == Method::POST || method == Method::PUT {
            let body = request
                .body
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default()
                .into_owned();
            Route::Write(body)
        } else {
            Route::Passthrough(request)
        }
    }

    /// Read the config: fresh cache, then the service, then the static fallback file.
    pub async fn get_config(&self) -> Result<String, ShimError> {
        if let Some((config, age)) = self.cache.fresh().await {
            debug_info!(
                self,
                message = "Serving cached config",
                event = "config_cache_hit",
                age_ms = age.as_millis() as u64
            );
            return Ok(config);
        }

        let request = FetchRequest::get(self.config.endpoint(CONFIG_ENDPOINT))
            .with_header(ACCEPT, HeaderValue::from_static(YAML_CONTENT_TYPE));

        match self.transport.fetch(request).await {
            Ok(response) if response.ok() => match response.text() {
                Ok(config) => {
                    debug_info!(
                        self,
                        message = "Fetched config from service",
                        event = "config_fetched",
                        size = config.len()
                    );
                    self.cache.store(config.clone()).await;
                    return Ok(config);
                }
                Err(e) => error!(
                    message = "Service returned an unreadable config",
                    event = "config_fetch_failed",
                    error = %e
                ),
            },
            Ok(response) if response.status == StatusCode::NOT_FOUND => warn!(
                message = "No config stored in the service, using the default config",
                event = "config_not_found"
            ),
            Ok(response) => error!(
                message = "Fetching config from service failed",
                event = "config_fetch_failed",
                status = %response.status
            ),
            Err(e) => error!(
                message = "Fetching config from service failed",
                event = "config_fetch_failed",
                error = %e
            ),
        }

        self.load_fallback().await
    }

    /// The static config file, fetched with the bypass flag so it is not intercepted again.
    async fn load_fallback(&self) -> Result<String, ShimError> {
        debug_info!(
            self,
            message = "Loading fallback config",
            event = "fallback_config_loading",
            path = %self.config.fallback_config_path
        );

        let request = FetchRequest::get(self.config.fallback_config_path.clone()).with_header(
            HeaderName::from_static(BYPASS_HEADER),
            HeaderValue::from_static("true"),
        );

        let result = match self.transport.fetch(request).await {
            Ok(response) if response.ok() => {
                response.text().map_err(|e| ShimError::Fallback(e.to_string()))
            }
            Ok(response) => Err(ShimError::Fallback(format!("HTTP {}", response.status))),
            Err(e) => Err(ShimError::Fallback(e.to_string())),
        };

        if let Err(e) = &result {
            error!(
                message = "Loading fallback config failed",
                event = "fallback_config_failed",
                error = %e
            );
        }
        result
    }

    fn with_token(&self, request: FetchRequest) -> Result<FetchRequest, ShimError> {
        match self.config.api_token() {
            Some(token) => {
                let value = HeaderValue::from_str(token)
                    .map_err(|_| ShimError::InvalidHeader(API_TOKEN_HEADER))?;
                Ok(request.with_header(HeaderName::from_static(API_TOKEN_HEADER), value))
            }
            None => Ok(request),
        }
    }

    /// Save the config and, on success, cache it as the current document.
    pub async fn save_config(&self, config: &str) -> Result<SaveConfigResponse, ShimError> {
        debug_info!(
            self,
            message = "Saving config to service",
            event = "config_saving",
            size = config.len()
        );

        let result = self.save_config_inner(config).await;
        match &result {
            Ok(response) => {
                debug_info!(
                    self,
                    message = "Config saved",
                    event = "config_saved",
                    size = response.metadata.size,
                    last_modified = %response.metadata.last_modified
                );
                self.cache.store(config.to_string()).await;
            }
            Err(e) => error!(
                message = "Saving config to service failed",
                event = "config_save_failed",
                error = %e
            ),
        }
        result
    }

    async fn save_config_inner(&self, config: &str) -> Result<SaveConfigResponse, ShimError> {
        let request = FetchRequest::new(Method::POST, self.config.endpoint(CONFIG_ENDPOINT))
            .with_header(CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE))
            .with_body(config.to_string());
        let response = self.transport.fetch(self.with_token(request)?).await?;

        if response.ok() {
            response.json()
        } else {
            Err(service_error(&response))
        }
    }

    /// Delete the stored config and drop the cached copy once the service confirms.
    pub async fn reset_config(&self) -> Result<(), ShimError> {
        let request = FetchRequest::new(Method::POST, self.config.endpoint(RESET_ENDPOINT));
        let result = match self.transport.fetch(self.with_token(request)?).await {
            Ok(response) if response.ok() => Ok(()),
            Ok(response) => Err(service_error(&response)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {
                self.cache.invalidate().await;
                debug_info!(self, message = "Config reset", event = "config_reset");
            }
            Err(e) => error!(
                message = "Resetting config failed",
                event = "config_reset_failed",
                error = %e
            ),
        }
        result
    }

    /// Metadata of the stored config, or `None` if it could not be read.
    pub async fn get_meta(&self) -> Option<ConfigMetaResponse> {
        let request = FetchRequest::get(self.config.endpoint(META_ENDPOINT));
        let result = match self.transport.fetch(request).await {
            Ok(response) if response.ok() => response.json(),
            Ok(response) => Err(service_error(&response)),
            Err(e) => Err(e),
        };

        result
            .map_err(|e| {
                error!(
                    message = "Fetching config metadata failed",
                    event = "config_meta_failed",
                    error = %e
                )
            })
            .ok()
    }

    pub async fn clear_cache(&self) {
        self.cache.invalidate().await;
        debug_info!(self, message = "Config cache cleared", event = "config_cache_cleared");
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Warm the cache. Failures are only logged; the config is fetched again on demand.
    pub async fn preload(&self) {
        if !self.config.cache_enabled {
            return;
        }
        if self.get_config().await.is_err() {
            warn!(
                message = "Preloading config failed, it will be fetched on demand",
                event = "config_preload_failed"
            );
        }
    }
}

fn service_error(response: &FetchResponse) -> ShimError {
    if response.status == StatusCode::UNAUTHORIZED {
        return ShimError::Unauthorized;
    }
    let message = response
        .json::<ErrorResponse>()
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("HTTP {}", response.status.as_u16()));
    ShimError::Status {
        status: response.status.as_u16(),
        message,
    }
}
