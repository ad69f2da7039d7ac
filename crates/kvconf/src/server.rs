use anyhow::{anyhow, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::typed_header::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use kvconf_core::{
    api_types::{
        extract_config_payload, ConfigMetaResponse, ErrorResponse, HealthResponse,
        NotFoundResponse, ResetConfigResponse, SaveConfigResponse, API_TOKEN_HEADER,
        AVAILABLE_ENDPOINTS, YAML_CONTENT_TYPE,
    },
    auth::{presented_token, Authenticator},
    config_doc::ConfigDocument,
    cors::{CorsPolicy, ALLOW_HEADERS, ALLOW_METHODS, PREFLIGHT_MAX_AGE_SECONDS},
    current_timestamp,
    store::Store,
};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type BearerHeader = TypedHeader<Authorization<Bearer>>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: &'static str,
    source: anyhow::Error,
}

impl AppError {
    pub fn new<E: Into<anyhow::Error>>(status: StatusCode, error: &'static str, source: E) -> Self {
        Self {
            status,
            error,
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = format!("{}", self.source);

        if self.status.is_server_error() {
            error!(
                message = %message,
                event = "app_error",
                status_code = %self.status,
                error = self.error,
                error_debug = ?self.source,
            );
        } else {
            warn!(
                message = %message,
                event = "app_error",
                status_code = %self.status,
                error = self.error,
            );
        }

        let body = ErrorResponse {
            error: self.error.to_string(),
            message: Some(message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl<E> From<(StatusCode, &'static str, E)> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from((status, error, source): (StatusCode, &'static str, E)) -> Self {
        Self::new(status, error, source)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Status code: {} {}: {}", self.status, self.error, self.source)
    }
}

pub struct Server {
    document: Option<ConfigDocument>,
    authenticator: Option<Authenticator>,
    cors: CorsPolicy,
    cancellation_token: CancellationToken,
}

impl Server {
    pub fn new(
        store: Option<Box<dyn Store>>,
        authenticator: Option<Authenticator>,
        cors: CorsPolicy,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            document: store.map(|store| ConfigDocument::new(Arc::from(store))),
            authenticator,
            cors,
            cancellation_token,
        }
    }

    fn document(&self, error: &'static str) -> Result<&ConfigDocument, AppError> {
        self.document.as_ref().ok_or_else(|| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                error,
                anyhow!("No store configured"),
            )
        })
    }

    /// Without an authenticator every write is accepted.
    pub fn check_auth(
        &self,
        headers: &HeaderMap,
        bearer: Option<BearerHeader>,
    ) -> Result<(), AppError> {
        let Some(auth) = &self.authenticator else {
            return Ok(());
        };
        let api_token = headers
            .get(API_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        let bearer = bearer
            .as_ref()
            .map(|TypedHeader(Authorization(bearer))| bearer.token());

        auth.verify_token(presented_token(api_token, bearer))
            .map_err(|e| AppError::new(StatusCode::UNAUTHORIZED, "Unauthorized", e))
    }

    /// One structured event per request, levelled by status class.
    pub async fn logging_middleware(req: Request, next: Next) -> Response {
        let start = Instant::now();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let request_bytes = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.parse::<u64>().ok())
            .unwrap_or(0);

        let response = next.run(req).await;
        let status = response.status();
        let duration_ms = start.elapsed().as_millis();

        if status.is_server_error() {
            error!(
                message = format!("Request failed with server error: {} {} - {}ms", method, uri, duration_ms),
                event = "request_failed",
                method = %method,
                uri = %uri,
                status = %status,
                duration_ms = %duration_ms,
                error_type = "server_error",
                remote_addr = %remote_addr,
                user_agent = %user_agent,
                request_bytes,
            );
        } else if status.is_client_error() {
            warn!(
                message = format!("Request failed with client error: {} {} - {}ms", method, uri, duration_ms),
                event = "request_failed",
                method = %method,
                uri = %uri,
                status = %status,
                duration_ms = %duration_ms,
                error_type = "client_error",
                remote_addr = %remote_addr,
                user_agent = %user_agent,
                request_bytes,
            );
        } else {
            info!(
                message = format!("Request completed: {} {} - {}ms", method, uri, duration_ms),
                event = "request_completed",
                method = %method,
                uri = %uri,
                status = %status,
                duration_ms = %duration_ms,
                remote_addr = %remote_addr,
                user_agent = %user_agent,
                request_bytes,
            );
        }

        response
    }

    /// Answers preflights directly and stamps CORS headers on every other response,
    /// errors and 404s included.
    pub async fn cors_middleware(
        State(server_state): State<Arc<Server>>,
        req: Request,
        next: Next,
    ) -> Response {
        let allow_origin = {
            let origin = req
                .headers()
                .get(header::ORIGIN)
                .and_then(|value| value.to_str().ok());
            server_state.cors.allow_origin(origin).to_string()
        };

        if req.method() == Method::OPTIONS {
            let mut response = StatusCode::OK.into_response();
            apply_cors_headers(response.headers_mut(), &allow_origin);
            response.headers_mut().insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from(PREFLIGHT_MAX_AGE_SECONDS),
            );
            return response;
        }

        let mut response = next.run(req).await;
        apply_cors_headers(response.headers_mut(), &allow_origin);
        response
    }

    pub fn routes(self: &Arc<Self>) -> Router {
        Router::new()
            // `get` would also answer HEAD; only the listed methods are served.
            .route(
                "/api/config",
                get(get_config)
                    .post(save_config)
                    .head(not_found)
                    .fallback(not_found),
            )
            .route("/api/config/reset", post(reset_config).fallback(not_found))
            .route(
                "/api/config/meta",
                get(get_config_meta).head(not_found).fallback(not_found),
            )
            .route("/api/health", get(health).head(not_found).fallback(not_found))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                self.clone(),
                Self::cors_middleware,
            ))
            .layer(middleware::from_fn(Self::logging_middleware))
            .with_state(self.clone())
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let token = self.cancellation_token.clone();
        let routes = Arc::new(self).routes();

        axum::serve(
            listener,
            routes.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

        Ok(())
    }
}

fn apply_cors_headers(headers: &mut HeaderMap, allow_origin: &str) {
    match HeaderValue::from_str(allow_origin) {
        Ok(value) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        Err(e) => {
            error!(
                message = "Allowed origin is not a valid header value",
                event = "cors_bad_origin",
                origin = %allow_origin,
                error = %e
            );
        }
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

async fn get_config(State(server_state): State<Arc<Server>>) -> Result<Response, AppError> {
    const FAILED: &str = "Failed to get config";
    let document = server_state.document(FAILED)?;

    let config = document
        .load()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, FAILED, e))?;

    let Some(config) = config else {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            "Config not found",
            anyhow!("No config has been saved yet. Save one first or use the default config."),
        ));
    };

    Ok((
        [
            (header::CONTENT_TYPE, YAML_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, "inline; filename=\"conf.yml\""),
        ],
        config,
    )
        .into_response())
}

async fn save_config(
    State(server_state): State<Arc<Server>>,
    headers: HeaderMap,
    bearer: Option<BearerHeader>,
    body: Bytes,
) -> Result<Json<SaveConfigResponse>, AppError> {
    const FAILED: &str = "Failed to save config";
    server_state.check_auth(&headers, bearer)?;
    let document = server_state.document(FAILED)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let config = extract_config_payload(content_type, &body)
        .map_err(|e| (StatusCode::BAD_REQUEST, "Invalid config data", e))?;

    let metadata = document
        .save(&config)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, FAILED, e))?;

    info!(
        message = "Config saved",
        event = "config_saved",
        size = metadata.size,
        last_modified = %metadata.last_modified
    );

    Ok(Json(SaveConfigResponse {
        success: true,
        message: "Config saved".to_string(),
        metadata,
    }))
}

async fn reset_config(
    State(server_state): State<Arc<Server>>,
    headers: HeaderMap,
    bearer: Option<BearerHeader>,
) -> Result<Json<ResetConfigResponse>, AppError> {
    const FAILED: &str = "Failed to reset config";
    server_state.check_auth(&headers, bearer)?;
    let document = server_state.document(FAILED)?;

    document
        .reset()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, FAILED, e))?;

    info!(message = "Config reset", event = "config_reset");

    Ok(Json(ResetConfigResponse {
        success: true,
        message: "Config reset. The default config will be used on next load.".to_string(),
    }))
}

async fn get_config_meta(
    State(server_state): State<Arc<Server>>,
) -> Result<Json<ConfigMetaResponse>, AppError> {
    const FAILED: &str = "Failed to get config metadata";
    let document = server_state.document(FAILED)?;

    let metadata = document
        .metadata()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, FAILED, e))?;

    if let Some(metadata) = metadata {
        return Ok(Json(ConfigMetaResponse {
            exists: true,
            metadata: Some(metadata),
            message: None,
        }));
    }

    // No sidecar: the document may still have been written without one.
    let exists = document
        .exists()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, FAILED, e))?;
    Ok(Json(ConfigMetaResponse {
        exists,
        metadata: None,
        message: Some(if exists {
            "Config metadata is not available".to_string()
        } else {
            "Config does not exist".to_string()
        }),
    }))
}

/// Always 200 while we are listening.
async fn health(State(server_state): State<Arc<Server>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: current_timestamp(),
        store_available: server_state.document.is_some(),
    })
}

async fn not_found() -> (StatusCode, Json<NotFoundResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not Found".to_string(),
            available_endpoints: AVAILABLE_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
        }),
    )
}
