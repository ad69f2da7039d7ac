use crate::{
    error::ShimError,
    shim::{ConfigShim, Route},
    transport::{FetchRequest, FetchResponse},
};
use bytes::Bytes;
use http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode};
use kvconf_core::api_types::YAML_CONTENT_TYPE;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

/// State visible to callbacks when an event fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XhrSnapshot {
    pub ready_state: ReadyState,
    pub status: u16,
    pub response_text: String,
}

type EventHandler = Arc<dyn Fn(&XhrSnapshot) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&ShimError) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    ready_state_change: Option<EventHandler>,
    load: Option<EventHandler>,
    error: Option<ErrorHandler>,
}

struct XhrState {
    ready_state: ReadyState,
    status: u16,
    response_text: String,
    response_headers: HeaderMap,
}

impl XhrState {
    fn snapshot(&self) -> XhrSnapshot {
        XhrSnapshot {
            ready_state: self.ready_state,
            status: self.status,
            response_text: self.response_text.clone(),
        }
    }
}

/// Event-style client. Config reads and writes complete by populating the response
/// fields and firing `readystatechange` then `load`; a failed write fires `error`.
/// Everything else is sent through the original transport.
pub struct XmlHttpRequest {
    shim: Arc<ConfigShim>,
    request: Option<FetchRequest>,
    state: Arc<Mutex<XhrState>>,
    handlers: Handlers,
}

fn lock(state: &Mutex<XhrState>) -> MutexGuard<'_, XhrState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl XmlHttpRequest {
    pub(crate) fn new(shim: Arc<ConfigShim>) -> Self {
        Self {
            shim,
            request: None,
            state: Arc::new(Mutex::new(XhrState {
                ready_state: ReadyState::Unsent,
                status: 0,
                response_text: String::new(),
                response_headers: HeaderMap::new(),
            })),
            handlers: Handlers::default(),
        }
    }

    /// Record the method and URL for the next `send`.
    pub fn open(&mut self, method: Method, url: impl Into<String>) {
        self.request = Some(FetchRequest::new(method, url));
        let mut state = lock(&self.state);
        state.ready_state = ReadyState::Opened;
        state.status = 0;
        state.response_text.clear();
        state.response_headers.clear();
    }

    pub fn set_request_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), ShimError> {
        let request = self.request.as_mut().ok_or(ShimError::NotOpened)?;
        request.headers.insert(name, value);
        Ok(())
    }

    pub fn on_ready_state_change(&mut self, handler: impl Fn(&XhrSnapshot) + Send + Sync + 'static) {
        self.handlers.ready_state_change = Some(Arc::new(handler));
    }

    pub fn on_load(&mut self, handler: impl Fn(&XhrSnapshot) + Send + Sync + 'static) {
        self.handlers.load = Some(Arc::new(handler));
    }

    pub fn on_error(&mut self, handler: impl Fn(&ShimError) + Send + Sync + 'static) {
        self.handlers.error = Some(Arc::new(handler));
    }

    /// Dispatch the opened request. Completion is reported through the callbacks; the
    /// returned handle resolves once they have run.
    pub fn send(&mut self, body: Option<Bytes>) -> Result<JoinHandle<()>, ShimError> {
        let mut request = self.request.take().ok_or(ShimError::NotOpened)?;
        request.body = body;

        let shim = self.shim.clone();
        let state = self.state.clone();
        let ready_state_change = self.handlers.ready_state_change.clone();
        let load = self.handlers.load.clone();
        let error = self.handlers.error.clone();

        Ok(tokio::spawn(async move {
            let result = match shim.route(request) {
                Route::Passthrough(request) => shim.transport().fetch(request).await,
                Route::Read => shim.get_config().await.map(|config| {
                    FetchResponse::synthesized(StatusCode::OK, YAML_CONTENT_TYPE, config)
                }),
                Route::Write(body) => shim.save_config(&body).await.and_then(|saved| {
                    let body = serde_json::to_vec(&saved)
                        .map_err(|e| ShimError::Decode(e.to_string()))?;
                    Ok(FetchResponse::synthesized(
                        StatusCode::OK,
                        "application/json",
                        body,
                    ))
                }),
            };

            match result {
                Ok(response) => {
                    let snapshot = {
                        let mut state = lock(&state);
                        state.ready_state = ReadyState::Done;
                        state.status = response.status.as_u16();
                        state.response_text = String::from_utf8_lossy(&response.body).into_owned();
                        state.response_headers = response.headers;
                        state.snapshot()
                    };
                    if let Some(handler) = ready_state_change {
                        handler(&snapshot);
                    }
                    if let Some(handler) = load {
                        handler(&snapshot);
                    }
                }
                Err(e) => {
                    {
                        let mut state = lock(&state);
                        state.ready_state = ReadyState::Done;
                        state.status = 0;
                    }
                    if let Some(handler) = error {
                        handler(&e);
                    }
                }
            }
        }))
    }

    pub fn ready_state(&self) -> ReadyState {
        lock(&self.state).ready_state
    }

    pub fn status(&self) -> u16 {
        lock(&self.state).status
    }

    pub fn response_text(&self) -> String {
        lock(&self.state).response_text.clone()
    }

    /// The response body as text. Config reads carry the document here too.
    pub fn response(&self) -> String {
        self.response_text()
    }

    /// The response body parsed as JSON, when it is JSON.
    pub fn response_json(&self) -> Option<Value> {
        serde_json::from_str(&lock(&self.state).response_text).ok()
    }

    pub fn response_header(&self, name: &str) -> Option<String> {
        lock(&self.state)
            .response_headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}
