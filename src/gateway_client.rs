use crate::address::{self, Address};
use crate::config::Config;
use crate::errors::{AppError, ResponseDetail};
use crate::store::SessionStore;
use regex::Regex;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::error::Error as _;
use std::sync::{Arc, OnceLock, RwLock};
use tokio::sync::broadcast;

/// Body previews in diagnostics are cut at this many characters.
const DEBUG_BODY_PREVIEW: usize = 500;

/// Signals the gateway raises for UI collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// The backend rejected the credential; the session has been cleared and
    /// the UI should navigate to `redirect_to`.
    SessionInvalidated { redirect_to: String },
    /// The base address switched after a transport failure.
    Failover { from: String, to: String },
}

/// A file forwarded as a multipart part.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePart {
    /// Part under the conventional `file` field.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    File(FilePart),
}

/// Everything needed to replay a call exactly.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn json(body: Value) -> Self {
        Self {
            query: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn query(query: Vec<(String, String)>) -> Self {
        Self {
            query,
            body: RequestBody::Empty,
        }
    }
}

/// Which attempt a dispatch is. Only the first may fail over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Failover,
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl GatewayResponse {
    /// Body as JSON; an empty body is `null`.
    pub fn json(&self) -> Result<Value, AppError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| {
            AppError::InvalidResponse(format!("Failed to parse backend response: {}", e))
        })
    }
}

/// Single HTTP entry point to the backend.
///
/// Attaches the stored credential, classifies failures, fails over to an
/// alternate address once per call on transport failures, and clears the
/// session on 401.
pub struct Gateway {
    client: reqwest::Client,
    config: Config,
    address: RwLock<Address>,
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<GatewayEvent>,
}

impl Gateway {
    /// Creates a new `Gateway`, resolving its initial address from the store
    /// and configuration.
    pub fn new(config: Config, store: Arc<dyn SessionStore>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AppError::InvalidRequest(format!("Failed to create HTTP client: {}", e))
            })?;

        let initial = address::resolve_initial_address(store.as_ref(), &config);
        tracing::info!("Gateway initialized: {}", initial);

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            client,
            config,
            address: RwLock::new(initial),
            store,
            events,
        })
    }

    pub fn address(&self) -> Address {
        self.address
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    pub async fn get(&self, path: &str, query: Vec<(String, String)>) -> Result<Value, AppError> {
        self.request(Method::GET, path, RequestOptions::query(query))
            .await?
            .json()
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, AppError> {
        self.request(Method::POST, path, RequestOptions::json(body))
            .await?
            .json()
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, AppError> {
        self.request(Method::PUT, path, RequestOptions::json(body))
            .await?
            .json()
    }

    pub async fn delete(&self, path: &str) -> Result<Value, AppError> {
        self.request(Method::DELETE, path, RequestOptions::default())
            .await?
            .json()
    }

    /// Sends a request, failing over once on a transport failure.
    ///
    /// A replayed request is dispatched with [`Attempt::Failover`] and its
    /// outcome is returned as-is, so a second transport failure surfaces.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<GatewayResponse, AppError> {
        let base = self.address();
        match self
            .dispatch(&method, &base, path, &options, Attempt::First)
            .await
        {
            Err(err) if err.is_transport() => {
                let Some(next) = address::next_failover_target(&base, &self.config) else {
                    return Err(err);
                };
                tracing::warn!(
                    "Network error on {}. Retrying with alternate address: {}",
                    base,
                    next
                );
                self.switch_address(&base, &next);
                self.dispatch(&method, &next, path, &options, Attempt::Failover)
                    .await
            }
            other => other,
        }
    }

    /// Makes `next` the active address and persists its origin.
    fn switch_address(&self, from: &Address, next: &Address) {
        {
            let mut current = self.address.write().unwrap_or_else(|e| e.into_inner());
            if *current == *next {
                return;
            }
            *current = next.clone();
        }
        if let Err(e) = self.store.persist_base_override(next.origin()) {
            tracing::warn!("Failed to persist API address override: {}", e);
        }
        let _ = self.events.send(GatewayEvent::Failover {
            from: from.to_string(),
            to: next.to_string(),
        });
    }

    async fn dispatch(
        &self,
        method: &Method,
        base: &Address,
        path: &str,
        options: &RequestOptions,
        attempt: Attempt,
    ) -> Result<GatewayResponse, AppError> {
        let url = base.join(&self.config.page_origin, path);
        let token = self.store.token();
        let debug = self.debug_enabled();

        if debug {
            self.log_request(method, &url, options, token.is_some(), attempt);
        }

        let mut builder = self.client.request(method.clone(), &url);
        if let Some(ref token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        builder = match options.body {
            RequestBody::Empty => builder,
            RequestBody::Json(ref body) => builder.json(body),
            RequestBody::File(ref file) => builder.multipart(multipart_form(file)?),
        };

        let response = builder.send().await.map_err(classify_send_error)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if status.is_success() {
            let body = response.bytes().await.map_err(|e| {
                AppError::InvalidResponse(format!("Failed to read backend response: {}", e))
            })?;
            return Ok(GatewayResponse {
                status,
                content_type,
                body: body.to_vec(),
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if debug {
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                data = %preview(&body),
                "[HTTP Error]"
            );
        }
        let detail = ResponseDetail {
            status: status.as_u16(),
            body,
        };

        match status {
            StatusCode::UNAUTHORIZED => {
                self.invalidate_session();
                Err(AppError::Unauthorized {
                    detail,
                    redirect_to: self.config.sign_in_route.clone(),
                })
            }
            StatusCode::FORBIDDEN => {
                tracing::warn!(
                    "Forbidden (403): You do not have permission to perform this action. {} {}",
                    method,
                    path
                );
                Err(AppError::Forbidden(detail))
            }
            _ => Err(AppError::Api(detail)),
        }
    }

    /// Clears credential and profile and tells subscribers to go to sign-in.
    fn invalidate_session(&self) {
        tracing::warn!("Session rejected by backend, clearing stored credential");
        if let Err(e) = self.store.clear_session() {
            tracing::error!("Failed to clear session: {}", e);
        }
        let _ = self.events.send(GatewayEvent::SessionInvalidated {
            redirect_to: self.config.sign_in_route.clone(),
        });
    }

    fn debug_enabled(&self) -> bool {
        self.config.http_debug || self.store.http_debug()
    }

    fn log_request(
        &self,
        method: &Method,
        url: &str,
        options: &RequestOptions,
        has_token: bool,
        attempt: Attempt,
    ) {
        let data = match options.body {
            RequestBody::Empty => String::new(),
            RequestBody::Json(ref body) => preview(&body.to_string()),
            RequestBody::File(ref file) => {
                format!("<file {} ({} bytes)>", file.file_name, file.bytes.len())
            }
        };
        let headers = if has_token {
            "Authorization: Bearer ***redacted***"
        } else {
            ""
        };
        tracing::debug!(
            method = %method,
            url = %url,
            params = ?options.query,
            data = %data,
            headers = %headers,
            attempt = ?attempt,
            "[HTTP Request]"
        );
    }
}

fn multipart_form(file: &FilePart) -> Result<reqwest::multipart::Form, AppError> {
    let mut part = reqwest::multipart::Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone());
    if let Some(ref content_type) = file.content_type {
        part = part
            .mime_str(content_type)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid content type: {}", e)))?;
    }
    Ok(reqwest::multipart::Form::new().part(file.field.clone(), part))
}

fn network_error_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)connection refused|network error|err_connection_refused|error sending request|dns error|connection reset",
        )
        .expect("network error pattern is valid")
    })
}

/// Full message chain of an error, outermost first.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Whether a `send()` failure means no response reached us.
pub fn is_transport_failure(err: &reqwest::Error) -> bool {
    if err.status().is_some() {
        return false;
    }
    err.is_connect() || err.is_timeout() || network_error_pattern().is_match(&error_chain(err))
}

fn classify_send_error(err: reqwest::Error) -> AppError {
    if is_transport_failure(&err) {
        AppError::Transport(error_chain(&err))
    } else {
        AppError::InvalidRequest(error_chain(&err))
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() > DEBUG_BODY_PREVIEW {
        let cut: String = body.chars().take(DEBUG_BODY_PREVIEW).collect();
        format!("{}…", cut)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_gateway_creation() {
        let gateway = Gateway::new(Config::default(), Arc::new(MemoryStore::new()));
        assert!(gateway.is_ok());
        assert_eq!(gateway.unwrap().address(), Address::relative());
    }

    #[test]
    fn test_network_error_pattern() {
        assert!(network_error_pattern().is_match("ERR_CONNECTION_REFUSED"));
        assert!(network_error_pattern().is_match("Network Error"));
        assert!(network_error_pattern().is_match("tcp connect error: Connection refused (os error 111)"));
        assert!(!network_error_pattern().is_match("HTTP status client error (404 Not Found)"));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(600);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), DEBUG_BODY_PREVIEW + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_debug_flag_from_config_or_store() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(Config::default(), store.clone()).unwrap();
        assert!(!gateway.debug_enabled());

        store.set(crate::store::HTTP_DEBUG_KEY, "1").unwrap();
        assert!(gateway.debug_enabled());

        let config = Config {
            http_debug: true,
            ..Config::default()
        };
        let gateway = Gateway::new(config, Arc::new(MemoryStore::new())).unwrap();
        assert!(gateway.debug_enabled());
    }

    #[test]
    fn test_empty_body_is_null() {
        let response = GatewayResponse {
            status: StatusCode::NO_CONTENT,
            content_type: None,
            body: Vec::new(),
        };
        assert_eq!(response.json().unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_switch_address_persists_origin() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(Config::default(), store.clone()).unwrap();
        let mut events = gateway.subscribe();

        let next = Address::from_origin("http://localhost:44308");
        gateway.switch_address(&Address::relative(), &next);

        assert_eq!(gateway.address(), next);
        assert_eq!(
            store.base_override().as_deref(),
            Some("http://localhost:44308")
        );
        assert_eq!(
            events.recv().await.unwrap(),
            GatewayEvent::Failover {
                from: "/api".to_string(),
                to: "http://localhost:44308/api".to_string(),
            }
        );
    }
}
