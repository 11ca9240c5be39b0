use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;

/// Status and raw body of an upstream response that was not a success.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDetail {
    pub status: u16,
    pub body: String,
}

impl ResponseDetail {
    /// The body parsed as JSON, when it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// No response reached the client (connection refused, unreachable, timeout).
    Transport(String),
    /// Upstream answered 401. The session has already been cleared and the
    /// UI should navigate to `redirect_to`.
    Unauthorized {
        detail: ResponseDetail,
        redirect_to: String,
    },
    /// Upstream answered 403.
    Forbidden(ResponseDetail),
    /// Any other non-success upstream response.
    Api(ResponseDetail),
    /// The request could not be built.
    InvalidRequest(String),
    /// A response arrived but its body could not be read or decoded.
    InvalidResponse(String),
    /// The persistent session store failed.
    Storage(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// The innermost error, skipping context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.root(), AppError::Transport(_))
    }

    /// Unauthorized and forbidden responses end route fallback chains.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.root(),
            AppError::Unauthorized { .. } | AppError::Forbidden(_)
        )
    }

    /// Original upstream response detail, when one was received.
    pub fn response_detail(&self) -> Option<&ResponseDetail> {
        match self.root() {
            AppError::Unauthorized { detail: d, .. }
            | AppError::Forbidden(d)
            | AppError::Api(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Transport(msg) => write!(f, "Transport failure: {}", msg),
            AppError::Unauthorized { detail: d, .. } => {
                write!(f, "Unauthorized ({}): {}", d.status, d.body)
            }
            AppError::Forbidden(d) => write!(f, "Forbidden ({}): {}", d.status, d.body),
            AppError::Api(d) => write!(f, "Upstream returned {}: {}", d.status, d.body),
            AppError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AppError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            AppError::Storage(msg) => write!(f, "Session store error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response for the local facade.
    ///
    /// Upstream application failures keep their status and body so the UI sees
    /// the original detail. Transport failures become 502.
    fn into_response(self) -> Response {
        match &self {
            AppError::Unauthorized {
                detail,
                redirect_to,
            } => {
                tracing::warn!("Unauthorized upstream response: {}", detail.body);
                let body = Json(json!({
                    "error": "Unauthorized",
                    "redirect_to": redirect_to,
                    "detail": detail.json().unwrap_or_else(|| json!(detail.body)),
                }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            }
            AppError::Forbidden(detail) => {
                let body = Json(json!({
                    "error": "You do not have permission to perform this action",
                    "detail": detail.json().unwrap_or_else(|| json!(detail.body)),
                }));
                (StatusCode::FORBIDDEN, body).into_response()
            }
            AppError::Api(detail) => {
                let status =
                    StatusCode::from_u16(detail.status).unwrap_or(StatusCode::BAD_GATEWAY);
                let body = Json(
                    detail
                        .json()
                        .unwrap_or_else(|| json!({ "error": detail.body })),
                );
                (status, body).into_response()
            }
            AppError::Transport(msg) => {
                tracing::error!("Transport failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Backend unreachable" })),
                )
                    .into_response()
            }
            AppError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": msg.clone() })),
            )
                .into_response(),
            AppError::InvalidResponse(msg) => {
                tracing::error!("Invalid upstream response: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": "Invalid response from backend" })),
                )
                    .into_response()
            }
            AppError::Storage(msg) => {
                tracing::error!("Session store error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                source.as_ref().clone().into_response()
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    /// Errors without a response are transport failures; the gateway
    /// refines this classification before deciding on failover.
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            AppError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            AppError::InvalidRequest(err.to_string())
        } else {
            AppError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidResponse(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for std::io::Error raised by the file-backed store
impl<T> ResultExt<T> for Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::Storage(e.to_string())),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::Storage(e.to_string())),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_classification() {
        let err: Result<(), AppError> = Err(AppError::Transport("connection refused".into()));
        let err = err.context("Listing leads").unwrap_err();
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "Listing leads: Transport failure: connection refused"
        );
    }

    #[test]
    fn test_response_detail_survives_context() {
        let detail = ResponseDetail {
            status: 422,
            body: r#"{"message":"phone is required"}"#.to_string(),
        };
        let err: Result<(), AppError> = Err(AppError::Api(detail.clone()));
        let err = err.with_context(|| "Creating lead".to_string()).unwrap_err();
        assert_eq!(err.response_detail(), Some(&detail));
        assert_eq!(
            err.response_detail().and_then(|d| d.json()).unwrap()["message"],
            "phone is required"
        );
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_forbidden_into_response_status() {
        let resp = AppError::Forbidden(ResponseDetail {
            status: 403,
            body: "nope".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unauthorized_response_carries_sign_in_route() {
        let resp = AppError::Unauthorized {
            detail: ResponseDetail {
                status: 401,
                body: r#"{"message":"token expired"}"#.into(),
            },
            redirect_to: "/signin".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["redirect_to"], "/signin");
        assert_eq!(body["detail"]["message"], "token expired");
    }

    #[test]
    fn test_api_error_keeps_upstream_status() {
        let resp = AppError::Api(ResponseDetail {
            status: 404,
            body: "{}".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
