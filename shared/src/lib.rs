// lib.rs - headless core for the admin console list screens

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod capabilities;
pub mod client;
pub mod config;
pub mod form;
pub mod list_state;
pub mod model;
pub mod mutation;
pub mod resources;
pub mod screen;

#[cfg(feature = "shell")]
pub mod shell;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub use capabilities::{
    CredentialProvider, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport,
    NoCredentials, RequestBody, SessionCredentials, StaticToken,
};
pub use client::ResourceClient;
pub use config::{ConfigError, ConsoleConfig};
pub use form::{DialogFormBinder, DialogMode, FormRules};
pub use list_state::{
    FilteredView, ListHandle, ListState, ListStatus, LoadOutcome, LoadTicket, PredicateField,
    QuerySpec, SearchField,
};
pub use model::{Draft, FilePart, MultipartForm, Resource, ResourceId, SessionId};
pub use mutation::{MutationCoordinator, MutationKind, MutationState, MutationTarget, PendingMutation};
pub use resources::ResourceKind;
pub use screen::{ResourceScreen, RowView, ScreenView, ToastKind, ToastMessage};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 1000;
pub const DEFAULT_ID_FIELD: &str = "id";
pub const FALLBACK_ID_FIELD: &str = "_id";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 512;

// ============================================================================
// Error taxonomy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No response received.
    Network,
    /// Non-2xx response, or a 2xx envelope flagging failure.
    Http,
    /// Body was not the JSON we expected.
    Decode,
    /// A mutation is already in flight for the same target.
    Conflict,
    /// Local collection has no entry with the given id.
    NotFound,
    /// Local form rule failed; never reaches the network.
    Validation,
    /// Credential provider had no token.
    Unauthenticated,
    InvalidRequest,
    InvalidState,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Http => "HTTP_ERROR",
            Self::Decode => "DECODE_ERROR",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION_ERROR",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidState => "INVALID_STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub cause: Option<String>,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        truncate_utf8_safe(&mut message, MAX_ERROR_MESSAGE_LENGTH);
        Self {
            kind,
            message,
            status: None,
            body: None,
            cause: None,
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn conflict(target: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Conflict,
            format!("a mutation is already in flight for {target}"),
        )
    }

    #[must_use]
    pub fn not_found(id: &ResourceId) -> Self {
        Self::new(ErrorKind::NotFound, format!("no resource with id '{id}'"))
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated, "no credentials available")
    }

    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// Non-2xx response. The message is lifted from the error body when the
    /// backend supplied one.
    #[must_use]
    pub fn http(status: u16, body: Option<Value>) -> Self {
        let message = body
            .as_ref()
            .and_then(envelope_message)
            .unwrap_or_else(|| format!("HTTP error: {status}"));
        let mut info = Self::new(ErrorKind::Http, message).with_status(status);
        info.body = body;
        info
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// 401 from the backend, or no token to begin with. The screen reacts by
    /// sending the user back through login.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Unauthenticated)
            || (self.kind == ErrorKind::Http && self.status == Some(401))
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to reach the server. Please check your connection and try again.".into()
            }
            ErrorKind::Http => match self.status {
                Some(401) => "Your session has expired. Please sign in again.".into(),
                Some(403) => "You don't have permission to perform this action.".into(),
                Some(404) => "The requested item could not be found.".into(),
                Some(status) if status >= 500 => {
                    "The server ran into a problem. Please try again later.".into()
                }
                _ => self.message.clone(),
            },
            ErrorKind::Decode => {
                "The server sent an unexpected response. Please contact support if this persists."
                    .into()
            }
            ErrorKind::Conflict => {
                "This item is still being saved. Please wait a moment.".into()
            }
            ErrorKind::NotFound => "The item is no longer in this list. Please refresh.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Unauthenticated => "Please sign in to continue.".into(),
            ErrorKind::InvalidRequest | ErrorKind::InvalidState => {
                "An unexpected error occurred. Please try again.".into()
            }
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorInfo {}

pub type AppResult<T> = Result<T, ErrorInfo>;

/// Human-readable message from an application error body, if it has one.
pub(crate) fn envelope_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    ["message", "error", "msg"]
        .iter()
        .find_map(|key| match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Object(inner)) => inner
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
}

pub(crate) fn truncate_utf8_safe(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_error_lifts_body_message() {
        let err = ErrorInfo::http(400, Some(json!({"message": "email already used"})));
        assert_eq!(err.kind, ErrorKind::Http);
        assert_eq!(err.status, Some(400));
        assert_eq!(err.message, "email already used");
        assert_eq!(err.body, Some(json!({"message": "email already used"})));
    }

    #[test]
    fn test_http_error_nested_error_object() {
        let err = ErrorInfo::http(422, Some(json!({"error": {"message": "bad plan"}})));
        assert_eq!(err.message, "bad plan");
    }

    #[test]
    fn test_http_error_without_body() {
        let err = ErrorInfo::http(502, None);
        assert_eq!(err.message, "HTTP error: 502");
        assert!(err.user_facing_message().contains("server"));
    }

    #[test]
    fn test_auth_failure_detection() {
        assert!(ErrorInfo::http(401, None).is_auth_failure());
        assert!(ErrorInfo::unauthenticated().is_auth_failure());
        assert!(!ErrorInfo::http(403, None).is_auth_failure());
        assert!(!ErrorInfo::network("down").with_status(401).is_auth_failure());
    }

    #[test]
    fn test_display_includes_code_and_status() {
        let err = ErrorInfo::http(404, None).with_cause("route missing");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[HTTP_ERROR]"));
        assert!(rendered.contains("status 404"));
        assert!(rendered.contains("route missing"));
    }

    #[test]
    fn test_message_truncated_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_MESSAGE_LENGTH);
        let err = ErrorInfo::validation(long);
        assert!(err.message.len() <= MAX_ERROR_MESSAGE_LENGTH);
        assert!(err.message.is_char_boundary(err.message.len()));
    }
}
