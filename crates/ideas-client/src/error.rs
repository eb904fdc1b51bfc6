use std::fmt;

use serde_json::Value;
use thiserror::Error;

use ideas_types::IdeaId;

/// Categories every remote or local failure is folded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, expired or rejected credential.
    Unauthenticated,
    /// Input rejected, either locally before sending or by the server.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// Connect failure, timeout, or a body that could not be read.
    Network,
    /// Anything else, including undecodable success bodies.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Unauthenticated => write!(f, "unauthenticated"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// The single error shape returned across the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// Human-readable, ready to be shown inline.
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Map a non-2xx response to an error. `fallback` is used when the body
    /// carries no usable message.
    pub fn from_status(status: u16, body: &str, fallback: &str) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 | 403 => ErrorKind::Unauthenticated,
            404 => ErrorKind::NotFound,
            _ => ErrorKind::Unknown,
        };
        let message = message_from_body(body).unwrap_or_else(|| match kind {
            ErrorKind::NotFound => format!("{fallback}: not found"),
            ErrorKind::Unknown => format!("{fallback} (HTTP {status})"),
            _ => fallback.to_string(),
        });
        Self::new(kind, message)
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.kind == ErrorKind::Unauthenticated
    }

    /// Network and unknown failures may succeed when simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Unknown)
    }
}

/// Failures of an engagement action (like toggle or comment post).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngagementError {
    /// Refused locally; no request was sent.
    #[error("{0}")]
    Rejected(ApiError),

    #[error("idea {0} is not open in any view")]
    Untracked(IdeaId),

    #[error("a comment on idea {0} is already being posted")]
    CommentInFlight(IdeaId),

    /// The request was sent and failed; local state was restored.
    #[error("{0}")]
    Failed(ApiError),
}

impl EngagementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngagementError::Rejected(e) | EngagementError::Failed(e) => e.kind,
            EngagementError::Untracked(_) => ErrorKind::NotFound,
            EngagementError::CommentInFlight(_) => ErrorKind::Validation,
        }
    }
}

/// Pull a display message out of an error body.
///
/// Understands `{"error": ".."}`, `{"detail": ".."}`, a map of field to
/// message list, and a bare list of messages. Field maps are flattened with
/// fields in name order so the result is stable.
pub fn message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    match &value {
        Value::Object(map) => {
            for key in ["error", "detail"] {
                if let Some(Value::String(msg)) = map.get(key) {
                    return Some(msg.clone());
                }
            }

            let mut fields: Vec<&String> = map.keys().collect();
            fields.sort();

            let messages: Vec<String> = fields
                .into_iter()
                .filter_map(|field| map.get(field))
                .flat_map(collect_strings)
                .collect();

            (!messages.is_empty()).then(|| messages.join(", "))
        }
        Value::Array(_) => {
            let messages = collect_strings(&value);
            (!messages.is_empty()).then(|| messages.join(", "))
        }
        Value::String(msg) if !msg.is_empty() => Some(msg.clone()),
        _ => None,
    }
}

/// First message reported for the earliest of `fields` that has one.
pub fn first_field_message(body: &str, fields: &[&str]) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let map = value.as_object()?;

    fields
        .iter()
        .filter_map(|field| map.get(*field))
        .find_map(|v| collect_strings(v).into_iter().next())
}

fn collect_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_kind() {
        assert_eq!(ApiError::from_status(400, "", "x").kind, ErrorKind::Validation);
        assert_eq!(ApiError::from_status(401, "", "x").kind, ErrorKind::Unauthenticated);
        assert_eq!(ApiError::from_status(403, "", "x").kind, ErrorKind::Unauthenticated);
        assert_eq!(ApiError::from_status(404, "", "x").kind, ErrorKind::NotFound);
        assert_eq!(ApiError::from_status(500, "", "x").kind, ErrorKind::Unknown);
    }

    #[test]
    fn error_key_wins() {
        let msg = message_from_body(r#"{"error": "Invalid credentials"}"#);
        assert_eq!(msg.as_deref(), Some("Invalid credentials"));

        let msg = message_from_body(r#"{"detail": "Given token not valid for any token type"}"#);
        assert_eq!(msg.as_deref(), Some("Given token not valid for any token type"));
    }

    #[test]
    fn field_errors_are_flattened_in_field_order() {
        let body = r#"{
            "username": ["A user with that username already exists."],
            "email": ["Enter a valid email address.", "Email is taken."]
        }"#;
        assert_eq!(
            message_from_body(body).as_deref(),
            Some("Enter a valid email address., Email is taken., A user with that username already exists.")
        );
    }

    #[test]
    fn unusable_body_falls_back() {
        let err = ApiError::from_status(400, "<html>oops</html>", "Registration failed");
        assert_eq!(err.message, "Registration failed");

        let err = ApiError::from_status(502, "", "Failed to load ideas");
        assert_eq!(err.message, "Failed to load ideas (HTTP 502)");
    }

    #[test]
    fn first_field_message_respects_field_priority() {
        let body = r#"{"description": ["Too short."], "title": ["Title too short."]}"#;
        assert_eq!(
            first_field_message(body, &["title", "description"]).as_deref(),
            Some("Title too short.")
        );
        assert_eq!(first_field_message(r#"{"other": ["x"]}"#, &["title"]), None);
    }
}
