//! The single error shape every API call resolves to.

use serde::{Deserialize, Serialize};

/// Machine-readable failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response, a timeout, or a response that could not be read.
    Network,
    /// 401: bad credentials or a dead session.
    Authentication,
    /// 403: valid session, insufficient rights.
    Authorization,
    /// 400/422 and other client errors; may carry field messages.
    Validation,
    NotFound,
    Conflict,
    /// 5xx.
    Server,
}

impl ErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            400..=499 => ErrorKind::Validation,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Network,
        }
    }

    /// Whether repeating the exact same request is safe and likely to help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Server => "server",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-level message from a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// RFC 7807 problem document as sent by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDocument {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// Normalized API failure.
///
/// `retryable` is set only for kinds where resending the same request may
/// succeed (network, server). Nothing in the client retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub title: Option<String>,
    pub detail: String,
    pub validation_errors: Vec<FieldError>,
    pub retryable: bool,
}

impl core::fmt::Display for ApiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error ({}): {}", self.kind, status, self.detail),
            None => write!(f, "{} error: {}", self.kind, self.detail),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            title: None,
            detail: detail.into(),
            validation_errors: Vec::new(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, detail)
    }

    pub fn authentication(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, detail)
    }

    /// Build an error from a non-2xx status and its raw body.
    ///
    /// A problem document fills title/detail/field errors; any other body is
    /// kept verbatim as the detail. The kind always follows the status: an
    /// unparseable error body never becomes `Network`, which is reserved for
    /// a missing response or a malformed 2xx body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let kind = ErrorKind::from_status(status);
        let mut err = Self::new(kind, String::new());
        err.status = Some(status);

        match serde_json::from_str::<ProblemDocument>(body) {
            Ok(doc) => {
                err.detail = doc
                    .detail
                    .or_else(|| doc.title.clone())
                    .unwrap_or_else(|| format!("HTTP {status}"));
                err.title = doc.title;
                err.validation_errors = doc.errors;
            }
            Err(_) => {
                let raw = body.trim();
                err.detail = if raw.is_empty() {
                    format!("HTTP {status}")
                } else {
                    raw.to_string()
                };
            }
        }

        err
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Message for `field`, if the server reported one.
    pub fn field_message(&self, field: &str) -> Option<&str> {
        self.validation_errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::network("request timed out")
        } else if err.is_decode() {
            ApiError::network(format!("malformed response: {err}"))
        } else {
            ApiError::network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_kind() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Authentication);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Authorization);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(409), ErrorKind::Conflict);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Server);
    }

    #[test]
    fn problem_document_fills_fields() {
        let body = serde_json::json!({
            "type": "https://herald.example/problems/validation",
            "title": "Validation failed",
            "status": 422,
            "detail": "2 fields are invalid",
            "instance": "/notifications",
            "errors": [
                { "field": "title", "message": "must not be empty" },
                { "field": "audience", "message": "unknown district" }
            ]
        })
        .to_string();

        let err = ApiError::from_response(422, &body);

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.title.as_deref(), Some("Validation failed"));
        assert_eq!(err.detail, "2 fields are invalid");
        assert_eq!(err.field_message("audience"), Some("unknown district"));
        assert!(!err.retryable);
    }

    #[test]
    fn unstructured_body_keeps_status_kind_and_raw_text() {
        let err = ApiError::from_response(502, "<html>Bad Gateway</html>");
        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(err.detail, "<html>Bad Gateway</html>");
        assert!(err.retryable);

        let err = ApiError::from_response(404, "");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.detail, "HTTP 404");

        let err = ApiError::from_response(401, "{not json");
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.status, Some(401));
        assert_eq!(err.detail, "{not json");
        assert!(!err.retryable);
    }

    #[test]
    fn legacy_message_body_is_understood() {
        let err = ApiError::from_response(409, r#"{"error":"conflict","message":"stale version"}"#);
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.detail, "stale version");
    }

    #[test]
    fn retryability_by_kind() {
        assert!(ApiError::network("down").retryable);
        assert!(!ApiError::validation("bad").retryable);
        assert!(!ApiError::from_response(403, "").retryable);
        assert!(!ApiError::from_response(401, "").retryable);
    }

    #[test]
    fn display_includes_status_when_known() {
        assert_eq!(
            ApiError::from_response(404, "").to_string(),
            "not_found error (404): HTTP 404"
        );
        assert_eq!(ApiError::network("offline").to_string(), "network error: offline");
    }
}
