//! Failure taxonomy for backend calls.

use serde_json::Value;

/// How a backend request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiFailure {
    /// Connection refused, DNS failure, timeout.
    #[error("network error: {0}")]
    Network(String),
    /// 401 or 403.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },
    /// 413.
    #[error("payload too large")]
    PayloadTooLarge,
    /// 404.
    #[error("not found")]
    NotFound,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Body could not be parsed.
    #[error("invalid response: {0}")]
    Decode(String),
    /// Token storage could not be read or written.
    #[error("token storage error: {0}")]
    Storage(String),
}

impl ApiFailure {
    /// Classify a non-success status, pulling a message out of the body if present.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ApiFailure::Unauthorized { status },
            404 => ApiFailure::NotFound,
            413 => ApiFailure::PayloadTooLarge,
            _ => ApiFailure::Http {
                status,
                message: extract_message(body),
            },
        }
    }

    /// Network errors and server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiFailure::Network(_) => true,
            ApiFailure::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiFailure::Unauthorized { .. })
    }

    /// Message suitable for a banner in the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiFailure::Network(_) => {
                "Server is offline or unreachable. Please check your connection and try again."
            }
            ApiFailure::Unauthorized { .. } => "Your session has expired. Please log in again.",
            ApiFailure::PayloadTooLarge => {
                "Image too large. Please choose a smaller image or crop it further."
            }
            ApiFailure::NotFound => "The requested item was not found.",
            _ => "Something went wrong. Please try again.",
        }
    }
}

impl From<reqwest::Error> for ApiFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiFailure::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiFailure::from_status(status.as_u16(), "")
        } else {
            ApiFailure::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ApiFailure {
    fn from(err: std::io::Error) -> Self {
        ApiFailure::Storage(err.to_string())
    }
}

fn extract_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["message", "error", "msg"]
            .iter()
            .find_map(|key| json.get(key).and_then(Value::as_str).map(str::to_string))
    });

    from_json.unwrap_or_else(|| body.trim().chars().take(200).collect())
}
