//! Error types for cover generation.

use std::time::Duration;

/// Longest provider error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while generating or refining covers.
#[derive(Debug, thiserror::Error)]
pub enum CoverGenError {
    /// API key missing, invalid or not authorized for the model.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The credential has no billing enabled for the requested model.
    #[error("billing required: {0}")]
    Billing(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested delay, if any.
        retry_after: Option<Duration>,
    },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The model answered without an image.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 or image data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

/// The three outcomes a caller distinguishes when a request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No usable credential; the application must re-gate on credential selection.
    CredentialUnavailable,
    /// The model declined to return an image.
    ContentRejected,
    /// Any other failure.
    Unknown,
}

impl FailureKind {
    /// Short message shown on a failed result.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CredentialUnavailable => "API key required",
            Self::ContentRejected | Self::Unknown => "Generation failed",
        }
    }
}

impl CoverGenError {
    /// Collapses this error into the caller-facing failure taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) | Self::Billing(_) => FailureKind::CredentialUnavailable,
            Self::ContentBlocked(_) | Self::UnexpectedResponse(_) => FailureKind::ContentRejected,
            _ => FailureKind::Unknown,
        }
    }

    /// Returns true if the credential must be selected again.
    pub fn is_credential_failure(&self) -> bool {
        self.failure_kind() == FailureKind::CredentialUnavailable
    }
}

/// Result type alias for cover generation operations.
pub type Result<T> = std::result::Result<T, CoverGenError>;

/// Removes API keys from a provider error body and bounds its length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            // Google API keys start with "AIza"
            if let Some(pos) = word.find("AIza") {
                format!("{}[REDACTED]", &word[..pos])
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = redacted.join(" ");

    if joined.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = joined.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        joined
    }
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind() {
        assert_eq!(
            CoverGenError::Auth("bad key".into()).failure_kind(),
            FailureKind::CredentialUnavailable
        );
        assert_eq!(
            CoverGenError::Billing("no billing".into()).failure_kind(),
            FailureKind::CredentialUnavailable
        );
        assert_eq!(
            CoverGenError::ContentBlocked("nsfw".into()).failure_kind(),
            FailureKind::ContentRejected
        );
        assert_eq!(
            CoverGenError::UnexpectedResponse("no image".into()).failure_kind(),
            FailureKind::ContentRejected
        );
        assert_eq!(
            CoverGenError::RateLimited { retry_after: None }.failure_kind(),
            FailureKind::Unknown
        );
        assert_eq!(
            CoverGenError::Decode("bad base64".into()).failure_kind(),
            FailureKind::Unknown
        );
    }

    #[test]
    fn test_is_credential_failure() {
        assert!(CoverGenError::Auth("expired".into()).is_credential_failure());
        assert!(!CoverGenError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_credential_failure());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(FailureKind::Unknown.user_message(), "Generation failed");
        assert_eq!(FailureKind::ContentRejected.user_message(), "Generation failed");
        assert_eq!(
            FailureKind::CredentialUnavailable.user_message(),
            "API key required"
        );
    }

    #[test]
    fn test_error_display() {
        let err = CoverGenError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");

        let err = CoverGenError::ContentBlocked("Safety filter triggered".into());
        assert_eq!(err.to_string(), "content blocked: Safety filter triggered");
    }

    #[test]
    fn test_sanitize_redacts_api_key() {
        let msg = sanitize_error_message("API key not valid: key=AIzaSyExample123 rejected");
        assert!(!msg.contains("AIzaSyExample123"));
        assert!(msg.contains("key=[REDACTED]"));
        assert!(msg.ends_with("rejected"));
    }

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 50);
        let msg = sanitize_error_message(&long);
        assert_eq!(msg.chars().count(), MAX_ERROR_MESSAGE_LEN + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));
    }
}
