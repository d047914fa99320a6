//! Map HTTP provider failures onto transient/permanent errors

use crate::error::ScriptRagError;
use reqwest::StatusCode;

/// Classify a non-success response
///
/// 429 and 5xx are transient. Every other status (bad request, bad key,
/// missing model) is permanent and must not be retried.
pub fn error_from_response(provider: &str, status: StatusCode, body: &str) -> ScriptRagError {
    let message = format!("{} returned {}: {}", provider, status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ScriptRagError::transient(provider, message)
    } else {
        ScriptRagError::permanent(provider, message)
    }
}

/// Classify a transport-level failure
pub fn error_from_transport(provider: &str, err: reqwest::Error) -> ScriptRagError {
    if err.is_timeout() || err.is_connect() || err.is_body() || err.is_request() {
        ScriptRagError::transient(provider, err.to_string())
    } else {
        ScriptRagError::permanent(provider, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(error_from_response("gemini", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(error_from_response("gemini", StatusCode::SERVICE_UNAVAILABLE, "").is_retryable());
        assert!(!error_from_response("gemini", StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(!error_from_response("gemini", StatusCode::BAD_REQUEST, "").is_retryable());
        assert!(!error_from_response("openai", StatusCode::NOT_FOUND, "").is_retryable());
    }
}
