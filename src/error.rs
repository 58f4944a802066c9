use thiserror::Error;

use crate::response::ErrorResponse;

/// Maximum characters to include in error message body for debugging.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors that can occur when using the SMS SDK.
#[derive(Debug, Error)]
pub enum SmsError {
    /// HTTP/network layer error from reqwest (connect failure, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Unexpected HTTP response (non-2xx without an `error_response` body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The gateway answered with a success status but no body.
    #[error("empty response body")]
    EmptyResponse,

    /// The gateway returned an `error_response` payload.
    #[error("API error: {0}")]
    Api(ErrorResponse),

    /// Response deserialization error.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Validation error for request parameters.
    #[error("validation error: {0}")]
    Validation(String),
}

impl SmsError {
    /// Returns `true` if the error is potentially recoverable by retrying.
    ///
    /// The client never retries on its own; this is a hint for callers.
    /// Timeouts, connection failures, 5xx responses and gateway-side
    /// (`isp.*`) failures are retryable. Caller mistakes (`isv.*`),
    /// validation and configuration errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SmsError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            SmsError::Http(_) | SmsError::EmptyResponse => true,

            SmsError::Api(err) => match err.sub_code.as_deref() {
                Some(sub) => sub.starts_with("isp."),
                // Top-level codes 7 (call limited) and 15 with no sub code are
                // service-side throttling / availability.
                None => matches!(err.code.as_deref(), Some("7") | Some("15")),
            },

            SmsError::Deserialize(_)
            | SmsError::Config(_)
            | SmsError::Validation(_) => false,
        }
    }

    /// Returns the request ID if this is an API error carrying one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            SmsError::Api(err) => err.request_id.as_deref(),
            _ => None,
        }
    }

    /// Returns the top-level error code if this is an API error.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            SmsError::Api(err) => err.code.as_deref(),
            _ => None,
        }
    }

    /// Returns the business sub code (e.g. `isv.MOBILE_NUMBER_ILLEGAL`).
    pub fn sub_code(&self) -> Option<&str> {
        match self {
            SmsError::Api(err) => err.sub_code.as_deref(),
            _ => None,
        }
    }

    /// Returns the decoded `error_response` payload if this is an API error.
    pub fn api_error(&self) -> Option<&ErrorResponse> {
        match self {
            SmsError::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// A specialized Result type for SMS operations.
pub type Result<T> = std::result::Result<T, SmsError>;

/// Truncates a string to at most `max_chars` characters on a valid UTF-8 boundary.
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str, sub_code: Option<&str>) -> SmsError {
        SmsError::Api(ErrorResponse {
            code: Some(code.to_string()),
            msg: Some("Remote service error".to_string()),
            sub_code: sub_code.map(str::to_string),
            sub_msg: None,
            request_id: Some("req-123".to_string()),
            raw: serde_json::Value::Null,
        })
    }

    #[test]
    fn api_error_display() {
        let err = api_error("15", Some("isv.MOBILE_NUMBER_ILLEGAL"));
        let msg = err.to_string();
        assert!(msg.contains("req-123"));
        assert!(msg.contains("15"));
        assert!(msg.contains("isv.MOBILE_NUMBER_ILLEGAL"));
        assert!(msg.contains("Remote service error"));
    }

    #[test]
    fn api_error_accessors() {
        let err = api_error("15", Some("isv.BUSINESS_LIMIT_CONTROL"));
        assert_eq!(err.request_id(), Some("req-123"));
        assert_eq!(err.error_code(), Some("15"));
        assert_eq!(err.sub_code(), Some("isv.BUSINESS_LIMIT_CONTROL"));
        assert!(err.api_error().is_some());

        let other = SmsError::Validation("bad".into());
        assert_eq!(other.request_id(), None);
        assert!(other.api_error().is_none());
    }

    #[test]
    fn retryable_classification() {
        assert!(api_error("15", Some("isp.SYSTEM_ERROR")).is_retryable());
        assert!(api_error("7", None).is_retryable());
        assert!(!api_error("15", Some("isv.MOBILE_NUMBER_ILLEGAL")).is_retryable());
        assert!(!api_error("25", None).is_retryable());
        assert!(SmsError::EmptyResponse.is_retryable());
        assert!(SmsError::Http("HTTP 502".into()).is_retryable());
        assert!(!SmsError::Config("x".into()).is_retryable());
        assert!(!SmsError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn http_error_display() {
        let err = SmsError::Http("HTTP 502 with body: Bad Gateway".to_string());
        assert_eq!(
            err.to_string(),
            "HTTP error: HTTP 502 with body: Bad Gateway"
        );
    }

    #[test]
    fn config_error_display() {
        let err = SmsError::Config("unsupported sign method: sha1".to_string());
        assert_eq!(err.to_string(), "config error: unsupported sign method: sha1");
    }

    #[test]
    fn empty_response_display() {
        assert_eq!(SmsError::EmptyResponse.to_string(), "empty response body");
    }

    #[test]
    fn truncate_str_short() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_str_long() {
        assert_eq!(truncate_str("hello world", 5), "hello");
    }

    #[test]
    fn truncate_str_multibyte() {
        let s = "短信发送失败";
        assert_eq!(truncate_str(s, 4), "短信发送");
    }
}
