//! Common execution utilities for async and blocking clients.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::config::ResponseFormat;
use crate::error::{MAX_ERROR_BODY_CHARS, Result, SmsError, truncate_str};
use crate::response::{ApiResponse, ERROR_RESPONSE_KEY, ErrorResponse};

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Appends a serialized query string to the endpoint.
pub(crate) fn request_url(endpoint: &str, query: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}{}", endpoint, separator, query)
}

/// Extracts server time from HTTP response Date header.
///
/// Returns `Some(server_timestamp)` if the Date header is present and parseable.
pub(crate) fn extract_server_time(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    if let Some(date_header) = headers.get(reqwest::header::DATE)
        && let Ok(date_str) = date_header.to_str()
        && let Ok(server_time) = chrono::DateTime::parse_from_rfc2822(date_str)
    {
        return Some(server_time.timestamp());
    }
    None
}

/// Calculates smoothed clock offset using exponential moving average.
///
/// Uses 75% old value + 25% new value to reduce jitter.
pub(crate) fn calculate_smoothed_offset(current_offset: i64, new_offset: i64) -> i64 {
    (current_offset * 3 + new_offset) / 4
}

fn http_error(status: reqwest::StatusCode, text: &str) -> SmsError {
    SmsError::Http(format!(
        "HTTP {} with body: {}",
        status,
        truncate_str(text, MAX_ERROR_BODY_CHARS)
    ))
}

/// Classifies a response body as success, API error or HTTP error.
///
/// An `error_response` payload wins over the status code: the gateway
/// reports business failures with `200 OK`.
pub(crate) fn handle_response(
    status: reqwest::StatusCode,
    text: String,
    format: ResponseFormat,
) -> Result<ApiResponse> {
    if text.trim().is_empty() {
        return if status.is_success() {
            Err(SmsError::EmptyResponse)
        } else {
            Err(http_error(status, &text))
        };
    }

    match format {
        ResponseFormat::Json => match serde_json::from_str::<Value>(&text) {
            Ok(json) => {
                if let Some(payload) = json.get(ERROR_RESPONSE_KEY) {
                    Err(SmsError::Api(ErrorResponse::from_json(payload)))
                } else if status.is_success() {
                    Ok(ApiResponse::new(format, text, Some(json)))
                } else {
                    Err(http_error(status, &text))
                }
            }
            Err(e) if status.is_success() => Err(SmsError::Deserialize(e)),
            Err(_) => Err(http_error(status, &text)),
        },
        ResponseFormat::Xml => {
            if let Some(err) = ErrorResponse::from_xml(&text) {
                Err(SmsError::Api(err))
            } else if status.is_success() {
                Ok(ApiResponse::new(format, text, None))
            } else {
                Err(http_error(status, &text))
            }
        }
    }
}

/// Stores the payload of an API error in the client's last-error slot.
///
/// Other outcomes leave the slot untouched.
pub(crate) fn record_api_error(slot: &Mutex<Option<ErrorResponse>>, result: &Result<ApiResponse>) {
    if let Err(SmsError::Api(err)) = result {
        warn!(
            code = err.code.as_deref().unwrap_or("-"),
            sub_code = err.sub_code.as_deref().unwrap_or("-"),
            request_id = err.request_id.as_deref().unwrap_or("-"),
            "gateway returned error_response"
        );
        *slot.lock() = Some(err.clone());
    }
}
