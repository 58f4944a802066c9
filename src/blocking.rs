//! Synchronous (blocking) client for the Aliqin SMS gateway.
//!
//! This module is only available when the `blocking` feature is enabled
//! (it is part of the default feature set). It mirrors the async
//! [`crate::client::Client`] API using `reqwest::blocking`.
//!
//! Every call performs exactly one blocking HTTP round trip bounded by the
//! configured connect and overall timeouts. Nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use rs_ali_sms::blocking::Client;
//! use rs_ali_sms::{Credential, SendMessageRequest};
//!
//! fn main() -> rs_ali_sms::Result<()> {
//!     let client = Client::new(Credential::new("app-key", "app-secret"))?;
//!
//!     let request = SendMessageRequest::new(["13800000000"], "MyShop", "SMS_585014")
//!         .param("code", "123456");
//!
//!     match client.send_message(request) {
//!         Ok(resp) => println!("sent, request_id: {:?}", resp.request_id()),
//!         Err(e) => println!("failed: {}", e),
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::{QueryMessageRequest, SendMessageRequest};
use crate::config::{ClientConfig, ClientOptions};
use crate::credential::Credential;
use crate::error::{Result, SmsError};
use crate::exec::{
    FORM_CONTENT_TYPE, calculate_smoothed_offset, extract_server_time, handle_response,
    record_api_error, request_url,
};
use crate::request::{HttpMethod, build_request};
use crate::response::{ApiResponse, ErrorResponse};

/// Synchronous client for the Aliqin SMS gateway.
pub struct Client {
    http: reqwest::blocking::Client,
    config: ClientConfig,
    credential: Credential,
    /// Clock skew offset in seconds (server_time - local_time).
    time_offset: AtomicI64,
    last_error: Mutex<Option<ErrorResponse>>,
}

impl Client {
    /// Creates a new blocking client with an explicit credential.
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_config(credential, ClientConfig::default())
    }

    /// Creates a new blocking client from a loosely-typed option set.
    pub fn with_options(credential: Credential, options: ClientOptions) -> Result<Self> {
        Self::with_config(credential, ClientConfig::try_from(options)?)
    }

    /// Creates a new blocking client with custom configuration.
    pub fn with_config(credential: Credential, config: ClientConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!(endpoint = %config.endpoint, "TLS certificate verification is disabled");
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| SmsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            credential,
            time_offset: AtomicI64::new(0),
            last_error: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a templated SMS to one or more numbers.
    pub fn send_message(&self, request: SendMessageRequest) -> Result<ApiResponse> {
        let owned = request.to_params()?;
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.execute(&params)
    }

    /// Queries delivery records for a number on a given day.
    pub fn query_message(&self, request: QueryMessageRequest) -> Result<ApiResponse> {
        let owned = request.to_params()?;
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.execute(&params)
    }

    /// Returns the payload of the most recent `error_response`, if any.
    pub fn last_error(&self) -> Option<ErrorResponse> {
        self.last_error.lock().clone()
    }

    /// Returns the current clock offset in seconds.
    pub fn time_offset(&self) -> i64 {
        self.time_offset.load(Ordering::Relaxed)
    }

    /// Folds the gateway clock into the offset (75% old + 25% new).
    fn update_time_offset(&self, server_time: i64) {
        let local_time = chrono::Utc::now().timestamp();
        let current_offset = self.time_offset.load(Ordering::Relaxed);
        let smoothed = calculate_smoothed_offset(current_offset, server_time - local_time);
        self.time_offset.store(smoothed, Ordering::Relaxed);
        debug!(offset = smoothed, "updated clock offset");
    }

    fn execute(&self, params: &[(&str, &str)]) -> Result<ApiResponse> {
        let time_offset = self.time_offset.load(Ordering::Relaxed);
        let mut request = build_request(params, &self.credential, &self.config, time_offset);
        request.sign_with(self.config.sign_method, &self.credential.access_key_secret);

        debug!(
            method = request.get("method").unwrap_or_default(),
            http_method = %request.method(),
            endpoint = %self.config.endpoint,
            "sending gateway request"
        );

        let builder = match request.method() {
            HttpMethod::Get => self
                .http
                .get(request_url(&self.config.endpoint, &request.serialize())),
            HttpMethod::Post => self
                .http
                .post(&self.config.endpoint)
                .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(request.serialize()),
        };
        let response = builder.send()?;

        if self.config.clock_skew_correction
            && let Some(server_time) = extract_server_time(response.headers())
        {
            self.update_time_offset(server_time);
        }

        let status = response.status();
        let text = response.text()?;

        let result = handle_response(status, text, self.config.format);
        record_api_error(&self.last_error, &result);
        result
    }
}
