use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientOptions};
use crate::credential::Credential;
use crate::error::{Result, SmsError};
use crate::exec::{
    FORM_CONTENT_TYPE, calculate_smoothed_offset, extract_server_time, handle_response,
    record_api_error, request_url,
};
use crate::request::{HttpMethod, build_request};
use crate::response::{ApiResponse, ErrorResponse};

pub(crate) const SEND_METHOD: &str = "alibaba.aliqin.fc.sms.num.send";
pub(crate) const QUERY_METHOD: &str = "alibaba.aliqin.fc.sms.num.query";

/// Request parameters for `alibaba.aliqin.fc.sms.num.send`.
#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    /// Recipient phone numbers, sent comma-joined as `rec_num`.
    pub numbers: Vec<String>,
    /// Approved signature shown to the recipient (`sms_free_sign_name`).
    pub sign_name: String,
    /// Template ID, e.g. `SMS_585014` (`sms_template_code`).
    pub template_code: String,
    /// Template variables, JSON-encoded as `sms_param` when non-empty.
    pub params: Map<String, Value>,
}

impl SendMessageRequest {
    pub fn new<I, S>(
        numbers: I,
        sign_name: impl Into<String>,
        template_code: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numbers: numbers.into_iter().map(Into::into).collect(),
            sign_name: sign_name.into(),
            template_code: template_code.into(),
            params: Map::new(),
        }
    }

    /// Adds a template variable.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_params(&self) -> Result<Vec<(&'static str, String)>> {
        if self.numbers.iter().all(|n| n.trim().is_empty()) {
            return Err(SmsError::Validation(
                "at least one recipient number is required".into(),
            ));
        }

        let mut params = vec![
            ("method", SEND_METHOD.to_string()),
            ("sms_type", "normal".to_string()),
            ("sms_free_sign_name", self.sign_name.clone()),
            ("rec_num", self.numbers.join(",")),
            ("sms_template_code", self.template_code.clone()),
        ];
        if !self.params.is_empty() {
            params.push(("sms_param", serde_json::to_string(&self.params)?));
        }
        Ok(params)
    }
}

/// Request parameters for `alibaba.aliqin.fc.sms.num.query`.
#[derive(Debug, Clone)]
pub struct QueryMessageRequest {
    /// Recipient phone number.
    pub number: String,
    /// Send date, `yyyyMMdd`.
    pub query_date: String,
    /// 1-based page number.
    pub current_page: u32,
    pub page_size: u32,
    /// Business ID returned by a send call. Omitted when empty.
    pub biz_id: Option<String>,
}

impl QueryMessageRequest {
    /// Creates a query for the first page of 10 records.
    pub fn new(number: impl Into<String>, query_date: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            query_date: query_date.into(),
            current_page: 1,
            page_size: 10,
            biz_id: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.current_page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn biz_id(mut self, biz_id: impl Into<String>) -> Self {
        self.biz_id = Some(biz_id.into());
        self
    }

    pub(crate) fn to_params(&self) -> Result<Vec<(&'static str, String)>> {
        validate_query_date(&self.query_date)?;

        let mut params = vec![
            ("method", QUERY_METHOD.to_string()),
            ("rec_num", self.number.clone()),
            ("query_date", self.query_date.clone()),
            ("current_page", self.current_page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(ref biz_id) = self.biz_id
            && !biz_id.is_empty()
        {
            params.push(("biz_id", biz_id.clone()));
        }
        Ok(params)
    }
}

fn validate_query_date(date: &str) -> Result<()> {
    let well_formed = date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok();
    if !well_formed {
        return Err(SmsError::Validation(format!(
            "invalid query_date '{}'. Expected: yyyyMMdd",
            date
        )));
    }
    Ok(())
}

/// Async client for the Aliqin SMS gateway.
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
    credential: Credential,
    /// Clock skew offset in seconds (server_time - local_time).
    time_offset: AtomicI64,
    last_error: Mutex<Option<ErrorResponse>>,
}

impl Client {
    /// Creates a new client with an explicit credential and default configuration.
    pub fn new(credential: Credential) -> Result<Self> {
        Self::with_config(credential, ClientConfig::default())
    }

    /// Creates a new client from a loosely-typed option set.
    ///
    /// Fails with [`SmsError::Config`] on an unsupported sign method or format.
    pub fn with_options(credential: Credential, options: ClientOptions) -> Result<Self> {
        Self::with_config(credential, ClientConfig::try_from(options)?)
    }

    /// Creates a new client with an explicit credential and custom configuration.
    pub fn with_config(credential: Credential, config: ClientConfig) -> Result<Self> {
        if config.accept_invalid_certs {
            warn!(endpoint = %config.endpoint, "TLS certificate verification is disabled");
        }
        let http = reqwest::Client::builder()
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
    pub async fn send_message(&self, request: SendMessageRequest) -> Result<ApiResponse> {
        let owned = request.to_params()?;
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.execute(&params).await
    }

    /// Queries delivery records for a number on a given day.
    pub async fn query_message(&self, request: QueryMessageRequest) -> Result<ApiResponse> {
        let owned = request.to_params()?;
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.execute(&params).await
    }

    /// Returns the payload of the most recent `error_response`, if any.
    ///
    /// Successful calls do not clear it.
    pub fn last_error(&self) -> Option<ErrorResponse> {
        self.last_error.lock().clone()
    }

    /// Returns the current clock offset in seconds.
    ///
    /// A positive value means the local clock is behind the gateway clock.
    /// Always zero when [`ClientConfig::clock_skew_correction`] is off.
    pub fn time_offset(&self) -> i64 {
        self.time_offset.load(Ordering::Relaxed)
    }

    fn update_time_offset(&self, server_time: i64) {
        let local_time = chrono::Utc::now().timestamp();
        let current_offset = self.time_offset.load(Ordering::Relaxed);
        let smoothed = calculate_smoothed_offset(current_offset, server_time - local_time);
        self.time_offset.store(smoothed, Ordering::Relaxed);
        debug!(offset = smoothed, "updated clock offset");
    }

    async fn execute(&self, params: &[(&str, &str)]) -> Result<ApiResponse> {
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
        let response = builder.send().await?;

        if self.config.clock_skew_correction
            && let Some(server_time) = extract_server_time(response.headers())
        {
            self.update_time_offset(server_time);
        }

        let status = response.status();
        let text = response.text().await?;

        let result = handle_response(status, text, self.config.format);
        record_api_error(&self.last_error, &result);
        result
    }
}
