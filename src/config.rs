use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{Result, SmsError};
use crate::request::HttpMethod;
use crate::sign::SignMethod;

/// Response encoding requested from the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
}

impl ResponseFormat {
    /// Returns the value sent as `format`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ResponseFormat::Json),
            "xml" => Ok(ResponseFormat::Xml),
            other => Err(SmsError::Config(format!(
                "unsupported response format: {}",
                other
            ))),
        }
    }
}

/// Configuration for the SMS client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway endpoint URL.
    pub endpoint: String,

    /// Overall HTTP request timeout.
    pub timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Response encoding.
    pub format: ResponseFormat,

    /// Ask for simplified JSON. Only sent when `format` is JSON.
    pub simplify: bool,

    /// API version (`v` parameter).
    pub version: String,

    /// Signature algorithm.
    pub sign_method: SignMethod,

    /// HTTP method used for every call.
    pub http_method: HttpMethod,

    /// Skip TLS certificate and hostname verification.
    ///
    /// Off by default. Only meaningful for `https` endpoints.
    pub accept_invalid_certs: bool,

    /// Track the gateway clock through the `Date` response header.
    ///
    /// When on (the default), every response carrying a `Date` header folds
    /// `server_time - local_time` into a smoothed offset, and the `timestamp`
    /// parameter of later requests is `now + offset` rather than the local
    /// clock. When off, the offset stays at zero and `timestamp` is the local
    /// clock as is.
    pub clock_skew_correction: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://gw.api.taobao.com/router/rest".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            format: ResponseFormat::Json,
            simplify: false,
            version: "2.0".to_string(),
            sign_method: SignMethod::Hmac,
            http_method: HttpMethod::Get,
            accept_invalid_certs: false,
            clock_skew_correction: true,
        }
    }
}

impl ClientConfig {
    /// Sets a custom endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the overall HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_sign_method(mut self, sign_method: SignMethod) -> Self {
        self.sign_method = sign_method;
        self
    }

    pub fn with_http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    /// Disables TLS verification. Use only against endpoints you control.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Enables or disables the `Date`-header clock offset applied to `timestamp`.
    pub fn with_clock_skew_correction(mut self, enabled: bool) -> Self {
        self.clock_skew_correction = enabled;
        self
    }
}

/// Loosely-typed client options, e.g. read from a JSON or TOML file.
///
/// Recognized keys: `format`, `simplify`, `version`, `signatureMethod`.
/// Missing keys keep the [`ClientConfig`] defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    pub format: Option<String>,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub simplify: Option<bool>,
    pub version: Option<String>,
    pub signature_method: Option<String>,
}

impl TryFrom<ClientOptions> for ClientConfig {
    type Error = SmsError;

    fn try_from(options: ClientOptions) -> Result<Self> {
        let mut config = ClientConfig::default();
        if let Some(format) = options.format {
            config.format = format.parse()?;
        }
        if let Some(simplify) = options.simplify {
            config.simplify = simplify;
        }
        if let Some(version) = options.version {
            config.version = version;
        }
        if let Some(method) = options.signature_method {
            config.sign_method = method.parse()?;
        }
        Ok(config)
    }
}

fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "invalid simplify flag: {}",
                other
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "http://gw.api.taobao.com/router/rest");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.format, ResponseFormat::Json);
        assert!(!config.simplify);
        assert_eq!(config.version, "2.0");
        assert_eq!(config.sign_method, SignMethod::Hmac);
        assert_eq!(config.http_method, HttpMethod::Get);
        assert!(!config.accept_invalid_certs);
        assert!(config.clock_skew_correction);
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::default()
            .with_endpoint("https://eco.taobao.com/router/rest")
            .with_timeout(Duration::from_secs(10))
            .with_format(ResponseFormat::Xml)
            .with_sign_method(SignMethod::Md5)
            .with_http_method(HttpMethod::Post)
            .with_accept_invalid_certs(true);
        assert_eq!(config.endpoint, "https://eco.taobao.com/router/rest");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.format, ResponseFormat::Xml);
        assert_eq!(config.sign_method, SignMethod::Md5);
        assert_eq!(config.http_method, HttpMethod::Post);
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn clock_skew_correction_can_be_disabled() {
        let config = ClientConfig::default().with_clock_skew_correction(false);
        assert!(!config.clock_skew_correction);
        assert!(config.with_clock_skew_correction(true).clock_skew_correction);
    }

    #[test]
    fn options_from_json() {
        let options: ClientOptions = serde_json::from_str(
            r#"{"format":"json","simplify":"true","version":"2.0","signatureMethod":"md5"}"#,
        )
        .unwrap();
        let config = ClientConfig::try_from(options).unwrap();
        assert!(config.simplify);
        assert_eq!(config.sign_method, SignMethod::Md5);
    }

    #[test]
    fn options_accept_bool_simplify() {
        let options: ClientOptions = serde_json::from_str(r#"{"simplify":true}"#).unwrap();
        assert_eq!(options.simplify, Some(true));
    }

    #[test]
    fn empty_options_keep_defaults() {
        let config = ClientConfig::try_from(ClientOptions::default()).unwrap();
        assert_eq!(config.sign_method, SignMethod::Hmac);
        assert_eq!(config.format, ResponseFormat::Json);
        assert_eq!(config.version, "2.0");
    }

    #[test]
    fn unsupported_sign_method_is_rejected() {
        let options = ClientOptions {
            signature_method: Some("sha256".into()),
            ..Default::default()
        };
        let err = ClientConfig::try_from(options).unwrap_err();
        assert!(
            matches!(err, SmsError::Config(ref msg) if msg.contains("unsupported sign method"))
        );
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let options = ClientOptions {
            format: Some("yaml".into()),
            ..Default::default()
        };
        assert!(matches!(
            ClientConfig::try_from(options),
            Err(SmsError::Config(_))
        ));
    }
}
