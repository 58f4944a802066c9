//! Request model and common-parameter assembly for the Aliqin SMS gateway.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{TimeDelta, Utc};
use url::form_urlencoded;

use crate::config::{ClientConfig, ResponseFormat};
use crate::credential::Credential;
use crate::sign::{SIGN_PARAM, SignMethod};

/// The gateway expects timestamps in Beijing time (UTC+8).
const GATEWAY_UTC_OFFSET_SECS: i64 = 8 * 3600;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// HTTP method used to deliver a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    /// Parameters travel in the query string.
    #[default]
    Get,
    /// Parameters travel as a form-encoded body.
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway request: parameters sorted by name plus the HTTP method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    params: BTreeMap<String, String>,
    method: HttpMethod,
}

impl Request {
    /// Stores `params` as given. No validation is performed.
    pub fn new(params: BTreeMap<String, String>, method: HttpMethod) -> Self {
        Self { params, method }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Inserts or replaces a parameter.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Returns the `sign` parameter, if the request has been signed.
    pub fn sign(&self) -> Option<&str> {
        self.get(SIGN_PARAM)
    }

    pub fn set_sign(&mut self, sign: impl Into<String>) {
        self.set(SIGN_PARAM, sign);
    }

    /// Computes the signature over every parameter except `sign` and stores it.
    ///
    /// Re-signing replaces the previous value.
    pub fn sign_with(&mut self, method: SignMethod, secret: &str) {
        let signature = method.sign(&self.params, secret);
        self.set_sign(signature);
    }

    /// Serializes as `application/x-www-form-urlencoded`, keys ascending.
    ///
    /// This is both the GET query string and the POST body.
    pub fn serialize(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

/// Returns `now + offset_secs` formatted as `YYYY-MM-DD HH:MM:SS` in UTC+8.
pub(crate) fn timestamp(offset_secs: i64) -> String {
    let shifted = Utc::now() + TimeDelta::seconds(offset_secs + GATEWAY_UTC_OFFSET_SECS);
    shifted.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

/// Merges the common parameters with call-specific ones into an unsigned request.
///
/// Common parameters: `app_key`, `sign_method`, `format`, `v`, `simplify`
/// (JSON only) and `timestamp`. A call parameter with the same name wins.
pub(crate) fn build_request(
    params: &[(&str, &str)],
    credential: &Credential,
    config: &ClientConfig,
    time_offset: i64,
) -> Request {
    let mut all_params = BTreeMap::new();

    all_params.insert("app_key".to_string(), credential.access_key_id.clone());
    all_params.insert(
        "sign_method".to_string(),
        config.sign_method.as_str().to_string(),
    );
    all_params.insert("format".to_string(), config.format.as_str().to_string());
    all_params.insert("v".to_string(), config.version.clone());
    if config.format == ResponseFormat::Json {
        all_params.insert("simplify".to_string(), config.simplify.to_string());
    }
    all_params.insert("timestamp".to_string(), timestamp(time_offset));

    for (key, value) in params {
        all_params.insert(key.to_string(), value.to_string());
    }

    Request::new(all_params, config.http_method)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn credential() -> Credential {
        Credential::new("test_app_key", "test_secret")
    }

    #[test]
    fn serialize_sorts_keys() {
        let mut params = BTreeMap::new();
        params.insert("v".to_string(), "2.0".to_string());
        params.insert("app_key".to_string(), "k".to_string());
        params.insert("method".to_string(), "m".to_string());
        let request = Request::new(params, HttpMethod::Get);

        let serialized = request.serialize();
        assert_eq!(serialized, "app_key=k&method=m&v=2.0");

        let keys: Vec<&str> = serialized
            .split('&')
            .map(|pair| pair.split('=').next().unwrap())
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn serialize_form_encodes() {
        let mut request = Request::new(BTreeMap::new(), HttpMethod::Post);
        request.set("timestamp", "2024-01-01 08:00:00");
        request.set("sms_param", r#"{"code":"123"}"#);
        request.set("rec_num", "13800000000,13900000000");
        assert_eq!(
            request.serialize(),
            "rec_num=13800000000%2C13900000000\
             &sms_param=%7B%22code%22%3A%22123%22%7D\
             &timestamp=2024-01-01+08%3A00%3A00"
        );
    }

    #[test]
    fn serialize_utf8() {
        let mut request = Request::new(BTreeMap::new(), HttpMethod::Get);
        request.set("sms_free_sign_name", "阿里大于");
        assert_eq!(
            request.serialize(),
            "sms_free_sign_name=%E9%98%BF%E9%87%8C%E5%A4%A7%E4%BA%8E"
        );
    }

    #[test]
    fn sign_is_serialized_once_set() {
        let mut request = Request::new(BTreeMap::new(), HttpMethod::Get);
        request.set("a", "1");
        assert!(!request.serialize().contains("sign="));

        request.sign_with(SignMethod::Md5, "s3cr3t");
        let first = request.sign().unwrap().to_string();
        assert!(request.serialize().contains(&format!("sign={}", first)));

        // Signing again must not feed the old signature into the new one.
        request.sign_with(SignMethod::Md5, "s3cr3t");
        assert_eq!(request.sign().unwrap(), first);
    }

    #[test]
    fn signature_round_trips_through_wire_form() {
        let mut request = build_request(
            &[("method", "alibaba.aliqin.fc.sms.num.send"), ("rec_num", "138 0000")],
            &credential(),
            &ClientConfig::default(),
            0,
        );
        request.sign_with(SignMethod::Hmac, "test_secret");
        let wire = request.serialize();

        let decoded: BTreeMap<String, String> = form_urlencoded::parse(wire.as_bytes())
            .into_owned()
            .collect();
        let sent_sign = decoded.get("sign").cloned().unwrap();
        let recomputed = SignMethod::Hmac.sign(&decoded, "test_secret");
        assert_eq!(sent_sign, recomputed);
        assert_eq!(decoded.get("rec_num").unwrap(), "138 0000");
    }

    #[test]
    fn build_request_common_params() {
        let request = build_request(
            &[("method", "alibaba.aliqin.fc.sms.num.query")],
            &credential(),
            &ClientConfig::default(),
            0,
        );
        assert_eq!(request.get("app_key"), Some("test_app_key"));
        assert_eq!(request.get("sign_method"), Some("hmac"));
        assert_eq!(request.get("format"), Some("json"));
        assert_eq!(request.get("v"), Some("2.0"));
        assert_eq!(request.get("simplify"), Some("false"));
        assert_eq!(request.get("method"), Some("alibaba.aliqin.fc.sms.num.query"));
        assert!(request.get("timestamp").is_some());
        assert!(request.sign().is_none());
        assert_eq!(request.method(), HttpMethod::Get);
    }

    #[test]
    fn build_request_xml_omits_simplify() {
        let config = ClientConfig::default()
            .with_format(ResponseFormat::Xml)
            .with_simplify(true)
            .with_sign_method(SignMethod::Md5)
            .with_http_method(HttpMethod::Post);
        let request = build_request(&[], &credential(), &config, 0);
        assert_eq!(request.get("format"), Some("xml"));
        assert_eq!(request.get("simplify"), None);
        assert_eq!(request.get("sign_method"), Some("md5"));
        assert_eq!(request.method(), HttpMethod::Post);
    }

    #[test]
    fn call_params_override_common_params() {
        let request = build_request(&[("v", "1.0")], &credential(), &ClientConfig::default(), 0);
        assert_eq!(request.get("v"), Some("1.0"));
    }

    #[test]
    fn timestamp_is_utc_plus_eight() {
        let stamp = timestamp(0);
        let parsed = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).unwrap();
        let expected = Utc::now().naive_utc() + TimeDelta::hours(8);
        assert!((parsed - expected).num_seconds().abs() <= 2);
    }

    #[test]
    fn timestamp_applies_offset() {
        let base = NaiveDateTime::parse_from_str(&timestamp(0), TIMESTAMP_FORMAT).unwrap();
        let ahead = NaiveDateTime::parse_from_str(&timestamp(3600), TIMESTAMP_FORMAT).unwrap();
        let diff = (ahead - base).num_seconds();
        assert!((3598..=3602).contains(&diff));
    }
}
