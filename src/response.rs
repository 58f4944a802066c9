use std::fmt;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::config::ResponseFormat;

/// Top-level key the gateway uses to signal a failed call.
pub(crate) const ERROR_RESPONSE_KEY: &str = "error_response";

/// Decoded `error_response` payload.
///
/// Numeric fields (such as `code`) are rendered as strings so JSON and XML
/// responses decode to the same shape. `raw` keeps the payload as received.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub code: Option<String>,
    pub msg: Option<String>,
    pub sub_code: Option<String>,
    pub sub_msg: Option<String>,
    pub request_id: Option<String>,
    pub raw: Value,
}

impl ErrorResponse {
    pub(crate) fn from_json(payload: &Value) -> Self {
        let field = |name: &str| payload.get(name).and_then(scalar_to_string);
        Self {
            code: field("code"),
            msg: field("msg"),
            sub_code: field("sub_code"),
            sub_msg: field("sub_msg"),
            request_id: field("request_id"),
            raw: payload.clone(),
        }
    }

    /// Decodes `<error_response>...</error_response>`. Returns `None` when the
    /// document root is anything else.
    pub(crate) fn from_xml(body: &str) -> Option<Self> {
        let (root, fields) = xml_root_fields(body)?;
        (root == ERROR_RESPONSE_KEY).then(|| Self::from_json(&Value::Object(fields)))
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(request_id: {}) [{}] {}",
            self.request_id.as_deref().unwrap_or("-"),
            self.code.as_deref().unwrap_or("-"),
            self.msg.as_deref().unwrap_or("")
        )?;
        if let Some(sub_code) = &self.sub_code {
            write!(f, " / {}", sub_code)?;
            if let Some(sub_msg) = &self.sub_msg {
                write!(f, ": {}", sub_msg)?;
            }
        }
        Ok(())
    }
}

/// A successful gateway response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    format: ResponseFormat,
    body: String,
    json: Option<Value>,
}

impl ApiResponse {
    pub(crate) fn new(format: ResponseFormat, body: String, json: Option<Value>) -> Self {
        Self { format, body, json }
    }

    /// Format the body was requested in.
    pub fn format(&self) -> ResponseFormat {
        self.format
    }

    /// Raw response body.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Parsed JSON body (`None` for XML responses).
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// The business payload.
    ///
    /// Non-simplified JSON wraps it in a single `<method>_response` object;
    /// simplified JSON returns it at the top level.
    pub fn payload(&self) -> Option<&Value> {
        let json = self.json.as_ref()?;
        if let Some(obj) = json.as_object()
            && obj.len() == 1
            && let Some((key, inner)) = obj.iter().next()
            && key.ends_with("_response")
            && inner.is_object()
        {
            return Some(inner);
        }
        Some(json)
    }

    /// Gateway request ID, if present.
    pub fn request_id(&self) -> Option<String> {
        match &self.json {
            Some(_) => self
                .payload()
                .and_then(|p| p.get("request_id"))
                .and_then(scalar_to_string),
            None => xml_root_fields(&self.body)
                .and_then(|(_, fields)| fields.get("request_id").and_then(scalar_to_string)),
        }
    }

    /// Result of `alibaba.aliqin.fc.sms.num.send`.
    pub fn send_result(&self) -> Option<SendResult> {
        let result = self.payload()?.get("result")?;
        SendResult::deserialize(result).ok()
    }

    /// Result of `alibaba.aliqin.fc.sms.num.query`.
    pub fn query_result(&self) -> Option<QueryResult> {
        QueryResult::deserialize(self.payload()?).ok()
    }
}

/// Outcome of a send call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendResult {
    #[serde(deserialize_with = "lenient_string")]
    pub err_code: Option<String>,
    /// Business ID of the send, usable as `biz_id` in a query.
    #[serde(deserialize_with = "lenient_string")]
    pub model: Option<String>,
    pub success: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub msg: Option<String>,
}

/// One page of delivery records.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryResult {
    #[serde(deserialize_with = "lenient_u64")]
    pub current_page: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub page_size: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub total_count: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub total_page: Option<u64>,
    #[serde(deserialize_with = "records")]
    pub values: Vec<SmsRecord>,
}

/// A single delivery record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SmsRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub extend: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub rec_num: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub result_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sms_code: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sms_content: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sms_receiver_time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sms_send_time: Option<String>,
    pub sms_status: Option<i64>,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

// Page counters arrive as numbers, but some gateway paths quote them.
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

// `values` is a plain array when simplified, otherwise
// `{"fc_partner_sms_detail_dto": [...]}`.
fn records<'de, D>(deserializer: D) -> std::result::Result<Vec<SmsRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.into_iter().next() {
            Some((_, Value::Array(items))) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    list.into_iter()
        .map(|item| SmsRecord::deserialize(item).map_err(serde::de::Error::custom))
        .collect()
}

/// Reads the root element name and the text of its direct children.
///
/// Entities are unescaped and CDATA sections unwrapped. A leading BOM is
/// ignored. Returns `None` if the document has no root element.
fn xml_root_fields(body: &str) -> Option<(String, Map<String, Value>)> {
    let mut reader = Reader::from_str(body.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut root = None;
    let mut depth = 0usize;
    let mut field: Option<String> = None;
    let mut text = String::new();
    let mut fields = Map::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            // Keep what was read once the root is known.
            Err(_) if root.is_some() => break,
            Err(_) => return None,
        };
        match event {
            Event::Start(e) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match depth {
                    1 => root = Some(name),
                    2 => {
                        field = Some(name);
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match depth {
                    0 => return Some((name, fields)),
                    1 => {
                        fields.insert(name, Value::String(String::new()));
                    }
                    _ => {}
                }
            }
            Event::Text(t) if depth == 2 => text.push_str(&t.unescape().ok()?),
            Event::CData(c) if depth == 2 => {
                text.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Event::End(_) => {
                if depth == 2
                    && let Some(name) = field.take()
                {
                    fields.insert(name, Value::String(text.trim().to_string()));
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.map(|name| (name, fields))
}
