use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};

use crate::error::{Result, SmsError};

type HmacMd5 = Hmac<Md5>;

/// Parameter holding the computed signature. Never part of the signed input.
pub(crate) const SIGN_PARAM: &str = "sign";

/// Signature algorithm accepted by the gateway.
///
/// The wire value (`sign_method` parameter) is `hmac` or `md5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignMethod {
    /// HMAC-MD5 keyed with the access key secret.
    #[default]
    Hmac,
    /// MD5 over the parameter string wrapped in the secret on both sides.
    Md5,
}

impl SignMethod {
    /// Returns the value sent as `sign_method`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignMethod::Hmac => "hmac",
            SignMethod::Md5 => "md5",
        }
    }

    /// Signs `params` with `secret`, returning an uppercase hex digest.
    ///
    /// Any `sign` entry already present in `params` is ignored.
    pub fn sign(&self, params: &BTreeMap<String, String>, secret: &str) -> String {
        match self {
            SignMethod::Hmac => sign_hmac(params, secret),
            SignMethod::Md5 => sign_md5(params, secret),
        }
    }
}

impl fmt::Display for SignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignMethod {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hmac" => Ok(SignMethod::Hmac),
            "md5" => Ok(SignMethod::Md5),
            other => Err(SmsError::Config(format!(
                "unsupported sign method: {}",
                other
            ))),
        }
    }
}

/// Builds the signing input: `k1v1k2v2...` with keys in byte-wise ascending order.
///
/// `BTreeMap<String, _>` iterates in `Ord` order of `String`, which compares bytes,
/// so no locale rules apply.
pub(crate) fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    let capacity = params.iter().map(|(k, v)| k.len() + v.len()).sum();
    let mut joined = String::with_capacity(capacity);
    for (key, value) in params {
        if key == SIGN_PARAM {
            continue;
        }
        joined.push_str(key);
        joined.push_str(value);
    }
    joined
}

/// HMAC-MD5 over the joined parameters, keyed with the secret.
pub(crate) fn sign_hmac(params: &BTreeMap<String, String>, secret: &str) -> String {
    // HMAC pads or hashes the key to the block size, so any length is valid.
    let mut mac =
        HmacMd5::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign(params).as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

/// `MD5(secret + joined + secret)`.
pub(crate) fn sign_md5(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    hasher.update(string_to_sign(params).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode_upper(hasher.finalize())
}
