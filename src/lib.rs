//! Alibaba Aliqin SMS SDK for Rust.
//!
//! This crate provides both async and sync (blocking) clients for the
//! Aliqin SMS API served by the Taobao Open Platform router:
//!
//! - [`Client::send_message`] — Send a templated SMS (`alibaba.aliqin.fc.sms.num.send`)
//! - [`Client::query_message`] — Query delivery records (`alibaba.aliqin.fc.sms.num.query`)
//!
//! Requests are signed with HMAC-MD5 or the secret-wrapped MD5 scheme,
//! selected by [`SignMethod`].
//!
//! # Quick Start (async)
//!
//! ```no_run
//! use rs_ali_sms::{Client, Credential, SendMessageRequest, SmsError};
//!
//! # async fn example() -> rs_ali_sms::Result<()> {
//! let client = Client::new(Credential::new("your-app-key", "your-app-secret"))?;
//!
//! let request = SendMessageRequest::new(["13800000000", "13900000000"], "MyShop", "SMS_585014")
//!     .param("code", "123456");
//!
//! match client.send_message(request).await {
//!     Ok(resp) => println!("biz id: {:?}", resp.send_result().and_then(|r| r.model)),
//!     Err(SmsError::Api(err)) => println!("rejected: {}", err),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod request;
pub mod response;
pub mod sign;

#[cfg(feature = "blocking")]
pub mod blocking;

mod exec;

pub use client::{Client, QueryMessageRequest, SendMessageRequest};
pub use config::{ClientConfig, ClientOptions, ResponseFormat};
pub use credential::Credential;
pub use error::{Result, SmsError};
pub use request::{HttpMethod, Request};
pub use response::{ApiResponse, ErrorResponse, QueryResult, SendResult, SmsRecord};
pub use sign::SignMethod;

// Compile-time assertions: key types must be Send + Sync for use across threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<Client>;
    let _ = assert_send_sync::<SmsError>;
    let _ = assert_send_sync::<Credential>;
};
