//! Synchronous, retrying HTTP request client.
//!
//! # Overview
//! `RestClient` sends requests relative to a base URL, encodes the payload
//! according to its declared content type (JSON, URL-encoded form,
//! multipart with file attachments, or HTML text), retries failed attempts
//! up to a fixed bound, and decodes JSON responses into a caller-chosen type.
//! A sibling operation sends body-less requests with HTTP Basic Auth.
//!
//! # Design
//! - `RestClient` is stateless: a base URL, a retry bound, and a transport.
//! - Requests are described as data (`Request`, `BasicAuthRequest`), turned
//!   into plain `HttpRequest` values, and executed through the `Transport`
//!   trait. `UreqTransport` is the production implementation; tests swap in
//!   their own.
//! - Statuses of 400 and above are retried immediately with no backoff.
//!   Transport, encoding, and decoding failures end the call at once.
//!
//! ```no_run
//! use restful_core::{Reply, Request, RestClient};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! let client = RestClient::new("https://api.example.com", 3);
//! let reply: Reply<User> = client.request(&Request::get("/users/1").empty_json())?;
//! println!("{} {:?}", reply.status, reply.body.map(|u| u.name));
//! # Ok::<(), restful_core::RestError>(())
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod http;
pub mod request;
pub mod transport;

pub use client::RestClient;
pub use config::ClientConfig;
pub use decode::{decode_json, reason_phrase, upstream_error};
pub use encode::{encode_body, encode_form, encode_multipart, resolve_url, EncodedBody};
pub use error::{ConfigError, RestError, TransportError};
pub use http::{media_type, HttpMethod, HttpRequest, HttpResponse};
pub use request::{BasicAuth, BasicAuthRequest, Body, ContentType, FormFields, Reply, Request};
pub use transport::{Transport, UreqTransport};
