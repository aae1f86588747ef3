//! Error types for the RESTful client.
//!
//! # Design
//! Only `Upstream` is produced by a failure that a later attempt could fix;
//! every other variant ends the call on the attempt that raised it. Errors
//! raised after a response arrived carry its status code so callers keep the
//! `(status, error)` pair without a second return value.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by `RestClient` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestError {
    /// The client was built with a retry bound of zero.
    #[error("retry need to setup greater than 0")]
    InvalidRetryBound,

    /// The request carries no body, so no content type was chosen.
    #[error("you must choose the content type")]
    MissingContentType,

    /// A multipart request with neither fields nor files.
    #[error("payload is empty")]
    MissingPayload,

    /// A content type string outside the supported set.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// An HTTP method string outside the supported set.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("username must be filled")]
    MissingUsername,

    #[error("password must be filled")]
    MissingPassword,

    /// A caller header name or value that is not valid HTTP.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// `base_url + path` is not a valid absolute URL.
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The JSON payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A multipart attachment could not be opened or read.
    #[error("attachment {}: {source}", .path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The transport failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The final attempt returned a status code of 400 or above.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// The response `content-type` header is missing or malformed.
    #[error("invalid media type {value:?}")]
    InvalidMediaType { status: u16, value: String },

    /// A JSON response could not be decoded into the requested type.
    #[error("deserialization failed: {source}")]
    Deserialization {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
}

impl RestError {
    /// Status code of the response that produced this error, if one arrived.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RestError::Upstream { status, .. }
            | RestError::InvalidMediaType { status, .. }
            | RestError::Deserialization { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could have produced a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RestError::Upstream { .. })
    }
}

/// Connection-level failure reported by a `Transport`.
#[derive(Debug, Error)]
#[error("transport failed: {message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Invalid `ClientConfig` values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("base_url must be filled")]
    MissingBaseUrl,

    #[error("base_url {url:?} is not a valid URL: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("retry must be greater than 0")]
    InvalidRetry,
}
