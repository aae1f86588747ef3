//! Response inspection: content negotiation, JSON decoding, and the
//! diagnostics attached to upstream failures.

use serde::de::DeserializeOwned;

use crate::error::RestError;
use crate::http::HttpResponse;
use crate::request::ContentType;

/// Decode a JSON response into `T`. Non-JSON responses yield `None`.
pub fn decode_json<T: DeserializeOwned>(
    response: &HttpResponse,
    media_type: Option<&str>,
) -> Result<Option<T>, RestError> {
    if media_type != Some(ContentType::Json.as_str()) {
        return Ok(None);
    }
    serde_json::from_slice(&response.body)
        .map(Some)
        .map_err(|source| RestError::Deserialization {
            status: response.status,
            source,
        })
}

/// Canonical reason phrase for `status`, empty when unknown.
pub fn reason_phrase(status: u16) -> &'static str {
    ureq::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Error for a failed final attempt. JSON error bodies are appended verbatim.
pub fn upstream_error(response: &HttpResponse, media_type: Option<&str>) -> RestError {
    let mut message = format!(
        "Status code: {} / {}",
        response.status,
        reason_phrase(response.status)
    );
    if media_type == Some(ContentType::Json.as_str()) {
        message.push_str(", Response: ");
        message.push_str(&response.text());
    }
    RestError::Upstream {
        status: response.status,
        message,
    }
}
