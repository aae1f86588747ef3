//! Request encoding: URL resolution and body serialization per content type.
//!
//! # Design
//! Everything here is pure except multipart attachments, which are read from
//! disk while the body is assembled. Each file handle lives only inside
//! `write_file_part`, so it is closed before the request is handed to a
//! transport, including when a later attachment fails to open.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use url::Url;

use crate::error::RestError;
use crate::request::{Body, ContentType, FormFields};

/// A body ready to be sent, with the `Content-Type` value announcing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub content_type: String,
    pub bytes: Option<Vec<u8>>,
}

/// Join `base_url` and `path` literally, then append `query` to whatever
/// query string the result already has.
pub fn resolve_url(
    base_url: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<String, RestError> {
    let raw = format!("{base_url}{path}");
    let mut url = Url::parse(&raw).map_err(|source| RestError::InvalidUrl {
        url: raw.clone(),
        source,
    })?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.into())
}

/// Serialize `body` for the wire.
pub fn encode_body(body: &Body) -> Result<EncodedBody, RestError> {
    match body {
        Body::Json(payload) => {
            let bytes = payload
                .as_ref()
                .map(serde_json::to_vec)
                .transpose()
                .map_err(RestError::Serialization)?;
            Ok(EncodedBody {
                content_type: ContentType::Json.as_str().to_string(),
                bytes,
            })
        }
        Body::Form(fields) => Ok(EncodedBody {
            content_type: ContentType::FormUrlEncoded.as_str().to_string(),
            bytes: Some(encode_form(fields).into_bytes()),
        }),
        Body::Multipart { fields, files } => {
            if fields.is_empty() && files.is_empty() {
                return Err(RestError::MissingPayload);
            }
            let boundary = uuid::Uuid::new_v4().simple().to_string();
            let bytes = encode_multipart(&boundary, fields, files)?;
            Ok(EncodedBody {
                content_type: format!("{}; boundary={boundary}", ContentType::MultipartFormData),
                bytes: Some(bytes),
            })
        }
        Body::Html(text) => Ok(EncodedBody {
            content_type: ContentType::TextHtml.as_str().to_string(),
            bytes: Some(text.as_bytes().to_vec()),
        }),
    }
}

/// `application/x-www-form-urlencoded` serialization, in field order.
pub fn encode_form(fields: &FormFields) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields.iter() {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Build a `multipart/form-data` body: text fields first, then one file part
/// per attachment path.
pub fn encode_multipart(
    boundary: &str,
    fields: &FormFields,
    files: &FormFields,
) -> Result<Vec<u8>, RestError> {
    let mut out = Vec::new();

    for (name, value) in fields.iter() {
        let part = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
            escape_quotes(name)
        );
        out.extend_from_slice(part.as_bytes());
    }

    for (name, path) in files.iter() {
        write_file_part(&mut out, boundary, name, Path::new(path)).map_err(|source| {
            RestError::Attachment {
                path: path.into(),
                source,
            }
        })?;
    }

    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok(out)
}

fn write_file_part(out: &mut Vec<u8>, boundary: &str, name: &str, path: &Path) -> io::Result<()> {
    let mut file = File::open(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    write!(
        out,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        escape_quotes(name),
        escape_quotes(&filename)
    )?;
    io::copy(&mut file, out)?;
    out.extend_from_slice(b"\r\n");
    Ok(())
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
