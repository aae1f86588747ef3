//! Request descriptions accepted by `RestClient`.
//!
//! # Design
//! The payload is a `Body` variant per content type, so a form body can never
//! be paired with a JSON content type. JSON payloads are converted to
//! `serde_json::Value` when attached; a value that cannot be represented as
//! JSON is rejected there, before the client is involved.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::RestError;
use crate::http::HttpMethod;

/// Encoding declared for a request or response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    FormUrlEncoded,
    MultipartFormData,
    TextHtml,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::MultipartFormData => "multipart/form-data",
            ContentType::TextHtml => "text/html",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = RestError;

    /// Parses a `Content-Type` value; parameters such as `charset` are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::http::media_type(s).as_deref() {
            Some("application/json") => Ok(ContentType::Json),
            Some("application/x-www-form-urlencoded") => Ok(ContentType::FormUrlEncoded),
            Some("multipart/form-data") => Ok(ContentType::MultipartFormData),
            Some("text/html") => Ok(ContentType::TextHtml),
            _ => Err(RestError::UnsupportedContentType(s.to_string())),
        }
    }
}

/// Ordered multimap of string fields. A key may appear several times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for `key`, keeping any existing values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Builder form of [`FormFields::append`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Request payload, tagged by the content type it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// `None` sends no body but still declares JSON.
    Json(Option<serde_json::Value>),
    Form(FormFields),
    /// `files` maps part names to paths read when the request is encoded.
    Multipart { fields: FormFields, files: FormFields },
    /// Sent verbatim.
    Html(String),
}

impl Body {
    pub fn content_type(&self) -> ContentType {
        match self {
            Body::Json(_) => ContentType::Json,
            Body::Form(_) => ContentType::FormUrlEncoded,
            Body::Multipart { .. } => ContentType::MultipartFormData,
            Body::Html(_) => ContentType::TextHtml,
        }
    }
}

/// A structured request relative to the client's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Attach a JSON payload.
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self, RestError> {
        let value = serde_json::to_value(payload).map_err(RestError::Serialization)?;
        Ok(self.body(Body::Json(Some(value))))
    }

    /// Declare JSON without sending a body.
    pub fn empty_json(self) -> Self {
        self.body(Body::Json(None))
    }

    pub fn form(self, fields: FormFields) -> Self {
        self.body(Body::Form(fields))
    }

    pub fn multipart(self, fields: FormFields, files: FormFields) -> Self {
        self.body(Body::Multipart { fields, files })
    }

    pub fn html(self, text: impl Into<String>) -> Self {
        self.body(Body::Html(text.into()))
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter merged into the URL on every attempt.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a header. `content-type` is always set from the body first.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.body.as_ref().map(Body::content_type)
    }
}

/// Credentials for HTTP Basic Authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A body-less request authenticated with Basic Auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuthRequest {
    pub method: HttpMethod,
    pub path: String,
    pub credentials: BasicAuth,
    pub headers: Vec<(String, String)>,
}

impl BasicAuthRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, credentials: BasicAuth) -> Self {
        Self {
            method,
            path: path.into(),
            credentials,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Successful outcome of a request: the final status and, when the response
/// was JSON, the decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    pub status: u16,
    pub body: Option<T>,
}
