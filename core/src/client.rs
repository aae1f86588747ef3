//! Retrying HTTP client for one upstream dependency.
//!
//! # Design
//! `RestClient` holds only a `base_url`, a retry bound, and a transport, and
//! carries no mutable state between calls. Each operation is split the same
//! way: a `build_*` method turns a description into an `HttpRequest`, the
//! retry loop runs it through the transport, and the final response is
//! decoded. Encoding happens once per call, so every encoding failure is
//! reported before the first network call.
//!
//! Attempts that fail with a status of 400 or above are discarded and the
//! request is re-sent immediately. Only the last attempt's failure reaches
//! the caller.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ureq::http::{HeaderName, HeaderValue};

use crate::config::ClientConfig;
use crate::decode::{decode_json, reason_phrase, upstream_error};
use crate::encode::{encode_body, resolve_url};
use crate::error::{ConfigError, RestError};
use crate::http::{media_type, HttpRequest, HttpResponse};
use crate::request::{BasicAuthRequest, Reply, Request};
use crate::transport::{Transport, UreqTransport};

/// Synchronous, stateless client with a bounded immediate-retry policy.
///
/// Safe to share between threads when the transport is; the default
/// `UreqTransport` opens a fresh connection for every attempt.
#[derive(Debug, Clone)]
pub struct RestClient<X = UreqTransport> {
    base_url: String,
    retry: u32,
    transport: X,
}

impl RestClient {
    /// `retry` is the maximum number of attempts per call. Zero is accepted
    /// here and reported by every operation.
    pub fn new(base_url: &str, retry: u32) -> Self {
        Self::with_transport(base_url, retry, UreqTransport)
    }

    /// Build a client from validated configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(&config.base_url, config.retry))
    }
}

impl<X: Transport> RestClient<X> {
    pub fn with_transport(base_url: &str, retry: u32, transport: X) -> Self {
        Self {
            base_url: base_url.to_string(),
            retry,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn build_request(&self, req: &Request) -> Result<HttpRequest, RestError> {
        let body = req.body.as_ref().ok_or(RestError::MissingContentType)?;
        let url = resolve_url(&self.base_url, &req.path, &req.query)?;
        check_headers(&req.headers)?;
        let encoded = encode_body(body)?;

        let mut headers = Vec::with_capacity(req.headers.len() + 1);
        headers.push(("content-type".to_string(), encoded.content_type));
        headers.extend(req.headers.iter().cloned());

        Ok(HttpRequest {
            method: req.method,
            url,
            headers,
            body: encoded.bytes,
        })
    }

    pub fn build_basic_auth_request(&self, req: &BasicAuthRequest) -> Result<HttpRequest, RestError> {
        let credentials = &req.credentials;
        if credentials.username.is_empty() {
            return Err(RestError::MissingUsername);
        }
        if credentials.password.is_empty() {
            return Err(RestError::MissingPassword);
        }

        let url = resolve_url(&self.base_url, &req.path, &[])?;
        check_headers(&req.headers)?;
        let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));

        let mut headers: Vec<(String, String)> = req
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
            .cloned()
            .collect();
        headers.push(("authorization".to_string(), format!("Basic {token}")));

        Ok(HttpRequest {
            method: req.method,
            url,
            headers,
            body: None,
        })
    }

    /// Send `req` and decode a JSON response into `T`.
    ///
    /// `Reply::body` is `None` when the response was not JSON.
    pub fn request<T: DeserializeOwned>(&self, req: &Request) -> Result<Reply<T>, RestError> {
        let (response, media_type) = self.run(req)?;
        let body = decode_json(&response, media_type.as_deref())?;
        Ok(Reply {
            status: response.status,
            body,
        })
    }

    /// Send `req` and return the final status, ignoring the response body.
    pub fn send(&self, req: &Request) -> Result<u16, RestError> {
        self.run(req).map(|(response, _)| response.status)
    }

    /// Send a body-less request authenticated with Basic Auth and decode a
    /// JSON response into `T`.
    pub fn request_basic_auth<T: DeserializeOwned>(
        &self,
        req: &BasicAuthRequest,
    ) -> Result<Reply<T>, RestError> {
        let (response, media_type) = self.run_basic_auth(req)?;
        let body = decode_json(&response, Some(media_type.as_str()))?;
        Ok(Reply {
            status: response.status,
            body,
        })
    }

    pub fn send_basic_auth(&self, req: &BasicAuthRequest) -> Result<u16, RestError> {
        self.run_basic_auth(req).map(|(response, _)| response.status)
    }

    fn run(&self, req: &Request) -> Result<(HttpResponse, Option<String>), RestError> {
        self.check_retry_bound()?;
        let request = self.build_request(req)?;
        let response = self.execute_with_retry(&request, |response| {
            upstream_error(response, response.media_type().as_deref())
        })?;
        let media_type = response.media_type();
        Ok((response, media_type))
    }

    /// Unlike `run`, a response without a parseable `content-type` is an error.
    fn run_basic_auth(&self, req: &BasicAuthRequest) -> Result<(HttpResponse, String), RestError> {
        self.check_retry_bound()?;
        let request = self.build_basic_auth_request(req)?;
        let response = self.execute_with_retry(&request, |response| RestError::Upstream {
            status: response.status,
            message: reason_phrase(response.status).to_string(),
        })?;

        let value = response.header("content-type").unwrap_or_default();
        match media_type(value) {
            Some(media_type) => Ok((response, media_type)),
            None => Err(RestError::InvalidMediaType {
                status: response.status,
                value: value.to_string(),
            }),
        }
    }

    fn check_retry_bound(&self) -> Result<(), RestError> {
        if self.retry == 0 {
            return Err(RestError::InvalidRetryBound);
        }
        Ok(())
    }

    /// Send `request` up to `retry` times, stopping at the first response
    /// below 400. `exhausted` builds the error for a failing final attempt.
    fn execute_with_retry<F>(&self, request: &HttpRequest, exhausted: F) -> Result<HttpResponse, RestError>
    where
        F: Fn(&HttpResponse) -> RestError,
    {
        for attempt in 1..=self.retry {
            debug!(attempt, method = %request.method, url = %request.url, "Sending request");
            let response = self.transport.execute(request)?;

            if response.status < 400 {
                debug!(attempt, status = response.status, "Request completed");
                return Ok(response);
            }

            if attempt == self.retry {
                debug!(attempt, status = response.status, "Request failed, attempts exhausted");
                return Err(exhausted(&response));
            }

            warn!(
                attempt,
                max_attempts = self.retry,
                status = response.status,
                url = %request.url,
                "Request failed, retrying"
            );
        }
        Err(RestError::InvalidRetryBound)
    }
}

/// Reject caller headers that could never be put on the wire.
fn check_headers(headers: &[(String, String)]) -> Result<(), RestError> {
    for (name, value) in headers {
        let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            return Err(RestError::InvalidHeader { name: name.clone() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde::Deserialize;

    use super::*;
    use crate::error::TransportError;
    use crate::http::HttpMethod;
    use crate::request::{BasicAuth, FormFields};

    /// Replays canned results and records every request it is given.
    #[derive(Default)]
    struct ScriptedTransport {
        results: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(results: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<HttpRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(request.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left")
        }
    }

    fn json(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        })
    }

    fn plain(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
        })
    }

    fn client(transport: &ScriptedTransport, retry: u32) -> RestClient<&ScriptedTransport> {
        RestClient::with_transport("http://upstream.test", retry, transport)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn zero_retry_is_rejected_without_network_calls() {
        let transport = ScriptedTransport::default();
        let c = client(&transport, 0);

        let err = c.send(&Request::get("/users").empty_json()).unwrap_err();
        assert!(matches!(err, RestError::InvalidRetryBound));
        assert_eq!(err.to_string(), "retry need to setup greater than 0");

        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("a", "b"));
        let err = c.send_basic_auth(&req).unwrap_err();
        assert!(matches!(err, RestError::InvalidRetryBound));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn zero_retry_wins_over_encoding_errors() {
        let transport = ScriptedTransport::default();
        let req = Request::post("/upload")
            .multipart(FormFields::new(), FormFields::new().with("f", "/no/such/file"));
        let err = client(&transport, 0).send(&req).unwrap_err();
        assert!(matches!(err, RestError::InvalidRetryBound));
    }

    #[test]
    fn missing_body_is_a_configuration_error() {
        let transport = ScriptedTransport::default();
        let err = client(&transport, 3).send(&Request::get("/users")).unwrap_err();
        assert!(matches!(err, RestError::MissingContentType));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn decodes_json_response_on_first_success() {
        let transport = ScriptedTransport::new(vec![json(200, r#"{"id":1,"name":"Ada"}"#)]);
        let reply: Reply<User> = client(&transport, 3)
            .request(&Request::get("/users/1").empty_json())
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.body,
            Some(User {
                id: 1,
                name: "Ada".to_string()
            })
        );
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn retries_until_success() {
        let transport = ScriptedTransport::new(vec![
            json(500, r#"{"error":"first"}"#),
            plain(502, "bad gateway"),
            json(200, r#"{"id":2,"name":"Grace"}"#),
        ]);
        let reply: Reply<User> = client(&transport, 3)
            .request(&Request::get("/users/2").empty_json())
            .unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body.unwrap().name, "Grace");
        assert_eq!(transport.calls().len(), 3);
    }

    #[test]
    fn client_errors_are_retried_like_server_errors() {
        let transport = ScriptedTransport::new(vec![plain(404, "missing"), plain(204, "")]);
        let status = client(&transport, 2)
            .send(&Request::delete("/users/9").empty_json())
            .unwrap();
        assert_eq!(status, 204);
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn exhausted_retries_report_last_json_body() {
        let transport = ScriptedTransport::new(vec![
            json(500, r#"{"error":"first"}"#),
            json(503, r#"{"error":"last"}"#),
        ]);
        let err = client(&transport, 2)
            .request::<User>(&Request::get("/users").empty_json())
            .unwrap_err();

        assert_eq!(err.status_code(), Some(503));
        assert_eq!(
            err.to_string(),
            r#"Status code: 503 / Service Unavailable, Response: {"error":"last"}"#
        );
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn exhausted_retries_omit_non_json_body() {
        let transport = ScriptedTransport::new(vec![plain(500, "stack trace")]);
        let err = client(&transport, 1)
            .send(&Request::get("/").empty_json())
            .unwrap_err();
        assert_eq!(err.to_string(), "Status code: 500 / Internal Server Error");
    }

    #[test]
    fn transport_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::new("connection refused"))]);
        let err = client(&transport, 5)
            .send(&Request::get("/").empty_json())
            .unwrap_err();
        assert!(matches!(err, RestError::Transport(_)));
        assert_eq!(err.status_code(), None);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn decode_errors_are_not_retried() {
        let transport = ScriptedTransport::new(vec![json(200, "not json")]);
        let err = client(&transport, 3)
            .request::<User>(&Request::get("/users/1").empty_json())
            .unwrap_err();
        assert!(matches!(err, RestError::Deserialization { status: 200, .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn non_json_success_yields_no_body() {
        let transport = ScriptedTransport::new(vec![plain(200, "ok")]);
        let reply: Reply<User> = client(&transport, 1)
            .request(&Request::get("/health").empty_json())
            .unwrap();
        assert_eq!(reply.status, 200);
        assert!(reply.body.is_none());
    }

    #[test]
    fn missing_attachment_fails_before_sending() {
        let transport = ScriptedTransport::default();
        let req = Request::post("/upload").multipart(
            FormFields::new().with("title", "x"),
            FormFields::new().with("file", "/no/such/file.txt"),
        );
        let err = client(&transport, 3).send(&req).unwrap_err();
        assert!(matches!(err, RestError::Attachment { .. }));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn build_request_sets_content_type_before_caller_headers() {
        let transport = ScriptedTransport::default();
        let req = Request::post("/search")
            .query("q", "rust lang")
            .header("X-Trace", "abc")
            .header("Content-Type", "text/plain")
            .json(&serde_json::json!({"limit": 5}))
            .unwrap();
        let http = client(&transport, 1).build_request(&req).unwrap();

        assert_eq!(http.method, HttpMethod::Post);
        assert_eq!(http.url, "http://upstream.test/search?q=rust+lang");
        assert_eq!(
            http.headers,
            vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("X-Trace".to_string(), "abc".to_string()),
                ("Content-Type".to_string(), "text/plain".to_string()),
            ]
        );
        assert_eq!(http.header("content-type"), Some("application/json"));
        assert_eq!(http.body.as_deref(), Some(&br#"{"limit":5}"#[..]));
    }

    #[test]
    fn invalid_caller_header_is_a_configuration_error() {
        let transport = ScriptedTransport::default();
        let c = client(&transport, 3);

        let req = Request::get("/users").header("X-Trace", "line\nbreak").empty_json();
        let err = c.send(&req).unwrap_err();
        assert!(matches!(err, RestError::InvalidHeader { ref name } if name == "X-Trace"));
        assert_eq!(err.status_code(), None);

        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("a", "b"))
            .header("bad header", "x");
        let err = c.send_basic_auth(&req).unwrap_err();
        assert!(matches!(err, RestError::InvalidHeader { ref name } if name == "bad header"));

        assert!(transport.calls().is_empty());
    }

    #[test]
    fn every_attempt_resends_the_same_request() {
        let transport = ScriptedTransport::new(vec![plain(500, ""), plain(200, "")]);
        let req = Request::post("/items")
            .query("page", "1")
            .form(FormFields::new().with("name", "widget"));
        client(&transport, 2).send(&req).unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[0].url, "http://upstream.test/items?page=1");
        assert_eq!(calls[0].body.as_deref(), Some(&b"name=widget"[..]));
    }

    #[test]
    fn basic_auth_requires_username_then_password() {
        let transport = ScriptedTransport::default();
        let c = client(&transport, 2);

        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("", "pw"));
        let err = c.send_basic_auth(&req).unwrap_err();
        assert_eq!(err.to_string(), "username must be filled");

        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("alice", ""));
        let err = c.send_basic_auth(&req).unwrap_err();
        assert_eq!(err.to_string(), "password must be filled");

        assert!(transport.calls().is_empty());
    }

    #[test]
    fn basic_auth_sets_authorization_header() {
        let transport = ScriptedTransport::new(vec![json(200, r#"{"id":3,"name":"alice"}"#)]);
        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("alice", "secret"))
            .header("Authorization", "Bearer stale")
            .header("X-Client", "tests");
        let reply: Reply<User> = client(&transport, 1).request_basic_auth(&req).unwrap();
        assert_eq!(reply.body.unwrap().id, 3);

        let calls = transport.calls();
        assert_eq!(calls[0].url, "http://upstream.test/login");
        assert_eq!(calls[0].header("authorization"), Some("Basic YWxpY2U6c2VjcmV0"));
        assert_eq!(calls[0].header("x-client"), Some("tests"));
        assert!(calls[0].body.is_none());
    }

    #[test]
    fn basic_auth_exhaustion_reports_reason_phrase() {
        let transport = ScriptedTransport::new(vec![json(401, r#"{"error":"nope"}"#), json(401, "{}")]);
        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("a", "b"));
        let err = client(&transport, 2).send_basic_auth(&req).unwrap_err();
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn basic_auth_requires_a_media_type_on_success() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        })]);
        let req = BasicAuthRequest::new(HttpMethod::Get, "/login", BasicAuth::new("a", "b"));
        let err = client(&transport, 1).send_basic_auth(&req).unwrap_err();
        assert!(matches!(err, RestError::InvalidMediaType { status: 200, .. }));
    }

    #[test]
    fn structured_request_tolerates_missing_media_type() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        })]);
        let reply: Reply<User> = client(&transport, 1)
            .request(&Request::get("/").empty_json())
            .unwrap();
        assert!(reply.body.is_none());
    }

    #[test]
    fn client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RestClient>();
    }

    #[test]
    fn from_config_validates() {
        let err = RestClient::from_config(&ClientConfig::new("http://localhost", 0)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRetry));

        let c = RestClient::from_config(&ClientConfig::new("http://localhost", 4)).unwrap();
        assert_eq!(c.base_url(), "http://localhost");
        assert_eq!(c.retry(), 4);
    }
}
