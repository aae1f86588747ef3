//! Scriptable upstream used to exercise the RESTful client over real HTTP.
//!
//! Every route is deterministic apart from the attempt counter, which lives
//! in the router's state so each `app()` starts from zero.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

/// Credentials accepted by `/basic`.
pub const BASIC_USER: &str = "admin";
pub const BASIC_PASSWORD: &str = "secret";

#[derive(Clone, Default)]
pub struct AppState {
    attempts: Arc<AtomicUsize>,
}

impl AppState {
    fn record_attempt(&self) -> usize {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// What `/inspect` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Inspection {
    pub method: String,
    pub content_type: Option<String>,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// A file part received by `/multipart`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub filename: Option<String>,
    pub content: String,
}

/// Everything `/multipart` received, in arrival order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

pub fn app() -> Router {
    Router::new()
        .route("/inspect", any(inspect))
        .route("/echo", post(echo).put(echo).patch(echo))
        .route("/form", post(form))
        .route("/multipart", post(multipart))
        .route("/flaky/{failures}", any(flaky))
        .route("/fail/json", any(fail_json))
        .route("/fail/text", any(fail_text))
        .route("/attempts", get(attempts))
        .route("/basic", get(basic))
        .route("/html", get(html))
        .route("/bad-json", get(bad_json))
        .route("/no-content-type", get(no_content_type))
        .route("/large/{bytes}", get(large))
        .layer(middleware::from_fn(log_request))
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock upstream serving");
    }
    axum::serve(listener, app()).await
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    info!(%method, %uri, status = response.status().as_u16(), "handled request");
    response
}

async fn inspect(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Json<Inspection> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Json(Inspection {
        method: method.to_string(),
        content_type,
        query,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn echo(Json(value): Json<Value>) -> Json<Value> {
    Json(value)
}

async fn form(Form(fields): Form<Vec<(String, String)>>) -> Json<Vec<(String, String)>> {
    Json(fields)
}

async fn multipart(mut multipart: Multipart) -> Result<Json<Upload>, (StatusCode, String)> {
    let mut upload = Upload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content = field
            .text()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        match filename {
            Some(filename) => upload.files.push(UploadedFile {
                name,
                filename: Some(filename),
                content,
            }),
            None => upload.fields.push((name, content)),
        }
    }
    Ok(Json(upload))
}

/// Fails with 500 for the first `failures` calls, then succeeds.
async fn flaky(State(state): State<AppState>, Path(failures): Path<usize>) -> (StatusCode, Json<Value>) {
    let attempt = state.record_attempt();
    if attempt <= failures {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "flaky", "attempt": attempt })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "attempt": attempt })))
    }
}

async fn fail_json(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    state.record_attempt();
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
}

async fn fail_text(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.record_attempt();
    (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance")
}

async fn attempts(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "attempts": state.attempts.load(Ordering::SeqCst) }))
}

async fn basic(headers: HeaderMap) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{BASIC_USER}:{BASIC_PASSWORD}"))
    );
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        Ok(Json(json!({ "user": BASIC_USER })))
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        ))
    }
}

async fn html() -> Html<&'static str> {
    Html("<h1>hello</h1>")
}

async fn bad_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "not json")
}

async fn no_content_type() -> StatusCode {
    StatusCode::OK
}

/// A JSON string of `bytes` letters, for exercising big response bodies.
async fn large(Path(bytes): Path<usize>) -> Json<Value> {
    Json(Value::String("x".repeat(bytes)))
}
