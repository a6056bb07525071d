//! Shared helpers for gradebook-web integration tests
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use gradebook_common::db::init_database;
use gradebook_web::{build_router, AppState};
use serde_json::Value;
use tower::util::ServiceExt; // for `oneshot` method

/// Create a router backed by a fresh database in a temp directory.
/// The TempDir must be kept alive for the duration of the test.
pub async fn setup_app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("gradebook.db"))
        .await
        .expect("Should initialize test database");
    (dir, build_router(AppState::new(pool)))
}

/// Build a request, optionally with a session cookie and a JSON body
pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Build a CSV upload request for the import endpoint
pub fn csv_request(cookie: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/import");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from(body))
        .unwrap()
}

/// Extract the response body as JSON
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// Extract the raw response body
pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

/// Log in as the default admin and return the session cookie
/// (name=value pair, ready for a Cookie header)
pub async fn login_admin(app: &Router) -> String {
    let request = json_request(
        "POST",
        "/api/auth/login",
        None,
        Some(serde_json::json!({ "username": "admin", "password": "admin" })),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK, "admin login should succeed");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap();
    set_cookie
        .split(';')
        .next()
        .expect("cookie should have a name=value part")
        .to_string()
}
