//! End-to-end registry scenarios driven through the HTTP router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use targetd_registry::{AuthToken, RegistryServer, SqliteStore, TransportConfig};
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt; // for `oneshot`

const TOKEN: &str = "integration-token";

fn router_for(path: &std::path::Path) -> Router {
    let store = SqliteStore::open_default(path).unwrap();
    RegistryServer::with_store(Arc::new(store), AuthToken::new(TOKEN), TransportConfig::default())
        .router()
}

fn fresh_router() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let router = router_for(&dir.path().join("targets.db"));
    (dir, router)
}

async fn call(app: &Router, method: &str, uri: &str, form: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", TOKEN);

    let body = match form {
        Some(form) => {
            builder = builder.header("content-type", "application/x-www-form-urlencoded");
            Body::from(form.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn list(app: &Router, kind: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, "GET", &format!("/list?kind={}", kind), None).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_register_list_unregister_scenario() {
    let (_dir, app) = fresh_router();

    let (status, body) = call(&app, "POST", "/register", Some("kind=host&key=h1&data=10.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    assert_eq!(list(&app, "host").await, (StatusCode::OK, json!({"h1": "10.0.0.1"})));

    let (status, body) = call(&app, "POST", "/unregister", Some("kind=host&key=h1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    assert_eq!(list(&app, "host").await, (StatusCode::OK, json!({})));
}

#[tokio::test]
async fn test_empty_kind_creates_nothing() {
    let (_dir, app) = fresh_router();

    let (status, _) = call(&app, "POST", "/register", Some("kind=&key=a&data=b")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Empty kind is rejected as input, never answered with an empty listing
    let (status, _) = list(&app, "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = list(&app, "a").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_kinds_do_not_share_keys() {
    let (_dir, app) = fresh_router();

    call(&app, "POST", "/register", Some("kind=a&key=x&data=alpha")).await;
    call(&app, "POST", "/register", Some("kind=b&key=x&data=beta")).await;

    assert_eq!(list(&app, "a").await, (StatusCode::OK, json!({"x": "alpha"})));
    assert_eq!(list(&app, "b").await, (StatusCode::OK, json!({"x": "beta"})));
}

#[tokio::test]
async fn test_overwrite_keeps_single_entry() {
    let (_dir, app) = fresh_router();

    for data in ["v1", "v2", "v3"] {
        let form = format!("kind=jobs&key=nightly&data={}", data);
        let (status, _) = call(&app, "POST", "/register", Some(&form)).await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(list(&app, "jobs").await, (StatusCode::OK, json!({"nightly": "v3"})));
}

#[tokio::test]
async fn test_unregister_twice_matches_once() {
    let (_dir, app) = fresh_router();

    call(&app, "POST", "/register", Some("kind=host&key=h1&data=10.0.0.1")).await;
    call(&app, "POST", "/register", Some("kind=host&key=h2&data=10.0.0.2")).await;

    let (status, _) = call(&app, "POST", "/unregister", Some("kind=host&key=h1")).await;
    assert_eq!(status, StatusCode::OK);
    let once = list(&app, "host").await;

    let (status, _) = call(&app, "POST", "/unregister", Some("kind=host&key=h1")).await;
    assert_eq!(status, StatusCode::OK);
    let twice = list(&app, "host").await;

    assert_eq!(once, twice);
    assert_eq!(twice.1, json!({"h2": "10.0.0.2"}));

    // A kind that never existed is also fine to unregister from
    let (status, _) = call(&app, "POST", "/unregister", Some("kind=ghost&key=g1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_url_encoded_payloads_round_trip() {
    let (_dir, app) = fresh_router();

    let (status, _) = call(
        &app,
        "POST",
        "/register",
        Some("kind=svc&key=api&data=%7B%22url%22%3A%22http%3A%2F%2Fa%3A80%22%7D"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        list(&app, "svc").await,
        (StatusCode::OK, json!({"api": "{\"url\":\"http://a:80\"}"}))
    );
}

#[tokio::test]
async fn test_concurrent_registers_are_all_kept() {
    let (_dir, app) = fresh_router();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let form = format!("kind=workers&key=w{}&data=node-{}", i, i);
                call(&app, "POST", "/register", Some(&form)).await.0
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let (status, listing) = list(&app, "workers").await;
    assert_eq!(status, StatusCode::OK);
    let listing = listing.as_object().unwrap();
    assert_eq!(listing.len(), 32);
    assert_eq!(listing["w17"], json!("node-17"));
}

#[tokio::test]
async fn test_registrations_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("targets.db");

    {
        let app = router_for(&path);
        call(&app, "POST", "/register", Some("kind=host&key=h1&data=10.0.0.1")).await;
        call(&app, "POST", "/register", Some("kind=empty&key=e1&data=x")).await;
        call(&app, "POST", "/unregister", Some("kind=empty&key=e1")).await;
    }

    let app = router_for(&path);
    assert_eq!(list(&app, "host").await, (StatusCode::OK, json!({"h1": "10.0.0.1"})));
    assert_eq!(list(&app, "empty").await, (StatusCode::OK, json!({})));
}
