//! HTTP API handlers using axum.
//!
//! # Rust Learning Note
//!
//! ## Routes
//!
//! ```text
//! /register    kind, key, data   -> 200 (empty body)
//! /unregister  kind, key         -> 200 (empty body)
//! /list        kind              -> 200 {"key": "payload", ...}
//! /health                        -> 200 "OK" (no token needed)
//! ```
//!
//! The registry routes accept any method. Their fields come from the query
//! string and, for form-encoded requests, from the body; a field present in
//! the body wins over the same field in the query.
//!
//! ## Blocking store calls
//!
//! The store does synchronous SQLite I/O, so each handler hands its service
//! call to `tokio::task::spawn_blocking`. Every request gets its own blocking
//! worker and the async runtime threads stay free.

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use targetd_common::{Error, Kind, Payload, TargetKey};
use tracing::{error, info, warn};

use crate::{
    auth::{require_token, AuthToken},
    service::RegistryService,
};

/// Creates the API router.
pub fn create_router(service: RegistryService, token: AuthToken) -> Router {
    let registry = Router::new()
        .route("/register", any(register_handler))
        .route("/unregister", any(unregister_handler))
        .route("/list", any(list_handler))
        .route_layer(middleware::from_fn_with_state(token, require_token))
        .with_state(service);

    Router::new()
        .route("/health", get(health_handler))
        .merge(registry)
        .layer(middleware::from_fn(log_request))
}

/// Fields a registry request may carry.
///
/// A repeated field keeps its first value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TargetParams {
    pub kind: Option<String>,
    pub key: Option<String>,
    pub data: Option<String>,
}

impl TargetParams {
    /// Collects the known fields from decoded `name=value` pairs.
    fn from_pairs(pairs: Vec<(String, String)>) -> TargetParams {
        let mut params = TargetParams::default();
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "kind" => &mut params.kind,
                "key" => &mut params.key,
                "data" => &mut params.data,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }

    /// Fills fields missing here from `fallback`.
    fn or(self, fallback: TargetParams) -> TargetParams {
        TargetParams {
            kind: self.kind.or(fallback.kind),
            key: self.key.or(fallback.key),
            data: self.data.or(fallback.data),
        }
    }

    fn kind(&self) -> Kind {
        Kind::from(self.kind.clone().unwrap_or_default())
    }

    fn key(&self) -> TargetKey {
        TargetKey::from(self.key.clone().unwrap_or_default())
    }

    fn payload(&self) -> Payload {
        Payload::from(self.data.clone().unwrap_or_default())
    }
}

impl<S> FromRequest<S> for TargetParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(req.uri())
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let query = TargetParams::from_pairs(query);

        if !has_form_body(&req) {
            return Ok(query);
        }

        let Form(body) = Form::<Vec<(String, String)>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        Ok(TargetParams::from_pairs(body).or(query))
    }
}

fn has_form_body(req: &Request) -> bool {
    if matches!(*req.method(), Method::GET | Method::HEAD) {
        return false;
    }

    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Registers (or overwrites) a target.
async fn register_handler(
    State(service): State<RegistryService>,
    params: TargetParams,
) -> Result<StatusCode, ApiError> {
    let (kind, key, payload) = (params.kind(), params.key(), params.payload());

    run_blocking(move || service.register(&kind, &key, &payload)).await?;

    Ok(StatusCode::OK)
}

/// Removes a target. Removing an unknown target succeeds.
async fn unregister_handler(
    State(service): State<RegistryService>,
    params: TargetParams,
) -> Result<StatusCode, ApiError> {
    let (kind, key) = (params.kind(), params.key());

    run_blocking(move || service.unregister(&kind, &key)).await?;

    Ok(StatusCode::OK)
}

/// Lists every target of a kind as a flat JSON object.
async fn list_handler(
    State(service): State<RegistryService>,
    params: TargetParams,
) -> Result<Json<Value>, ApiError> {
    let kind = params.kind();

    let listing = run_blocking(move || service.list(&kind)).await?;

    Ok(Json(Value::Object(listing.to_json())))
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

/// Runs a blocking service call on tokio's blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> targetd_common::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Request worker failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Request logging middleware
async fn log_request(request: Request, next: axum::middleware::Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        warn!("{} {} {} ({:?})", method, path, status, start.elapsed());
    } else {
        info!("{} {} {} ({:?})", method, path, status, start.elapsed());
    }

    response
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err.root() {
            Error::InvalidInput { .. } => ApiError::BadRequest(message),
            Error::UnknownNamespace { .. } | Error::NamespaceNotFound { .. } => {
                ApiError::NotFound(message)
            }
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("API error: {} - {}", status, message);
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
