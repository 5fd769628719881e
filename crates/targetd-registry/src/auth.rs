//! Shared-token authorization for registry requests.
//!
//! Every registry route sits behind [`require_token`]. A request passes only
//! when its `Authorization` header is present, non-empty and exactly equal to
//! the configured token; anything else gets a 401 before the handler (and its
//! body parsing) runs. An empty configured token therefore rejects everything.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::api::ApiError;

/// The configured shared secret.
#[derive(Clone)]
pub struct AuthToken(Arc<str>);

impl AuthToken {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(Arc::from(token.as_ref()))
    }

    /// Returns true when `provided` is present, non-empty and matches exactly.
    pub fn authorize(&self, provided: Option<&str>) -> bool {
        match provided {
            Some(value) if !value.is_empty() => value == &*self.0,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Middleware rejecting requests without the configured token.
pub async fn require_token(
    State(token): State<AuthToken>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !token.authorize(provided) {
        warn!(
            "Could not authorize {} request (Authorization header is required)",
            request.uri().path()
        );
        return ApiError::Unauthorized("Authorization header is missing or invalid".to_string())
            .into_response();
    }

    next.run(request).await
}
