//! HTTP Basic authentication middleware
//!
//! Every request has to carry the configured credentials. There are no
//! sessions: each request is checked on its own.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use subtle::ConstantTimeEq;

use crate::config::Credentials;
use crate::state::AppState;

/// Challenge sent with every 401 response.
pub const WWW_AUTHENTICATE: &str = r#"Basic realm="Restricted", charset="UTF-8""#;

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    NotBasic,
    BadEncoding,
    WrongCredentials,
}

/// Check an `Authorization` header value against the credentials.
///
/// The decoded payload is compared in constant time.
pub fn check_basic_auth(
    credentials: &Credentials,
    authorization: Option<&HeaderValue>,
) -> Result<(), AuthFailure> {
    let authorization = authorization.ok_or(AuthFailure::MissingHeader)?;
    let encoded = authorization
        .as_bytes()
        .strip_prefix(b"Basic ")
        .ok_or(AuthFailure::NotBasic)?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| AuthFailure::BadEncoding)?;

    let expected = credentials.basic_auth_payload();
    if bool::from(decoded.as_slice().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(AuthFailure::WrongCredentials)
    }
}

/// Basic auth middleware
pub async fn basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorization = request.headers().get(header::AUTHORIZATION);
    match check_basic_auth(&state.config.credentials, authorization) {
        Ok(()) => next.run(request).await,
        Err(failure) => {
            tracing::debug!(
                "Rejected {} {}: {:?}",
                request.method(),
                request.uri().path(),
                failure
            );
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, WWW_AUTHENTICATE)],
        "Unauthorized\n",
    )
        .into_response()
}
