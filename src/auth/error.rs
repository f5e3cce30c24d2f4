// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer-token rejections.
//!
//! Rejections share the `{"error": ..}` body of [`crate::error::ApiError`]
//! plus a stable `error_code`, and 401s carry `WWW-Authenticate: Bearer`.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingBearer,
    /// Header present but not `Bearer <token>`.
    InvalidScheme,
    Malformed,
    BadSignature,
    Expired,
    WrongIssuer,
    NotYetValid,
    /// No `JWT_SECRET` and no development decoding compiled in.
    SecretNotConfigured,
    /// Authenticated, but the role lacks the capability.
    Forbidden { needed: &'static str },
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingBearer => "missing_bearer",
            AuthError::InvalidScheme => "invalid_scheme",
            AuthError::Malformed => "malformed_token",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "token_expired",
            AuthError::WrongIssuer => "wrong_issuer",
            AuthError::NotYetValid => "token_not_yet_valid",
            AuthError::SecretNotConfigured => "auth_not_configured",
            AuthError::Forbidden { .. } => "forbidden",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::SecretNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingBearer => f.write_str("bearer token required"),
            AuthError::InvalidScheme => {
                f.write_str("authorization header must be 'Bearer <token>'")
            }
            AuthError::Malformed => f.write_str("bearer token is malformed"),
            AuthError::BadSignature => f.write_str("bearer token signature does not verify"),
            AuthError::Expired => f.write_str("bearer token has expired"),
            AuthError::WrongIssuer => f.write_str("bearer token issuer is not accepted"),
            AuthError::NotYetValid => f.write_str("bearer token is not valid yet"),
            AuthError::SecretNotConfigured => {
                f.write_str("token verification is not configured on this deployment")
            }
            AuthError::Forbidden { needed } => write!(f, "{needed} role required"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "error_code": self.error_code(),
        }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
