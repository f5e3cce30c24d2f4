// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated principals.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(principal): Auth) -> impl IntoResponse {
//!     // principal is AuthenticatedPrincipal
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use super::{AuthError, AuthenticatedPrincipal, PrincipalClaims};
use crate::state::AuthConfig;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated principals.
///
/// ## Authentication Modes
///
/// - **Production mode** (`JWT_SECRET` set): HS256 signature, expiry and issuer checks
/// - **Development mode** (no secret, `dev` feature): structure validation only
/// - Without a secret and without the `dev` feature every token is rejected
pub struct Auth(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
    AuthConfig: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingBearer)?
            .to_str()
            .map_err(|_| AuthError::InvalidScheme)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?;

        let config = AuthConfig::from_ref(state);
        let principal = verify_jwt(token, &config)?;

        Ok(Auth(principal))
    }
}

fn verify_jwt(token: &str, config: &AuthConfig) -> Result<AuthenticatedPrincipal, AuthError> {
    match config.secret {
        Some(ref secret) => verify_jwt_production(token, secret, config.issuer.as_deref()),
        None => verify_jwt_development(token),
    }
}

fn verify_jwt_production(
    token: &str,
    secret: &str,
    issuer: Option<&str>,
) -> Result<AuthenticatedPrincipal, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_aud = false;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    let token_data = decode::<PrincipalClaims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::BadSignature,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::WrongIssuer,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            _ => AuthError::Malformed,
        }
    })?;

    Ok(AuthenticatedPrincipal::from_claims(token_data.claims))
}

/// Development JWT verification (no signature check).
#[cfg(any(test, feature = "dev"))]
fn verify_jwt_development(token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<PrincipalClaims>(token)
        .map_err(|_e| AuthError::Malformed)?;

    let claims = token_data.claims;

    let now = chrono::Utc::now().timestamp();
    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::Expired);
    }

    Ok(AuthenticatedPrincipal::from_claims(claims))
}

#[cfg(not(any(test, feature = "dev")))]
fn verify_jwt_development(_token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
    Err(AuthError::SecretNotConfigured)
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
    AuthConfig: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;

        if !principal.is_admin() {
            return Err(AuthError::Forbidden { needed: "admin" });
        }

        Ok(AdminOnly(principal))
    }
}

/// Extractor for read-only oversight endpoints (admin or auditor).
pub struct AuditAccess(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for AuditAccess
where
    S: Send + Sync,
    AuthConfig: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(principal) = Auth::from_request_parts(parts, state).await?;

        if !principal.role.can_audit() {
            return Err(AuthError::Forbidden {
                needed: "admin or auditor",
            });
        }

        Ok(AuditAccess(principal))
    }
}
