// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated principal representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Claims carried by bearer tokens issued to client frontends and operators.
#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalClaims {
    /// Subject (principal ID), the identity recorded as vault owner
    pub sub: String,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,

    /// Issuer
    #[serde(default)]
    pub iss: String,

    /// Role name (`admin`, `client`, `auditor`, `custodian`)
    #[serde(default)]
    pub role: Option<String>,
}

/// Authenticated principal extracted from a JWT.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedPrincipal {
    /// Canonical principal ID (`sub` claim)
    pub principal_id: String,

    /// Principal's role
    pub role: Role,

    /// Original issuer (used for validation, not serialized)
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedPrincipal {
    pub fn from_claims(claims: PrincipalClaims) -> Self {
        let role = claims
            .role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default();

        Self {
            principal_id: claims.sub,
            role,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }

    /// Principal with the given role, bypassing token decoding.
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            role,
            issuer: String::new(),
            expires_at: 0,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Whether this principal may act for `principal_id` in an owner
    /// decryption context.
    pub fn may_speak_for(&self, principal_id: &str) -> bool {
        self.principal_id == principal_id || self.role.can_relay_owner_contexts()
    }
}
