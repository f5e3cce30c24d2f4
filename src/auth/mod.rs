// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer JWT authentication for client frontends and operators.
//!
//! ## Auth Flow
//!
//! 1. The client frontend obtains an HS256 token from the deployment's issuer
//! 2. Requests carry `Authorization: Bearer <JWT>`
//! 3. The server verifies signature, expiry and issuer, then extracts:
//!    - `sub` → canonical `principal_id` (recorded as vault owner)
//!    - `role` → `admin` / `client` / `auditor`
//!
//! Workers never authenticate with JWTs: their settlements and decryption
//! requests are authorized by signatures checked against attestation records.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;

pub use claims::{AuthenticatedPrincipal, PrincipalClaims};
pub use error::AuthError;
pub use extractor::{AdminOnly, AuditAccess, Auth};
pub use roles::Role;
