// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Attestation Module
//!
//! Binds worker signing keys to the code measurements a hardware root of
//! trust vouched for.
//!
//! ## Flow
//!
//! 1. A worker generates (or loads) its secp256k1 signing key
//! 2. Its [`AttestationSource`] produces a proof: a document embedding the
//!    measurement digests and the public key, signed by the root of trust
//! 3. `register_worker` checks the proof and creates an active
//!    [`AttestationRecord`]
//! 4. Settlements and decryption requests signed by that key are accepted
//!    while the record stays active; deactivation never deletes the record

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorCategory;
use crate::ledger::RecordId;

pub mod proof;
pub mod registry;
pub mod signer;
pub mod source;

pub use proof::{AttestationDocument, AttestationProof, RootOfTrust};
pub use registry::{AttestationPolicy, RegisterWorker};
pub use signer::{normalize_public_key, verify_hex_signature, SignerError, WorkerSigner};
pub use source::{AttestationSource, MockAttestationSource, StaticAttestationSource, MOCK_MEASUREMENT};

/// On-ledger binding of a worker public key to its attested measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttestationRecord {
    pub record_id: RecordId,
    /// Compressed SEC1 public key, hex.
    pub public_key: String,
    pub measurements: BTreeSet<String>,
    pub module_id: String,
    pub active: bool,
    pub registered_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    #[error("malformed attestation input: {0}")]
    InvalidEncoding(String),

    #[error("attestation proof is not signed by the root of trust")]
    UntrustedRoot,

    #[error("declared measurements {declared:?} do not match attested {attested:?}")]
    MeasurementMismatch {
        declared: BTreeSet<String>,
        attested: BTreeSet<String>,
    },

    #[error("attested public key does not match the declared key")]
    KeyMismatch,

    #[error("measurement {0} is not in the allowlist")]
    MeasurementNotAllowed(String),

    #[error("public key already has active attestation record {record_id}")]
    AlreadyRegistered { record_id: RecordId },
}

impl AttestationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AttestationError::InvalidEncoding(_) => ErrorCategory::Validation,
            AttestationError::AlreadyRegistered { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Authorization,
        }
    }
}
