// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Threshold Decryption
//!
//! Call contract of the external threshold-decryption service:
//! `request(ciphertext, authorization_context) -> plaintext | Denied`.
//!
//! Worker requests are signed under the `decrypt/v1` scope with the attested
//! key, so a custodian can tie the request to an attestation record before
//! consulting the authorization gateway. Owner requests are authenticated by
//! the API layer and carry no signature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attestation::{verify_hex_signature, WorkerSigner};
use crate::canonical::{CanonicalBytes, DECRYPT_SCOPE};
use crate::error::ErrorCategory;
use crate::gateway::{AccessTarget, Requester};
use crate::ledger::{AccessScope, Amount, SealedAmount};

pub mod local;
pub mod remote;

pub use local::LocalThresholdService;
pub use remote::RemoteThresholdService;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    #[error("decryption denied: {0}")]
    Denied(String),

    #[error("decryption service unavailable: {0}")]
    Transient(String),

    #[error("malformed decryption request: {0}")]
    Malformed(String),
}

impl DecryptError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DecryptError::Denied(_) => ErrorCategory::Authorization,
            DecryptError::Transient(_) => ErrorCategory::Transient,
            DecryptError::Malformed(_) => ErrorCategory::Validation,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DecryptError::Transient(_))
    }
}

/// Who is asking, for which ciphertext, and proof of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationContext {
    pub requester: Requester,
    pub target: AccessTarget,
    /// [`SealedAmount::ciphertext_id`] of the ciphertext to open.
    pub ciphertext_id: String,
    /// Unix seconds.
    pub issued_at: u64,
    /// Worker signature over [`AuthorizationContext::signing_bytes`], hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuthorizationContext {
    pub fn for_owner(
        principal_id: impl Into<String>,
        target: AccessTarget,
        sealed: &SealedAmount,
        issued_at: u64,
    ) -> Self {
        Self {
            requester: Requester::Owner {
                principal_id: principal_id.into(),
            },
            target,
            ciphertext_id: sealed.ciphertext_id(),
            issued_at,
            signature: None,
        }
    }

    /// Signed context for an attested worker.
    pub fn for_worker(
        signer: &WorkerSigner,
        target: AccessTarget,
        sealed: &SealedAmount,
        issued_at: u64,
    ) -> Self {
        let mut context = Self {
            requester: Requester::Worker {
                public_key: signer.public_key_hex().to_string(),
            },
            target,
            ciphertext_id: sealed.ciphertext_id(),
            issued_at,
            signature: None,
        };
        context.signature = Some(signer.sign(&context.signing_bytes()));
        context
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let bytes = CanonicalBytes::new(DECRYPT_SCOPE);
        let bytes = match &self.requester {
            Requester::Owner { principal_id } => bytes.str("owner").str(principal_id),
            Requester::Worker { public_key } => bytes.str("worker").str(public_key),
        };
        let bytes = match self.target {
            AccessTarget::Vault { vault_id } => bytes.str("vault").u64(vault_id),
            AccessTarget::Ticket {
                vault_id,
                ticket_id,
            } => bytes.str("ticket").u64(vault_id).u64(ticket_id),
        };
        bytes
            .str(&self.ciphertext_id)
            .u64(self.issued_at)
            .finish()
    }

    /// Owners pass; workers must carry a valid signature by their key.
    pub fn verify_signature(&self) -> bool {
        match &self.requester {
            Requester::Owner { .. } => true,
            Requester::Worker { public_key } => self.signature.as_deref().is_some_and(|sig| {
                verify_hex_signature(public_key, &self.signing_bytes(), sig)
            }),
        }
    }
}

#[async_trait]
pub trait ThresholdDecryption: Send + Sync {
    /// Encrypt `amount` under `scope`.
    async fn seal(&self, scope: &AccessScope, amount: Amount) -> Result<SealedAmount, DecryptError>;

    /// Open `sealed` if the custodians authorize `context`.
    async fn request(
        &self,
        sealed: &SealedAmount,
        context: &AuthorizationContext,
    ) -> Result<Amount, DecryptError>;
}
