// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hardware attestation sources.
//!
//! Production deployments load a proof issued for the worker key by the
//! platform (e.g. a Nitro attestation converted by the provisioning
//! pipeline). Development runs use [`MockAttestationSource`], whose root key
//! is generated at boot and trusted only by the local ledger.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

use super::proof::{AttestationDocument, AttestationProof, RootOfTrust};
use super::AttestationError;

/// Fixed measurement reported by the mock source.
pub const MOCK_MEASUREMENT: &str =
    "8b2c2a3f5e0d4f6a9c1b7e3d2a5f8c0e4b6d9a1c3e5f7b2d4a6c8e0f1a3b5c7d";

const MOCK_MODULE_ID: &str = "mock-worker-enclave";

/// Produces attestation proofs for a worker public key.
#[async_trait]
pub trait AttestationSource: Send + Sync {
    async fn attest(&self, public_key_hex: &str) -> Result<AttestationProof, AttestationError>;
}

/// In-process source signing documents with a locally generated root.
pub struct MockAttestationSource {
    root: SigningKey,
    measurements: BTreeSet<String>,
}

impl MockAttestationSource {
    pub fn new() -> Self {
        Self {
            root: SigningKey::random(&mut OsRng),
            measurements: BTreeSet::from([MOCK_MEASUREMENT.to_string()]),
        }
    }

    /// Report these measurements instead of the mock default.
    pub fn with_measurements(mut self, measurements: BTreeSet<String>) -> Self {
        self.measurements = measurements;
        self
    }

    pub fn root_of_trust(&self) -> RootOfTrust {
        RootOfTrust::from_signing_key(&self.root)
    }

    pub fn measurements(&self) -> &BTreeSet<String> {
        &self.measurements
    }

    /// Sign an arbitrary document with the mock root.
    pub fn issue(&self, document: AttestationDocument) -> AttestationProof {
        AttestationProof::issue(&self.root, document)
    }
}

impl Default for MockAttestationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttestationSource for MockAttestationSource {
    async fn attest(&self, public_key_hex: &str) -> Result<AttestationProof, AttestationError> {
        let document = AttestationDocument {
            module_id: MOCK_MODULE_ID.to_string(),
            measurements: self.measurements.clone(),
            public_key: public_key_hex.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        };
        Ok(self.issue(document))
    }
}

/// Serves a pre-issued proof loaded from disk.
pub struct StaticAttestationSource {
    proof: AttestationProof,
}

impl StaticAttestationSource {
    pub fn new(proof: AttestationProof) -> Self {
        Self { proof }
    }

    pub fn from_file(path: &Path) -> Result<Self, AttestationError> {
        let bytes = std::fs::read(path).map_err(|e| {
            AttestationError::InvalidEncoding(format!("read {}: {e}", path.display()))
        })?;
        let proof = serde_json::from_slice(&bytes).map_err(|e| {
            AttestationError::InvalidEncoding(format!("parse {}: {e}", path.display()))
        })?;
        Ok(Self::new(proof))
    }
}

#[async_trait]
impl AttestationSource for StaticAttestationSource {
    async fn attest(&self, public_key_hex: &str) -> Result<AttestationProof, AttestationError> {
        if !self.proof.document.public_key.eq_ignore_ascii_case(public_key_hex) {
            return Err(AttestationError::KeyMismatch);
        }
        Ok(self.proof.clone())
    }
}
