// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation documents and their root-of-trust signatures.

use std::collections::BTreeSet;

use k256::ecdsa::{signature::Verifier, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::canonical::{CanonicalBytes, ATTESTATION_SCOPE};

use super::signer::verifying_key_from_hex;
use super::AttestationError;

/// Document produced by the hardware attestation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttestationDocument {
    /// Enclave image identifier.
    pub module_id: String,
    /// Code measurement digests (hex), e.g. PCR0/PCR1/PCR2.
    pub measurements: BTreeSet<String>,
    /// Public key the enclave generated, compressed SEC1 hex.
    pub public_key: String,
    pub timestamp_ms: u64,
}

impl AttestationDocument {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut bytes = CanonicalBytes::new(ATTESTATION_SCOPE)
            .str(&self.module_id)
            .u64(self.measurements.len() as u64);
        for measurement in &self.measurements {
            bytes = bytes.str(measurement);
        }
        bytes
            .str(&self.public_key)
            .u64(self.timestamp_ms)
            .finish()
    }
}

/// A document plus the root of trust's signature over its canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttestationProof {
    pub document: AttestationDocument,
    /// Root-of-trust ECDSA signature, hex.
    pub signature: String,
}

impl AttestationProof {
    /// Sign `document` with a root key. Used by mock and test sources.
    pub fn issue(root: &SigningKey, document: AttestationDocument) -> Self {
        use k256::ecdsa::signature::Signer;
        let signature: Signature = root.sign(&document.canonical_bytes());
        Self {
            document,
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

/// The fixed external root every proof must chain to.
#[derive(Debug, Clone)]
pub struct RootOfTrust {
    key: VerifyingKey,
}

impl RootOfTrust {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_hex(public_key_hex: &str) -> Result<Self, AttestationError> {
        Ok(Self::new(verifying_key_from_hex(public_key_hex)?))
    }

    pub fn from_signing_key(root: &SigningKey) -> Self {
        Self::new(VerifyingKey::from(root))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.to_encoded_point(true).as_bytes())
    }

    pub fn verify(&self, proof: &AttestationProof) -> Result<(), AttestationError> {
        let bytes = hex::decode(&proof.signature)
            .map_err(|e| AttestationError::InvalidEncoding(format!("proof signature: {e}")))?;
        let signature = Signature::from_slice(&bytes)
            .map_err(|e| AttestationError::InvalidEncoding(format!("proof signature: {e}")))?;
        self.key
            .verify(&proof.document.canonical_bytes(), &signature)
            .map_err(|_| AttestationError::UntrustedRoot)
    }
}

/// Lowercase a digest and check it is 32 or 48 bytes of hex.
pub fn normalize_measurement(measurement: &str) -> Result<String, AttestationError> {
    let lower = measurement.trim().to_ascii_lowercase();
    let bytes = hex::decode(&lower)
        .map_err(|e| AttestationError::InvalidEncoding(format!("measurement {measurement}: {e}")))?;
    if bytes.len() != 32 && bytes.len() != 48 {
        return Err(AttestationError::InvalidEncoding(format!(
            "measurement {measurement} must be 32 or 48 bytes"
        )));
    }
    Ok(lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn document() -> AttestationDocument {
        AttestationDocument {
            module_id: "worker-image".to_string(),
            measurements: BTreeSet::from(["aa".repeat(32)]),
            public_key: "02".to_string() + &"11".repeat(32),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn issued_proof_verifies_against_its_root() {
        let root = SigningKey::random(&mut OsRng);
        let proof = AttestationProof::issue(&root, document());

        let trust = RootOfTrust::from_signing_key(&root);
        assert!(trust.verify(&proof).is_ok());
        let reparsed = RootOfTrust::from_hex(&trust.public_key_hex()).unwrap();
        assert!(reparsed.verify(&proof).is_ok());
    }

    #[test]
    fn foreign_root_is_untrusted() {
        let root = SigningKey::random(&mut OsRng);
        let other = SigningKey::random(&mut OsRng);
        let proof = AttestationProof::issue(&other, document());

        let result = RootOfTrust::from_signing_key(&root).verify(&proof);
        assert_eq!(result, Err(AttestationError::UntrustedRoot));
    }

    #[test]
    fn tampered_document_is_untrusted() {
        let root = SigningKey::random(&mut OsRng);
        let mut proof = AttestationProof::issue(&root, document());
        proof.document.measurements.insert("bb".repeat(32));

        let result = RootOfTrust::from_signing_key(&root).verify(&proof);
        assert_eq!(result, Err(AttestationError::UntrustedRoot));
    }

    #[test]
    fn measurement_normalization() {
        assert_eq!(normalize_measurement(&"AB".repeat(32)).unwrap(), "ab".repeat(32));
        assert!(normalize_measurement(&"ab".repeat(48)).is_ok());
        assert!(normalize_measurement("abcd").is_err());
        assert!(normalize_measurement("zz").is_err());
    }
}
