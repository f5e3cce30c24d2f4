// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Worker signing keys (secp256k1 ECDSA over SHA-256).
//!
//! Keys are stored as PEM. Both PKCS#8 (`PRIVATE KEY`) and SEC1
//! (`EC PRIVATE KEY`) encodings are accepted on load; new keys are written
//! as PKCS#8.

use std::path::Path;

use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use k256::SecretKey;
use rand::rngs::OsRng;

use super::AttestationError;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A worker's attested signing key.
pub struct WorkerSigner {
    key: SigningKey,
    public_key_hex: String,
}

impl std::fmt::Debug for WorkerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSigner")
            .field("public_key", &self.public_key_hex)
            .finish_non_exhaustive()
    }
}

impl WorkerSigner {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_signing_key(key: SigningKey) -> Self {
        let public_key_hex = encode_public_key(key.verifying_key());
        Self {
            key,
            public_key_hex,
        }
    }

    /// Parse a PEM-encoded private key (PKCS#8 or SEC1).
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, SignerError> {
        let pem_str = std::str::from_utf8(pem_bytes)
            .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid UTF-8: {e}")))?;

        let pem = pem::parse(pem_str)
            .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid PEM: {e}")))?;

        let secret_key = SecretKey::from_pkcs8_der(pem.contents())
            .or_else(|_| SecretKey::from_sec1_der(pem.contents()))
            .map_err(|e| SignerError::InvalidPrivateKey(format!("Invalid key format: {e}")))?;

        Ok(Self::from_signing_key(SigningKey::from(secret_key)))
    }

    pub fn to_pem(&self) -> Result<String, SignerError> {
        let pem = self
            .key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SignerError::InvalidPrivateKey(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Load the key at `path`, generating and persisting a new one if absent.
    pub fn load_or_generate(path: &Path) -> Result<Self, SignerError> {
        if path.exists() {
            let bytes = std::fs::read(path)?;
            return Self::from_pem(&bytes);
        }

        let signer = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, signer.to_pem()?)?;
        tracing::info!(
            path = %path.display(),
            public_key = %signer.public_key_hex,
            "Generated new worker signing key"
        );
        Ok(signer)
    }

    /// Compressed SEC1 public key, hex.
    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    /// Sign `message`, returning the 64-byte signature as hex.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.key.sign(message);
        hex::encode(signature.to_bytes())
    }
}

fn encode_public_key(key: &VerifyingKey) -> String {
    hex::encode(key.to_encoded_point(true).as_bytes())
}

fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, AttestationError> {
    let bytes = hex::decode(public_key_hex)
        .map_err(|e| AttestationError::InvalidEncoding(format!("public key: {e}")))?;
    VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| AttestationError::InvalidEncoding(format!("public key: {e}")))
}

/// Canonical (compressed, lowercase hex) form of a SEC1 public key.
pub fn normalize_public_key(public_key_hex: &str) -> Result<String, AttestationError> {
    Ok(encode_public_key(&parse_public_key(public_key_hex)?))
}

/// Check a hex signature over `message`. Malformed input never verifies.
pub fn verify_hex_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(key) = parse_public_key(public_key_hex) else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

pub(crate) fn verifying_key_from_hex(public_key_hex: &str) -> Result<VerifyingKey, AttestationError> {
    parse_public_key(public_key_hex)
}
