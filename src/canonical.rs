// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical, domain-separated byte encoding for signed messages.
//!
//! Every signed structure starts with a scope tag (e.g. `settlement/v1`) so a
//! signature produced for one purpose never verifies for another. Fields are
//! length-prefixed so no two field sequences share an encoding.

use sha2::{Digest, Sha256};

pub const SETTLEMENT_SCOPE: &str = "settlement/v1";
pub const DECRYPT_SCOPE: &str = "decrypt/v1";
pub const ATTESTATION_SCOPE: &str = "attestation/v1";
pub const CIPHERTEXT_SCOPE: &str = "ciphertext/v1";
pub const SEAL_KEY_SCOPE: &str = "seal-key/v1";

#[derive(Debug, Clone)]
pub struct CanonicalBytes {
    buf: Vec<u8>,
}

impl CanonicalBytes {
    pub fn new(scope: &str) -> Self {
        let mut this = Self {
            buf: Vec::with_capacity(128),
        };
        this.push_bytes(scope.as_bytes());
        this
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.push_bytes(value.as_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.push_bytes(value);
        self
    }

    pub fn u64_list(mut self, values: &[u64]) -> Self {
        self.buf.extend_from_slice(&(values.len() as u64).to_be_bytes());
        for value in values {
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn digest_hex(self) -> String {
        hex::encode(Sha256::digest(&self.buf))
    }

    fn push_bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(value);
    }
}
