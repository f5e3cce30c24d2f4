// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;

use crate::decryption::ThresholdDecryption;
use crate::ledger::Ledger;

/// Bearer-token verification settings.
///
/// Without a secret, tokens are decoded without signature verification in
/// `dev` builds and rejected otherwise.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub secret: Option<String>,
    pub issuer: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    /// Used to seal deposits submitted without a client-side ciphertext.
    pub decryption: Arc<dyn ThresholdDecryption>,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        decryption: Arc<dyn ThresholdDecryption>,
        auth_config: AuthConfig,
    ) -> Self {
        Self {
            ledger,
            decryption,
            auth_config,
        }
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth_config.clone()
    }
}
