// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for an external threshold-decryption service.
//!
//! - `POST {base}/v1/seal` `{scope, amount}` → `SealedAmount`
//! - `POST {base}/v1/decrypt` `{sealed, context}` → `{amount}`
//!
//! 403 maps to `Denied`, 5xx and connection failures to `Transient`, any
//! other non-success status to `Malformed`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ledger::{AccessScope, Amount, SealedAmount};

use super::{AuthorizationContext, DecryptError, ThresholdDecryption};

#[derive(Serialize)]
struct SealBody<'a> {
    scope: &'a AccessScope,
    amount: Amount,
}

#[derive(Serialize)]
struct DecryptBody<'a> {
    sealed: &'a SealedAmount,
    context: &'a AuthorizationContext,
}

#[derive(Deserialize)]
struct DecryptResponse {
    amount: Amount,
}

pub struct RemoteThresholdService {
    base_url: String,
    http: Client,
}

impl RemoteThresholdService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DecryptError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| DecryptError::Malformed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, DecryptError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .json(body)
            .send()
            .await
            .map_err(|e| DecryptError::Transient(format!("POST {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, format!("POST {path} returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| DecryptError::Malformed(format!("POST {path} invalid JSON: {e}")))
    }
}

fn classify_status(status: StatusCode, message: String) -> DecryptError {
    if status == StatusCode::FORBIDDEN {
        DecryptError::Denied(message)
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DecryptError::Transient(message)
    } else {
        DecryptError::Malformed(message)
    }
}

#[async_trait]
impl ThresholdDecryption for RemoteThresholdService {
    async fn seal(&self, scope: &AccessScope, amount: Amount) -> Result<SealedAmount, DecryptError> {
        self.post_json("/v1/seal", &SealBody { scope, amount }).await
    }

    async fn request(
        &self,
        sealed: &SealedAmount,
        context: &AuthorizationContext,
    ) -> Result<Amount, DecryptError> {
        let response: DecryptResponse = self
            .post_json("/v1/decrypt", &DecryptBody { sealed, context })
            .await?;
        Ok(response.amount)
    }
}
