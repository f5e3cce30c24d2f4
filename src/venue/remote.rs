// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for an external swap venue.
//!
//! - `POST {base}/v1/quote` `{asset_in, asset_out, amount}` → `Quote`
//! - `POST {base}/v1/swap` `{asset_in, asset_out, amount, min_out}` →
//!   `SwapReceipt`, or 422 `{"failure": "insufficient_liquidity" | "slippage_exceeded"}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ledger::{Amount, AssetId};

use super::{Quote, SwapFailure, SwapReceipt, SwapVenue, VenueError};

#[derive(Serialize)]
struct SwapBody<'a> {
    asset_in: &'a AssetId,
    asset_out: &'a AssetId,
    amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_out: Option<Amount>,
}

#[derive(Deserialize)]
struct FailureBody {
    failure: SwapFailure,
}

pub struct RemoteSwapVenue {
    base_url: String,
    http: Client,
}

impl RemoteSwapVenue {
    pub fn new(base_url: impl Into<String>) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| VenueError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &SwapBody<'_>,
    ) -> Result<R, VenueError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .json(body)
            .send()
            .await
            .map_err(|e| VenueError::Transient(format!("POST {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, path));
        }

        response
            .json()
            .await
            .map_err(|e| VenueError::InvalidResponse(format!("POST {path} invalid JSON: {e}")))
    }
}

fn classify_failure(status: StatusCode, body: &str, path: &str) -> VenueError {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        if let Ok(failure) = serde_json::from_str::<FailureBody>(body) {
            return VenueError::Failure(failure.failure);
        }
    }
    let message = format!("POST {path} returned {status}: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        VenueError::Transient(message)
    } else {
        VenueError::InvalidResponse(message)
    }
}

#[async_trait]
impl SwapVenue for RemoteSwapVenue {
    async fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
    ) -> Result<Quote, VenueError> {
        let body = SwapBody {
            asset_in,
            asset_out,
            amount,
            min_out: None,
        };
        self.post_json("/v1/quote", &body).await
    }

    async fn execute(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
        min_out: Amount,
    ) -> Result<SwapReceipt, VenueError> {
        let body = SwapBody {
            asset_in,
            asset_out,
            amount,
            min_out: Some(min_out),
        };
        self.post_json("/v1/swap", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_failures_are_decoded() {
        let err = classify_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"failure":"slippage_exceeded"}"#,
            "/v1/swap",
        );
        assert_eq!(err, VenueError::Failure(SwapFailure::SlippageExceeded));

        let err = classify_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"failure":"insufficient_liquidity"}"#,
            "/v1/swap",
        );
        assert_eq!(err, VenueError::Failure(SwapFailure::InsufficientLiquidity));
    }

    #[test]
    fn other_statuses() {
        assert!(classify_failure(StatusCode::SERVICE_UNAVAILABLE, "", "/v1/swap").is_transient());
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, "", "/v1/swap"),
            VenueError::InvalidResponse(_)
        ));
    }
}
