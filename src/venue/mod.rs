// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Swap Venue
//!
//! Call contract of the external venue:
//! - `quote(asset_in, asset_out, amount) -> price`
//! - `execute(asset_in, asset_out, amount, min_out) -> (realized_out, receipt)
//!   | Failure(InsufficientLiquidity | SlippageExceeded)`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorCategory;
use crate::ledger::{Amount, AssetId};

pub mod pool;
pub mod remote;

pub use pool::ConstantProductVenue;
pub use remote::RemoteSwapVenue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    pub asset_in: AssetId,
    pub asset_out: AssetId,
    pub amount_in: Amount,
    /// Expected output at current reserves.
    pub amount_out: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SwapReceipt {
    pub realized_out: Amount,
    /// Venue reference for the executed trade.
    pub receipt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SwapFailure {
    InsufficientLiquidity,
    SlippageExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("swap failed: {0:?}")]
    Failure(SwapFailure),

    #[error("no market for {asset_in} -> {asset_out}")]
    UnsupportedPair { asset_in: AssetId, asset_out: AssetId },

    #[error("venue unavailable: {0}")]
    Transient(String),

    #[error("invalid venue response: {0}")]
    InvalidResponse(String),

    #[error("invalid venue configuration: {0}")]
    Config(String),
}

impl VenueError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VenueError::Failure(SwapFailure::SlippageExceeded) => ErrorCategory::Invariant,
            VenueError::Failure(SwapFailure::InsufficientLiquidity)
            | VenueError::Transient(_) => ErrorCategory::Transient,
            VenueError::UnsupportedPair { .. } => ErrorCategory::Validation,
            VenueError::InvalidResponse(_) | VenueError::Config(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

#[async_trait]
pub trait SwapVenue: Send + Sync {
    async fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
    ) -> Result<Quote, VenueError>;

    async fn execute(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
        min_out: Amount,
    ) -> Result<SwapReceipt, VenueError>;
}
