// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process constant-product (x·y = k) pools.
//!
//! Pools are configured as `BASE:QUOTE:reserve_base:reserve_quote:fee_bps`,
//! comma separated, e.g. `SUI:USDC:1000000:950000:30`. A pool trades in both
//! directions.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ledger::{Amount, AssetId};

use super::{Quote, SwapFailure, SwapReceipt, SwapVenue, VenueError};

const BPS: u128 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pool {
    reserves: HashMap<AssetId, u128>,
    fee_bps: u32,
}

impl Pool {
    /// Validated pool keyed by its unordered pair. `label` names the pool in errors.
    fn checked(
        label: &str,
        base: AssetId,
        quote: AssetId,
        reserve_base: Amount,
        reserve_quote: Amount,
        fee_bps: u64,
    ) -> Result<(PairKey, Pool), VenueError> {
        if fee_bps >= BPS as u64 {
            return Err(VenueError::Config(format!(
                "pool {label}: fee must be below 10000 bps"
            )));
        }
        if base == quote {
            return Err(VenueError::Config(format!("pool {label}: assets must differ")));
        }
        let key = pair_key(&base, &quote);
        let pool = Pool {
            reserves: HashMap::from([
                (base, reserve_base as u128),
                (quote, reserve_quote as u128),
            ]),
            fee_bps: fee_bps as u32,
        };
        Ok((key, pool))
    }

    fn amount_out(&self, asset_in: &AssetId, asset_out: &AssetId, amount: Amount) -> Amount {
        let (Some(&reserve_in), Some(&reserve_out)) =
            (self.reserves.get(asset_in), self.reserves.get(asset_out))
        else {
            return 0;
        };
        let amount_in = amount as u128 * (BPS - self.fee_bps as u128) / BPS;
        let denominator = reserve_in + amount_in;
        if denominator == 0 {
            return 0;
        }
        (amount_in * reserve_out / denominator) as Amount
    }
}

type PairKey = (AssetId, AssetId);

fn pair_key(a: &AssetId, b: &AssetId) -> PairKey {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[derive(Debug, Default)]
pub struct ConstantProductVenue {
    pools: Mutex<HashMap<PairKey, Pool>>,
}

impl ConstantProductVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `VENUE_POOLS` specification.
    pub fn from_spec(spec: &str) -> Result<Self, VenueError> {
        let mut pools = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            let [base, quote, reserve_base, reserve_quote, fee_bps] = parts.as_slice() else {
                return Err(VenueError::Config(format!(
                    "pool {entry} must be BASE:QUOTE:reserve_base:reserve_quote:fee_bps"
                )));
            };
            let parse = |v: &str| {
                v.parse::<u64>()
                    .map_err(|e| VenueError::Config(format!("pool {entry}: {v}: {e}")))
            };
            let (key, pool) = Pool::checked(
                entry,
                AssetId::from(*base),
                AssetId::from(*quote),
                parse(*reserve_base)?,
                parse(*reserve_quote)?,
                parse(*fee_bps)?,
            )?;
            pools.insert(key, pool);
        }
        Ok(Self {
            pools: Mutex::new(pools),
        })
    }

    pub async fn add_pool(
        &self,
        base: AssetId,
        quote: AssetId,
        reserve_base: Amount,
        reserve_quote: Amount,
        fee_bps: u32,
    ) -> Result<(), VenueError> {
        let label = format!("{base}:{quote}");
        let (key, pool) = Pool::checked(
            &label,
            base,
            quote,
            reserve_base,
            reserve_quote,
            fee_bps.into(),
        )?;
        self.pools.lock().await.insert(key, pool);
        Ok(())
    }

    /// Current reserve of `asset` in the `asset`/`other` pool.
    pub async fn reserve(&self, asset: &AssetId, other: &AssetId) -> Option<Amount> {
        let pools = self.pools.lock().await;
        pools
            .get(&pair_key(asset, other))
            .and_then(|p| p.reserves.get(asset))
            .map(|r| *r as Amount)
    }
}

fn unsupported(asset_in: &AssetId, asset_out: &AssetId) -> VenueError {
    VenueError::UnsupportedPair {
        asset_in: asset_in.clone(),
        asset_out: asset_out.clone(),
    }
}

#[async_trait]
impl SwapVenue for ConstantProductVenue {
    async fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
    ) -> Result<Quote, VenueError> {
        let pools = self.pools.lock().await;
        let pool = pools
            .get(&pair_key(asset_in, asset_out))
            .ok_or_else(|| unsupported(asset_in, asset_out))?;
        Ok(Quote {
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
            amount_in: amount,
            amount_out: pool.amount_out(asset_in, asset_out, amount),
        })
    }

    async fn execute(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
        min_out: Amount,
    ) -> Result<SwapReceipt, VenueError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(&pair_key(asset_in, asset_out))
            .ok_or_else(|| unsupported(asset_in, asset_out))?;

        let realized_out = pool.amount_out(asset_in, asset_out, amount);
        let reserve_out = pool.reserves.get(asset_out).copied().unwrap_or(0);
        if realized_out == 0 || realized_out as u128 >= reserve_out {
            return Err(VenueError::Failure(SwapFailure::InsufficientLiquidity));
        }
        if realized_out < min_out {
            return Err(VenueError::Failure(SwapFailure::SlippageExceeded));
        }

        if let Some(reserve) = pool.reserves.get_mut(asset_in) {
            *reserve += amount as u128;
        }
        if let Some(reserve) = pool.reserves.get_mut(asset_out) {
            *reserve -= realized_out as u128;
        }

        let receipt = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            asset_in = %asset_in,
            asset_out = %asset_out,
            receipt = %receipt,
            "Executed swap"
        );
        Ok(SwapReceipt {
            realized_out,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sui() -> AssetId {
        AssetId::from("SUI")
    }

    fn usdc() -> AssetId {
        AssetId::from("USDC")
    }

    #[tokio::test]
    async fn quote_applies_fee_and_curve() {
        let venue = ConstantProductVenue::from_spec("SUI:USDC:10000:10000:0").unwrap();
        let quote = venue.quote(&sui(), &usdc(), 100).await.unwrap();
        // 100 * 10000 / 10100 = 99.0099
        assert_eq!(quote.amount_out, 99);

        let with_fee = ConstantProductVenue::from_spec("SUI:USDC:10000:10000:100").unwrap();
        assert_eq!(with_fee.quote(&sui(), &usdc(), 100).await.unwrap().amount_out, 98);
    }

    #[tokio::test]
    async fn execute_moves_reserves_both_directions() {
        let venue = ConstantProductVenue::from_spec("SUI:USDC:10000:10000:0").unwrap();
        let receipt = venue.execute(&sui(), &usdc(), 100, 90).await.unwrap();
        assert_eq!(receipt.realized_out, 99);
        assert_eq!(venue.reserve(&sui(), &usdc()).await, Some(10_100));
        assert_eq!(venue.reserve(&usdc(), &sui()).await, Some(9_901));

        let back = venue.execute(&usdc(), &sui(), 99, 0).await.unwrap();
        assert!(back.realized_out <= 100);
    }

    #[tokio::test]
    async fn enforces_min_out() {
        let venue = ConstantProductVenue::from_spec("SUI:USDC:10000:10000:0").unwrap();
        assert_eq!(
            venue.execute(&sui(), &usdc(), 100, 100).await,
            Err(VenueError::Failure(SwapFailure::SlippageExceeded))
        );
        assert_eq!(venue.reserve(&sui(), &usdc()).await, Some(10_000));
    }

    #[tokio::test]
    async fn shallow_pool_is_insufficient_liquidity() {
        let venue = ConstantProductVenue::from_spec("SUI:USDC:1000000:1:0").unwrap();
        assert_eq!(
            venue.execute(&sui(), &usdc(), 10, 0).await,
            Err(VenueError::Failure(SwapFailure::InsufficientLiquidity))
        );
    }

    #[tokio::test]
    async fn unknown_pair() {
        let venue = ConstantProductVenue::new();
        assert!(matches!(
            venue.quote(&sui(), &usdc(), 1).await,
            Err(VenueError::UnsupportedPair { .. })
        ));
    }

    #[tokio::test]
    async fn add_pool_validates_like_config() {
        let venue = ConstantProductVenue::new();
        assert!(matches!(
            venue.add_pool(sui(), usdc(), 1_000, 1_000, 10_000).await,
            Err(VenueError::Config(_))
        ));
        assert!(matches!(
            venue.add_pool(sui(), sui(), 1_000, 1_000, 30).await,
            Err(VenueError::Config(_))
        ));
        assert!(venue.quote(&sui(), &usdc(), 1).await.is_err());

        venue.add_pool(sui(), usdc(), 10_000, 10_000, 9_999).await.unwrap();
        assert_eq!(venue.quote(&sui(), &usdc(), 100).await.unwrap().amount_out, 0);
    }

    #[test]
    fn spec_parsing_errors() {
        assert!(ConstantProductVenue::from_spec("SUI:USDC:1:1").is_err());
        assert!(ConstantProductVenue::from_spec("SUI:SUI:1:1:0").is_err());
        assert!(ConstantProductVenue::from_spec("SUI:USDC:1:1:10000").is_err());
        assert!(ConstantProductVenue::from_spec("").is_ok());
    }
}
