// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Exponential backoff for transient failures of external calls.
//!
//! Only errors that classify themselves as transient are retried. The
//! caller bounds the whole attempt by the intent deadline.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::decryption::DecryptError;
use crate::ledger::LedgerError;
use crate::venue::VenueError;

/// Errors that may succeed if the same call is repeated.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DecryptError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl Retryable for VenueError {
    // Venue failures (liquidity, slippage) wait for the next cycle; only
    // transport errors are retried in place.
    fn is_retryable(&self) -> bool {
        matches!(self, VenueError::Transient(_))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    /// Total attempts including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
            multiplier: 2,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
