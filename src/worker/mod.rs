// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confidential Worker
//!
//! An attested replica that turns pending intents into settlements:
//! decrypt → aggregate → swap → verify → allocate → re-seal → sign → commit.
//!
//! Replicas share nothing but the ledger. Exactly-once settlement rests on
//! the ledger's atomic "assert pending, then remove" step; a replica that
//! loses the race sees `NotPending` and discards its work. Within one
//! replica an in-flight table prevents the same intent from being worked on
//! twice concurrently, and a semaphore bounds concurrency.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::attestation::{
    AttestationError, AttestationRecord, AttestationSource, RegisterWorker, WorkerSigner,
};
use crate::decryption::{DecryptError, ThresholdDecryption};
use crate::error::ErrorCategory;
use crate::ledger::{
    IntentId, InvariantViolation, Ledger, LedgerError, PendingIntent, SettlementReceipt, TicketId,
};
use crate::venue::{SwapVenue, VenueError};

pub mod allocation;
mod pipeline;
pub mod retry;

pub use allocation::allocate_pro_rata;
pub use retry::{RetryPolicy, Retryable};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Attestation(#[from] AttestationError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("deadline {deadline} of intent {intent_id} has passed")]
    DeadlinePassed { intent_id: IntentId, deadline: u64 },

    #[error("ticket {ticket_id} decrypted to a non-positive amount")]
    NonPositiveAmount { ticket_id: TicketId },

    #[error("intent {intent_id} references tickets of more than one asset")]
    MixedAssets { intent_id: IntentId },
}

impl WorkerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkerError::Ledger(e) => e.category(),
            WorkerError::Decrypt(e) => e.category(),
            WorkerError::Venue(e) => e.category(),
            WorkerError::Attestation(e) => e.category(),
            WorkerError::Invariant(_) => ErrorCategory::Invariant,
            WorkerError::DeadlinePassed { .. }
            | WorkerError::NonPositiveAmount { .. }
            | WorkerError::MixedAssets { .. } => ErrorCategory::Validation,
        }
    }
}

/// Result of working one intent to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// This replica's settlement committed.
    Settled(SettlementReceipt),
    /// The intent left the pending set before this replica reached the commit.
    AlreadyFinalized,
    /// Another replica committed first; this replica's work was discarded.
    LostRace,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

type InFlight = Arc<Mutex<HashSet<IntentId>>>;

/// Removes an intent from the in-flight table when dropped, whether the task
/// finished, failed, timed out or was cancelled.
struct InFlightGuard {
    table: InFlight,
    intent_id: IntentId,
}

impl InFlightGuard {
    fn claim(table: &InFlight, intent_id: IntentId) -> Option<Self> {
        let mut set = table.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(intent_id).then(|| Self {
            table: Arc::clone(table),
            intent_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.table.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.intent_id);
    }
}

pub struct ConfidentialWorker {
    replica: usize,
    ledger: Arc<Ledger>,
    decryption: Arc<dyn ThresholdDecryption>,
    venue: Arc<dyn SwapVenue>,
    signer: WorkerSigner,
    config: WorkerConfig,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
}

impl ConfidentialWorker {
    pub fn new(
        replica: usize,
        ledger: Arc<Ledger>,
        decryption: Arc<dyn ThresholdDecryption>,
        venue: Arc<dyn SwapVenue>,
        signer: WorkerSigner,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            replica,
            ledger,
            decryption,
            venue,
            signer,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            permits,
        }
    }

    pub fn replica(&self) -> usize {
        self.replica
    }

    pub fn public_key(&self) -> &str {
        self.signer.public_key_hex()
    }

    /// Intents this replica is currently working on.
    pub fn in_flight(&self) -> Vec<IntentId> {
        let set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<_> = set.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Reuse this key's active attestation record, or attest and register.
    pub async fn ensure_registered(
        &self,
        source: &dyn AttestationSource,
    ) -> Result<AttestationRecord, WorkerError> {
        if let Some(record) = self.ledger.active_record_for_key(self.public_key())? {
            return Ok(record);
        }
        let proof = source.attest(self.public_key()).await?;
        let request = RegisterWorker {
            measurements: proof.document.measurements.clone(),
            public_key: self.public_key().to_string(),
            proof,
        };
        Ok(self.ledger.register_worker(&request)?)
    }

    /// Poll loop. Wakes on new intents or every `poll_interval` until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            replica = self.replica,
            public_key = %self.public_key(),
            "Worker replica started"
        );

        let mut tasks = JoinSet::new();
        loop {
            // Register interest before reading the pending set so an intent
            // created in between still wakes this loop.
            let notified = self.ledger.intent_notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.poll_once(&mut tasks) {
                Ok(0) => {}
                Ok(spawned) => tracing::debug!(replica = self.replica, spawned, "Dispatched intents"),
                Err(e) => tracing::warn!(replica = self.replica, error = %e, "Failed to list pending intents"),
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(replica = self.replica, error = %e, "Intent task panicked");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = &mut notified => {}
            }
        }

        tasks.shutdown().await;
        tracing::info!(replica = self.replica, "Worker replica stopped");
    }

    /// One polling cycle: spawn a task for every pending intent not already
    /// in flight on this replica.
    pub fn poll_once(self: &Arc<Self>, tasks: &mut JoinSet<()>) -> Result<usize, LedgerError> {
        let pending = self.ledger.list_pending()?;
        let mut spawned = 0;
        for intent in pending {
            let Some(guard) = InFlightGuard::claim(&self.in_flight, intent.intent_id) else {
                continue;
            };
            let worker = Arc::clone(self);
            tasks.spawn(async move {
                let _guard = guard;
                worker.handle(intent).await;
            });
            spawned += 1;
        }
        Ok(spawned)
    }

    async fn handle(&self, intent: PendingIntent) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };

        let now = self.ledger.now();
        if now > intent.deadline {
            tracing::debug!(
                replica = self.replica,
                intent_id = intent.intent_id,
                "Deadline passed; leaving intent for expiry"
            );
            return;
        }
        let budget = Duration::from_secs((intent.deadline - now).max(1));

        match tokio::time::timeout(budget, self.process_intent(intent.intent_id)).await {
            Ok(Ok(ProcessOutcome::Settled(receipt))) => tracing::info!(
                replica = self.replica,
                intent_id = intent.intent_id,
                new_tickets = ?receipt.new_ticket_ids,
                "Intent settled"
            ),
            Ok(Ok(ProcessOutcome::LostRace)) => tracing::debug!(
                replica = self.replica,
                intent_id = intent.intent_id,
                "Another replica settled intent first"
            ),
            Ok(Ok(ProcessOutcome::AlreadyFinalized)) => {}
            Ok(Err(e)) => self.report_failure(intent.intent_id, &e),
            Err(_) => tracing::warn!(
                replica = self.replica,
                intent_id = intent.intent_id,
                deadline = intent.deadline,
                "Stopped working intent at its deadline"
            ),
        }
    }

    fn report_failure(&self, intent_id: IntentId, error: &WorkerError) {
        match error.category() {
            ErrorCategory::Authorization => tracing::error!(
                replica = self.replica,
                intent_id,
                error = %error,
                "Authorization failure; intent stays pending"
            ),
            ErrorCategory::Invariant => tracing::error!(
                replica = self.replica,
                intent_id,
                error = %error,
                "Invariant violation; settlement aborted, intent left for review"
            ),
            ErrorCategory::Conflict => tracing::debug!(replica = self.replica, intent_id, "Intent no longer pending"),
            _ => tracing::warn!(
                replica = self.replica,
                intent_id,
                error = %error,
                "Intent attempt failed; retrying next cycle"
            ),
        }
    }
}
