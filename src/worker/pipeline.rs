// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-intent settlement pipeline.

use crate::decryption::AuthorizationContext;
use crate::gateway::AccessTarget;
use crate::ledger::{
    Amount, IntentId, IntentRecord, InvariantViolation, LedgerError, OutputMode,
    SettlementRequest, TicketId,
};
use crate::venue::{SwapFailure, VenueError};

use super::allocation::allocate_pro_rata;
use super::{ConfidentialWorker, ProcessOutcome, WorkerError};

impl ConfidentialWorker {
    /// Work one intent from the pending set to a committed settlement.
    ///
    /// Nothing is written to the ledger until the final `settle` call, so a
    /// failure at any earlier step leaves the intent pending and its tickets
    /// untouched.
    pub async fn process_intent(&self, intent_id: IntentId) -> Result<ProcessOutcome, WorkerError> {
        let request = match self.prepare_settlement(intent_id).await {
            Ok(request) => request,
            Err(WorkerError::Ledger(LedgerError::NotPending { .. })) => {
                return Ok(ProcessOutcome::AlreadyFinalized)
            }
            // A rival commit consumes the tickets mid-pipeline.
            Err(e) if !self.ledger.is_pending(intent_id)? => {
                tracing::debug!(replica = self.replica, intent_id, error = %e, "Intent finalized during pipeline");
                return Ok(ProcessOutcome::AlreadyFinalized);
            }
            Err(e) => return Err(e),
        };
        self.submit(&request).await
    }

    /// Decrypt, aggregate, swap, verify, allocate and re-seal; returns the
    /// signed settlement without committing it.
    pub async fn prepare_settlement(&self, intent_id: IntentId) -> Result<SettlementRequest, WorkerError> {
        let (intent, tickets) = self.ledger.intent_with_tickets(intent_id)?;
        self.check_deadline(&intent)?;

        let decryption = self.decryption.as_ref();
        let mut contributions: Vec<(TicketId, Amount)> = Vec::with_capacity(tickets.len());
        for ticket in &tickets {
            if ticket.asset != intent.input_asset {
                return Err(WorkerError::MixedAssets { intent_id });
            }
            let target = AccessTarget::Ticket {
                vault_id: ticket.vault_id,
                ticket_id: ticket.ticket_id,
            };
            let amount = self
                .config
                .retry
                .run("decrypt", || {
                    let context = AuthorizationContext::for_worker(
                        &self.signer,
                        target,
                        &ticket.sealed,
                        self.ledger.now(),
                    );
                    async move { ticket.sealed.decrypt(decryption, &context).await }
                })
                .await?;
            if amount == 0 {
                return Err(WorkerError::NonPositiveAmount {
                    ticket_id: ticket.ticket_id,
                });
            }
            contributions.push((ticket.ticket_id, amount));
        }

        let total_in = contributions
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or(InvariantViolation::Overflow("total input"))?;
        self.check_deadline(&intent)?;

        let (realized_out, venue_receipt) = self.swap(&intent, total_in).await?;
        if realized_out < intent.min_out {
            return Err(InvariantViolation::Slippage {
                realized_out,
                min_out: intent.min_out,
            }
            .into());
        }

        let shares: Vec<Amount> = match intent.output_mode {
            OutputMode::Merged => vec![realized_out],
            OutputMode::PerTicket => allocate_pro_rata(realized_out, &contributions)
                .into_iter()
                .map(|(_, share)| share)
                .collect(),
        };
        let shares: Vec<Amount> = shares.into_iter().filter(|share| *share > 0).collect();
        tracing::debug!(
            replica = self.replica,
            intent_id,
            total_in,
            realized_out,
            shares = ?shares,
            "Computed allocation"
        );

        let scope = self.ledger.scope_for(intent.vault_id);
        let mut new_tickets = Vec::with_capacity(shares.len());
        for share in shares {
            let sealed = self
                .config
                .retry
                .run("seal", || decryption.seal(&scope, share))
                .await?;
            new_tickets.push(sealed);
        }

        Ok(SettlementRequest {
            intent_id,
            worker_public_key: String::new(),
            consumed_ticket_ids: intent.ticket_ids.clone(),
            input_asset: intent.input_asset.clone(),
            total_in,
            output_asset: intent.out_asset.clone(),
            realized_out,
            new_tickets,
            venue_receipt,
            signature: String::new(),
        }
        .sign(&self.signer))
    }

    /// Same-asset intents skip the venue. Otherwise a quote screens out
    /// trades that cannot meet `min_out` before anything executes.
    async fn swap(
        &self,
        intent: &IntentRecord,
        total_in: Amount,
    ) -> Result<(Amount, Option<String>), WorkerError> {
        if intent.input_asset == intent.out_asset {
            return Ok((total_in, None));
        }

        let venue = self.venue.as_ref();
        let quote = self
            .config
            .retry
            .run("quote", || venue.quote(&intent.input_asset, &intent.out_asset, total_in))
            .await?;
        if quote.amount_out < intent.min_out {
            return Err(VenueError::Failure(SwapFailure::SlippageExceeded).into());
        }

        // Execution is not idempotent; a failed trade waits for the next cycle.
        let receipt = venue
            .execute(&intent.input_asset, &intent.out_asset, total_in, intent.min_out)
            .await?;
        Ok((receipt.realized_out, Some(receipt.receipt)))
    }

    async fn submit(&self, request: &SettlementRequest) -> Result<ProcessOutcome, WorkerError> {
        let ledger = self.ledger.as_ref();
        match self
            .config
            .retry
            .run("settle", || async move { ledger.settle(request) })
            .await
        {
            Ok(receipt) => Ok(ProcessOutcome::Settled(receipt)),
            Err(LedgerError::NotPending { .. }) => Ok(ProcessOutcome::LostRace),
            Err(e) => Err(e.into()),
        }
    }

    fn check_deadline(&self, intent: &IntentRecord) -> Result<(), WorkerError> {
        if self.ledger.now() > intent.deadline {
            return Err(WorkerError::DeadlinePassed {
                intent_id: intent.intent_id,
                deadline: intent.deadline,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::attestation::WorkerSigner;
    use crate::decryption::{DecryptError, LocalThresholdService, ThresholdDecryption};
    use crate::error::ErrorCategory;
    use crate::ledger::test_support::{owner, TestLedger, START};
    use crate::ledger::{AssetId, CreateIntent, IntentStatus, PendingIntent, VaultId};
    use crate::storage::AuditEventType;
    use crate::venue::{ConstantProductVenue, Quote, SwapReceipt, SwapVenue};
    use crate::worker::{RetryPolicy, WorkerConfig};

    /// Quotes generously, then fills one unit short of the caller's minimum.
    struct ShortFillVenue;

    /// Every call fails with a retryable transport error.
    struct DownVenue;

    #[async_trait::async_trait]
    impl SwapVenue for DownVenue {
        async fn quote(&self, _: &AssetId, _: &AssetId, _: Amount) -> Result<Quote, VenueError> {
            Err(VenueError::Transient("maintenance".into()))
        }

        async fn execute(
            &self,
            _: &AssetId,
            _: &AssetId,
            _: Amount,
            _: Amount,
        ) -> Result<SwapReceipt, VenueError> {
            Err(VenueError::Transient("maintenance".into()))
        }
    }

    #[async_trait::async_trait]
    impl SwapVenue for ShortFillVenue {
        async fn quote(
            &self,
            asset_in: &AssetId,
            asset_out: &AssetId,
            amount: Amount,
        ) -> Result<Quote, VenueError> {
            Ok(Quote {
                asset_in: asset_in.clone(),
                asset_out: asset_out.clone(),
                amount_in: amount,
                amount_out: amount * 10,
            })
        }

        async fn execute(
            &self,
            _asset_in: &AssetId,
            _asset_out: &AssetId,
            _amount: Amount,
            min_out: Amount,
        ) -> Result<SwapReceipt, VenueError> {
            Ok(SwapReceipt {
                realized_out: min_out - 1,
                receipt: "short-fill".into(),
            })
        }
    }

    struct Harness {
        t: TestLedger,
        decryption: Arc<LocalThresholdService>,
        venue: Arc<ConstantProductVenue>,
    }

    impl Harness {
        async fn new() -> Self {
            let t = TestLedger::new();
            let decryption =
                Arc::new(LocalThresholdService::new(t.ledger.clone(), &[7u8; 32], 3, 2).unwrap());
            let venue = Arc::new(ConstantProductVenue::new());
            venue
                .add_pool("SUI".into(), "USDC".into(), 1_000_000, 2_000_000, 30)
                .await
                .unwrap();
            Self {
                t,
                decryption,
                venue,
            }
        }

        async fn worker(&self, replica: usize) -> ConfidentialWorker {
            self.worker_on(replica, self.venue.clone()).await
        }

        async fn worker_on(&self, replica: usize, venue: Arc<dyn SwapVenue>) -> ConfidentialWorker {
            let retry = RetryPolicy {
                initial: Duration::from_millis(1),
                max: Duration::from_millis(2),
                multiplier: 2,
                max_attempts: 2,
            };
            self.worker_with(replica, venue, retry).await
        }

        async fn worker_with(
            &self,
            replica: usize,
            venue: Arc<dyn SwapVenue>,
            retry: RetryPolicy,
        ) -> ConfidentialWorker {
            let worker = ConfidentialWorker::new(
                replica,
                self.t.ledger.clone(),
                self.decryption.clone(),
                venue,
                WorkerSigner::generate(),
                WorkerConfig {
                    poll_interval: Duration::from_millis(20),
                    max_concurrency: 4,
                    retry,
                },
            );
            worker.ensure_registered(&self.t.attestation).await.unwrap();
            worker
        }

        async fn vault(&self, asset: &str, amounts: &[Amount]) -> VaultId {
            let alice = owner("alice");
            let vault = self.t.ledger.create_vault(&alice).unwrap();
            for amount in amounts {
                let sealed = self
                    .decryption
                    .seal(&self.t.ledger.scope_for(vault.vault_id), *amount)
                    .await
                    .unwrap();
                self.t
                    .ledger
                    .deposit(&alice, vault.vault_id, &AssetId::from(asset), *amount, sealed)
                    .unwrap();
            }
            vault.vault_id
        }

        fn intent(&self, vault_id: VaultId, out: &str, min_out: Amount, mode: OutputMode) -> IntentId {
            let ticket_ids = self
                .t
                .ledger
                .tickets(vault_id)
                .unwrap()
                .iter()
                .map(|t| t.ticket_id)
                .collect();
            self.t
                .ledger
                .create_intent(
                    &owner("alice"),
                    &CreateIntent {
                        vault_id,
                        ticket_ids,
                        out_asset: out.into(),
                        min_out,
                        deadline: START + 600,
                        output_mode: mode,
                    },
                )
                .unwrap()
                .intent_id
        }

        async fn open(&self, vault_id: VaultId) -> Vec<Amount> {
            let mut amounts = Vec::new();
            for ticket in self.t.ledger.tickets(vault_id).unwrap() {
                let context = AuthorizationContext::for_owner(
                    "alice",
                    AccessTarget::Ticket {
                        vault_id,
                        ticket_id: ticket.ticket_id,
                    },
                    &ticket.sealed,
                    START,
                );
                amounts.push(self.decryption.request(&ticket.sealed, &context).await.unwrap());
            }
            amounts
        }
    }

    #[tokio::test]
    async fn swaps_and_settles_merged_proceeds() {
        let h = Harness::new().await;
        let worker = h.worker(0).await;
        let vault_id = h.vault("SUI", &[600, 400]).await;
        let intent_id = h.intent(vault_id, "USDC", 1_900, OutputMode::Merged);

        let outcome = worker.process_intent(intent_id).await.unwrap();
        let ProcessOutcome::Settled(receipt) = outcome else {
            panic!("expected settlement, got {outcome:?}");
        };
        assert_eq!(receipt.new_ticket_ids.len(), 1);

        let tickets = h.t.ledger.tickets(vault_id).unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].asset, AssetId::from("USDC"));
        let realized = h.open(vault_id).await[0];
        assert!(realized >= 1_900);

        assert_eq!(h.t.ledger.pool_balance(&"SUI".into()).unwrap(), 0);
        assert_eq!(h.t.ledger.pool_balance(&"USDC".into()).unwrap(), realized);
        assert_eq!(
            h.t.ledger.intent_view(intent_id).unwrap().status,
            IntentStatus::Settled
        );
    }

    #[tokio::test]
    async fn per_ticket_mode_splits_pro_rata() {
        let h = Harness::new().await;
        let worker = h.worker(0).await;
        let vault_id = h.vault("USDC", &[300, 100]).await;
        let intent_id = h.intent(vault_id, "USDC", 400, OutputMode::PerTicket);

        assert!(matches!(
            worker.process_intent(intent_id).await.unwrap(),
            ProcessOutcome::Settled(_)
        ));
        let mut amounts = h.open(vault_id).await;
        amounts.sort_unstable();
        assert_eq!(amounts, vec![100, 300]);
    }

    #[tokio::test]
    async fn quote_below_minimum_leaves_intent_pending() {
        let h = Harness::new().await;
        let worker = h.worker(0).await;
        let vault_id = h.vault("SUI", &[1_000]).await;
        let intent_id = h.intent(vault_id, "USDC", 1_000_000, OutputMode::Merged);

        let err = worker.process_intent(intent_id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Venue(VenueError::Failure(SwapFailure::SlippageExceeded))
        ));
        assert!(h.t.ledger.is_pending(intent_id).unwrap());
        assert_eq!(h.t.ledger.tickets(vault_id).unwrap().len(), 1);
        assert_eq!(h.venue.reserve(&"SUI".into(), &"USDC".into()).await, Some(1_000_000));
    }

    #[tokio::test]
    async fn short_fill_below_minimum_is_not_settled() {
        let h = Harness::new().await;
        let worker = h.worker_on(0, Arc::new(ShortFillVenue)).await;
        let vault_id = h.vault("SUI", &[600, 400]).await;
        let intent_id = h.intent(vault_id, "USDC", 1_900, OutputMode::Merged);
        let tickets_before = h.t.ledger.tickets(vault_id).unwrap();

        let err = worker.process_intent(intent_id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Invariant(InvariantViolation::Slippage {
                realized_out: 1_899,
                min_out: 1_900
            })
        ));
        assert_eq!(err.category(), ErrorCategory::Invariant);

        assert!(h.t.ledger.is_pending(intent_id).unwrap());
        assert_eq!(h.t.ledger.intent_view(intent_id).unwrap().status, IntentStatus::Pending);
        assert_eq!(h.t.ledger.tickets(vault_id).unwrap(), tickets_before);
        assert_eq!(h.t.ledger.pool_balance(&"SUI".into()).unwrap(), 1_000);
        assert_eq!(h.t.ledger.pool_balance(&"USDC".into()).unwrap(), 0);
        assert!(!h
            .t
            .ledger
            .audit_events(0, 100)
            .unwrap()
            .iter()
            .any(|e| matches!(e.kind, AuditEventType::IntentSettled | AuditEventType::SettlementRejected)));
    }

    #[tokio::test]
    async fn retries_stop_at_the_intent_deadline() {
        let h = Harness::new().await;
        let slow = RetryPolicy {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(30),
            multiplier: 1,
            max_attempts: 100,
        };
        let worker = h.worker_with(0, Arc::new(DownVenue), slow).await;
        let vault_id = h.vault("SUI", &[500]).await;
        let intent_id = h.intent(vault_id, "USDC", 1, OutputMode::Merged);
        h.t.clock.set(START + 599);

        let started = std::time::Instant::now();
        worker
            .handle(PendingIntent {
                intent_id,
                deadline: START + 600,
            })
            .await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(h.t.ledger.is_pending(intent_id).unwrap());
        assert_eq!(h.t.ledger.tickets(vault_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn custodian_outage_is_transient_and_changes_nothing() {
        let h = Harness::new().await;
        let worker = h.worker(0).await;
        let vault_id = h.vault("SUI", &[500]).await;
        let intent_id = h.intent(vault_id, "USDC", 1, OutputMode::Merged);

        h.decryption.set_custodian_online(0, false);
        h.decryption.set_custodian_online(1, false);

        let err = worker.process_intent(intent_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Decrypt(DecryptError::Transient(_))));
        assert_eq!(err.category(), ErrorCategory::Transient);
        assert!(h.t.ledger.is_pending(intent_id).unwrap());

        h.decryption.set_custodian_online(1, true);
        assert!(matches!(
            worker.process_intent(intent_id).await.unwrap(),
            ProcessOutcome::Settled(_)
        ));
    }

    #[tokio::test]
    async fn unregistered_worker_is_denied() {
        let h = Harness::new().await;
        let vault_id = h.vault("SUI", &[500]).await;
        let intent_id = h.intent(vault_id, "USDC", 1, OutputMode::Merged);
        let rogue = ConfidentialWorker::new(
            9,
            h.t.ledger.clone(),
            h.decryption.clone(),
            h.venue.clone(),
            WorkerSigner::generate(),
            WorkerConfig::default(),
        );

        let err = rogue.process_intent(intent_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::Decrypt(DecryptError::Denied(_))));
        assert!(h.t.ledger.is_pending(intent_id).unwrap());
    }

    #[tokio::test]
    async fn second_replica_loses_the_race() {
        let h = Harness::new().await;
        let first = h.worker(0).await;
        let second = h.worker(1).await;
        let vault_id = h.vault("USDC", &[250]).await;
        let intent_id = h.intent(vault_id, "USDC", 250, OutputMode::Merged);

        let late = second.prepare_settlement(intent_id).await.unwrap();
        assert!(matches!(
            first.process_intent(intent_id).await.unwrap(),
            ProcessOutcome::Settled(_)
        ));
        assert_eq!(second.submit(&late).await.unwrap(), ProcessOutcome::LostRace);
        assert_eq!(
            second.process_intent(intent_id).await.unwrap(),
            ProcessOutcome::AlreadyFinalized
        );
        assert_eq!(h.open(vault_id).await, vec![250]);
    }

    #[tokio::test]
    async fn refuses_work_after_deadline() {
        let h = Harness::new().await;
        let worker = h.worker(0).await;
        let vault_id = h.vault("USDC", &[10]).await;
        let intent_id = h.intent(vault_id, "USDC", 10, OutputMode::Merged);
        h.t.clock.advance(601);

        let err = worker.process_intent(intent_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::DeadlinePassed { .. }));
        assert!(h.t.ledger.is_pending(intent_id).unwrap());
    }
}
