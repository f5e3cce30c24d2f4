// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger
//!
//! The authoritative, linearizable side of the system: vaults of sealed
//! tickets, the custody pool of real balances, the pending-intent registry
//! and the attestation records that authorize settlements.
//!
//! Every mutating call runs as exactly one redb write transaction. Checks and
//! writes inside that transaction either all take effect or none do, which is
//! the only coordination worker replicas rely on.
//!
//! ## Invariants
//!
//! - A ticket is deleted at most once, by `unwrap` or by the settlement of
//!   the single pending intent that encumbers it.
//! - An intent leaves the pending set exactly once, by a verified settlement
//!   or by expiry.
//! - `pool[asset]` never goes below zero; settlement debits the real input
//!   it consumes and credits the real output it realized.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::attestation::AttestationPolicy;
use crate::clock::Clock;
use crate::storage::{AuditEvent, LedgerDb, LedgerRead, LedgerSnapshot};

pub mod error;
mod intents;
mod settlement;
mod types;
mod vault;

pub use error::{InvariantViolation, LedgerError, LedgerResult};
pub use intents::CreateIntent;
pub use settlement::{SettlementReceipt, SettlementRequest};
pub use types::{
    AccessScope, Amount, AssetId, IntentId, IntentOutcome, IntentRecord, IntentStatus,
    IntentView, OutputMode, PendingIntent, RecordId, SealedAmount, TicketId, TicketOrigin,
    TicketRecord, VaultId, VaultRecord,
};

/// Deployment-level ledger settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Namespace bound into every ciphertext scope of this deployment.
    pub namespace: String,
    pub attestation: AttestationPolicy,
}

pub struct Ledger {
    db: LedgerDb,
    clock: Arc<dyn Clock>,
    namespace: String,
    attestation: AttestationPolicy,
    intent_notify: Notify,
}

impl Ledger {
    pub fn open(path: &Path, config: LedgerConfig, clock: Arc<dyn Clock>) -> LedgerResult<Self> {
        let db = LedgerDb::open(path)?;
        tracing::info!(
            path = %path.display(),
            namespace = %config.namespace,
            "Opened ledger"
        );
        Ok(Self {
            db,
            clock,
            namespace: config.namespace,
            attestation: config.attestation,
            intent_notify: Notify::new(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Ledger time, unix seconds.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Scope new ciphertexts of `vault_id` must carry.
    pub fn scope_for(&self, vault_id: VaultId) -> AccessScope {
        AccessScope::new(self.namespace.clone(), vault_id)
    }

    /// Resolves after the next `create_intent` commits.
    pub fn intent_notified(&self) -> Notified<'_> {
        self.intent_notify.notified()
    }

    /// Run `f` against one consistent snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&LedgerSnapshot) -> LedgerResult<R>) -> LedgerResult<R> {
        self.db.read(f)
    }

    pub fn pool_balance(&self, asset: &AssetId) -> LedgerResult<Amount> {
        self.db.read(|s| s.pool_balance(asset))
    }

    pub fn pool_balances(&self) -> LedgerResult<Vec<(AssetId, Amount)>> {
        self.db.read(|s| s.pool_balances())
    }

    pub fn audit_events(&self, offset: usize, limit: usize) -> LedgerResult<Vec<AuditEvent>> {
        self.db.read(|s| s.audit_events(offset, limit))
    }

    pub(crate) fn db(&self) -> &LedgerDb {
        &self.db
    }

    pub(crate) fn attestation_policy(&self) -> &AttestationPolicy {
        &self.attestation
    }

    pub(crate) fn notify_intent_created(&self) {
        self.intent_notify.notify_waiters();
    }

    /// Record a rejected operation in its own transaction. Audit failures are
    /// logged, never surfaced over the original rejection.
    pub(crate) fn record_rejection(&self, event: AuditEvent) {
        if let Err(e) = self.db.write(|t| t.append_audit(&event)) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::attestation::MockAttestationSource;
    use crate::auth::{AuthenticatedPrincipal, Role};
    use crate::clock::ManualClock;

    pub const NAMESPACE: &str = "test-deployment";
    pub const START: u64 = 1_700_000_000;

    /// Ledger over a temp redb file with a manual clock and mock attestation root.
    pub struct TestLedger {
        pub ledger: Arc<Ledger>,
        pub clock: Arc<ManualClock>,
        pub attestation: MockAttestationSource,
        _dir: TempDir,
    }

    impl TestLedger {
        pub fn new() -> Self {
            Self::with_allowlist(Vec::new())
        }

        pub fn with_allowlist(allowed: Vec<String>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let clock = Arc::new(ManualClock::new(START));
            let attestation = MockAttestationSource::new();
            let config = LedgerConfig {
                namespace: NAMESPACE.to_string(),
                attestation: AttestationPolicy::new(attestation.root_of_trust(), allowed).unwrap(),
            };
            let ledger = Ledger::open(&dir.path().join("ledger.redb"), config, clock.clone()).unwrap();
            Self {
                ledger: Arc::new(ledger),
                clock,
                attestation,
                _dir: dir,
            }
        }

        /// Vault owned by `owner` holding one deposit ticket per amount.
        pub fn funded_vault(
            &self,
            owner: &AuthenticatedPrincipal,
            asset: &str,
            amounts: &[Amount],
        ) -> (VaultId, Vec<TicketId>) {
            let vault = self.ledger.create_vault(owner).unwrap();
            let tickets = amounts
                .iter()
                .map(|amount| {
                    self.ledger
                        .deposit(
                            owner,
                            vault.vault_id,
                            &AssetId::from(asset),
                            *amount,
                            self.sealed(vault.vault_id, *amount),
                        )
                        .unwrap()
                        .ticket_id
                })
                .collect();
            (vault.vault_id, tickets)
        }

        /// Placeholder ciphertext in the deployment scope.
        pub fn sealed(&self, vault_id: VaultId, amount: Amount) -> SealedAmount {
            SealedAmount::new(self.ledger.scope_for(vault_id), amount.to_be_bytes().to_vec())
        }
    }

    pub fn owner(id: &str) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal::new(id, Role::Client)
    }
}
