// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger store backed by redb (pure Rust, ACID).
//!
//! redb admits a single writer at a time and commits atomically, so every
//! mutating ledger call is one write transaction and observes a total order.
//! A closure that returns an error aborts its transaction: nothing it wrote
//! becomes visible.
//!
//! ## Table Layout
//!
//! - `vaults`: vault_id → VaultRecord (JSON)
//! - `tickets`: (vault_id, ticket_id) → TicketRecord (JSON)
//! - `ticket_locks`: (vault_id, ticket_id) → intent_id encumbering the ticket
//! - `pool`: asset → real custody balance
//! - `intents`: intent_id → IntentRecord (JSON)
//! - `pending`: intent_id → deadline (the pending set)
//! - `intent_outcomes`: intent_id → IntentOutcome (JSON)
//! - `attestations`: record_id → AttestationRecord (JSON)
//! - `worker_keys`: hex public key → latest record_id
//! - `counters`: name → last issued id
//! - `audit`: sequence → AuditEvent (JSON)

use std::path::Path;

use redb::{
    AccessGuard, Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, Table,
    TableDefinition, WriteTransaction,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::attestation::AttestationRecord;
use crate::ledger::{
    Amount, AssetId, IntentId, IntentOutcome, IntentRecord, InvariantViolation, LedgerError,
    LedgerResult, PendingIntent, RecordId, TicketId, TicketRecord, VaultId, VaultRecord,
};

use super::audit::AuditEvent;

// =============================================================================
// Table Definitions
// =============================================================================

const VAULTS: TableDefinition<u64, &[u8]> = TableDefinition::new("vaults");

const TICKETS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("tickets");

/// Present only while a pending intent references the ticket.
const TICKET_LOCKS: TableDefinition<(u64, u64), u64> = TableDefinition::new("ticket_locks");

const POOL: TableDefinition<&str, u64> = TableDefinition::new("pool");

const INTENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("intents");

/// The pending set. Removal happens exactly once, by settlement or expiry.
const PENDING: TableDefinition<u64, u64> = TableDefinition::new("pending");

const INTENT_OUTCOMES: TableDefinition<u64, &[u8]> = TableDefinition::new("intent_outcomes");

const ATTESTATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("attestations");

const WORKER_KEYS: TableDefinition<&str, u64> = TableDefinition::new("worker_keys");

const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

const AUDIT: TableDefinition<u64, &[u8]> = TableDefinition::new("audit");

pub(crate) const VAULT_COUNTER: &str = "vault";
pub(crate) const INTENT_COUNTER: &str = "intent";
pub(crate) const ATTESTATION_COUNTER: &str = "attestation";
const AUDIT_COUNTER: &str = "audit";

// =============================================================================
// Encoding Helpers
// =============================================================================

pub(crate) fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(
    guard: Option<AccessGuard<'_, &'static [u8]>>,
) -> LedgerResult<Option<T>> {
    match guard {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

// =============================================================================
// Read Access (shared by snapshots and write transactions)
// =============================================================================

/// Typed reads over either a read snapshot or an open write transaction.
pub trait LedgerRead {
    type Json: ReadableTable<u64, &'static [u8]>;
    type TicketTable: ReadableTable<(u64, u64), &'static [u8]>;
    type LockTable: ReadableTable<(u64, u64), u64>;
    type IdTable: ReadableTable<u64, u64>;
    type NameTable: ReadableTable<&'static str, u64>;

    fn vaults_table(&self) -> &Self::Json;
    fn tickets_table(&self) -> &Self::TicketTable;
    fn locks_table(&self) -> &Self::LockTable;
    fn pool_table(&self) -> &Self::NameTable;
    fn intents_table(&self) -> &Self::Json;
    fn pending_table(&self) -> &Self::IdTable;
    fn outcomes_table(&self) -> &Self::Json;
    fn attestations_table(&self) -> &Self::Json;
    fn worker_keys_table(&self) -> &Self::NameTable;
    fn audit_table(&self) -> &Self::Json;

    fn vault(&self, vault_id: VaultId) -> LedgerResult<Option<VaultRecord>> {
        decode(self.vaults_table().get(vault_id)?)
    }

    fn ticket(&self, vault_id: VaultId, ticket_id: TicketId) -> LedgerResult<Option<TicketRecord>> {
        decode(self.tickets_table().get((vault_id, ticket_id))?)
    }

    /// All outstanding tickets of a vault, ordered by ticket id.
    fn tickets_in_vault(&self, vault_id: VaultId) -> LedgerResult<Vec<TicketRecord>> {
        let mut tickets = Vec::new();
        for entry in self.tickets_table().range((vault_id, 0)..=(vault_id, u64::MAX))? {
            let (_, value) = entry?;
            tickets.push(serde_json::from_slice(value.value())?);
        }
        Ok(tickets)
    }

    fn ticket_lock(&self, vault_id: VaultId, ticket_id: TicketId) -> LedgerResult<Option<IntentId>> {
        Ok(self
            .locks_table()
            .get((vault_id, ticket_id))?
            .map(|v| v.value()))
    }

    fn pool_balance(&self, asset: &AssetId) -> LedgerResult<Amount> {
        Ok(self
            .pool_table()
            .get(asset.as_str())?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn pool_balances(&self) -> LedgerResult<Vec<(AssetId, Amount)>> {
        let mut balances = Vec::new();
        for entry in self.pool_table().iter()? {
            let (asset, amount) = entry?;
            balances.push((AssetId::new(asset.value()), amount.value()));
        }
        Ok(balances)
    }

    fn intent(&self, intent_id: IntentId) -> LedgerResult<Option<IntentRecord>> {
        decode(self.intents_table().get(intent_id)?)
    }

    /// Deadline of a pending intent, `None` when not in the pending set.
    fn pending_deadline(&self, intent_id: IntentId) -> LedgerResult<Option<u64>> {
        Ok(self.pending_table().get(intent_id)?.map(|v| v.value()))
    }

    fn pending(&self) -> LedgerResult<Vec<PendingIntent>> {
        let mut pending = Vec::new();
        for entry in self.pending_table().iter()? {
            let (intent_id, deadline) = entry?;
            pending.push(PendingIntent {
                intent_id: intent_id.value(),
                deadline: deadline.value(),
            });
        }
        Ok(pending)
    }

    fn outcome(&self, intent_id: IntentId) -> LedgerResult<Option<IntentOutcome>> {
        decode(self.outcomes_table().get(intent_id)?)
    }

    fn attestation(&self, record_id: RecordId) -> LedgerResult<Option<AttestationRecord>> {
        decode(self.attestations_table().get(record_id)?)
    }

    /// Latest attestation record registered for a hex public key.
    fn record_for_key(&self, public_key: &str) -> LedgerResult<Option<AttestationRecord>> {
        let record_id = match self.worker_keys_table().get(public_key)? {
            Some(v) => v.value(),
            None => return Ok(None),
        };
        self.attestation(record_id)
    }

    /// Newest-first page of audit events.
    fn audit_events(&self, offset: usize, limit: usize) -> LedgerResult<Vec<AuditEvent>> {
        let mut events = Vec::with_capacity(limit);
        for entry in self.audit_table().iter()?.rev().skip(offset).take(limit) {
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }
}

// =============================================================================
// Snapshot (read transaction)
// =============================================================================

/// Consistent point-in-time view of the ledger.
pub struct LedgerSnapshot {
    vaults: ReadOnlyTable<u64, &'static [u8]>,
    tickets: ReadOnlyTable<(u64, u64), &'static [u8]>,
    ticket_locks: ReadOnlyTable<(u64, u64), u64>,
    pool: ReadOnlyTable<&'static str, u64>,
    intents: ReadOnlyTable<u64, &'static [u8]>,
    pending: ReadOnlyTable<u64, u64>,
    outcomes: ReadOnlyTable<u64, &'static [u8]>,
    attestations: ReadOnlyTable<u64, &'static [u8]>,
    worker_keys: ReadOnlyTable<&'static str, u64>,
    audit: ReadOnlyTable<u64, &'static [u8]>,
}

impl LedgerSnapshot {
    fn open(txn: &ReadTransaction) -> LedgerResult<Self> {
        Ok(Self {
            vaults: txn.open_table(VAULTS)?,
            tickets: txn.open_table(TICKETS)?,
            ticket_locks: txn.open_table(TICKET_LOCKS)?,
            pool: txn.open_table(POOL)?,
            intents: txn.open_table(INTENTS)?,
            pending: txn.open_table(PENDING)?,
            outcomes: txn.open_table(INTENT_OUTCOMES)?,
            attestations: txn.open_table(ATTESTATIONS)?,
            worker_keys: txn.open_table(WORKER_KEYS)?,
            audit: txn.open_table(AUDIT)?,
        })
    }
}

impl LedgerRead for LedgerSnapshot {
    type Json = ReadOnlyTable<u64, &'static [u8]>;
    type TicketTable = ReadOnlyTable<(u64, u64), &'static [u8]>;
    type LockTable = ReadOnlyTable<(u64, u64), u64>;
    type IdTable = ReadOnlyTable<u64, u64>;
    type NameTable = ReadOnlyTable<&'static str, u64>;

    fn vaults_table(&self) -> &Self::Json {
        &self.vaults
    }
    fn tickets_table(&self) -> &Self::TicketTable {
        &self.tickets
    }
    fn locks_table(&self) -> &Self::LockTable {
        &self.ticket_locks
    }
    fn pool_table(&self) -> &Self::NameTable {
        &self.pool
    }
    fn intents_table(&self) -> &Self::Json {
        &self.intents
    }
    fn pending_table(&self) -> &Self::IdTable {
        &self.pending
    }
    fn outcomes_table(&self) -> &Self::Json {
        &self.outcomes
    }
    fn attestations_table(&self) -> &Self::Json {
        &self.attestations
    }
    fn worker_keys_table(&self) -> &Self::NameTable {
        &self.worker_keys
    }
    fn audit_table(&self) -> &Self::Json {
        &self.audit
    }
}

// =============================================================================
// Write Transaction Tables
// =============================================================================

/// Every table opened inside one write transaction.
pub struct LedgerTables<'txn> {
    vaults: Table<'txn, u64, &'static [u8]>,
    tickets: Table<'txn, (u64, u64), &'static [u8]>,
    ticket_locks: Table<'txn, (u64, u64), u64>,
    pool: Table<'txn, &'static str, u64>,
    intents: Table<'txn, u64, &'static [u8]>,
    pending: Table<'txn, u64, u64>,
    outcomes: Table<'txn, u64, &'static [u8]>,
    attestations: Table<'txn, u64, &'static [u8]>,
    worker_keys: Table<'txn, &'static str, u64>,
    counters: Table<'txn, &'static str, u64>,
    audit: Table<'txn, u64, &'static [u8]>,
}

impl<'txn> LedgerTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> LedgerResult<Self> {
        Ok(Self {
            vaults: txn.open_table(VAULTS)?,
            tickets: txn.open_table(TICKETS)?,
            ticket_locks: txn.open_table(TICKET_LOCKS)?,
            pool: txn.open_table(POOL)?,
            intents: txn.open_table(INTENTS)?,
            pending: txn.open_table(PENDING)?,
            outcomes: txn.open_table(INTENT_OUTCOMES)?,
            attestations: txn.open_table(ATTESTATIONS)?,
            worker_keys: txn.open_table(WORKER_KEYS)?,
            counters: txn.open_table(COUNTERS)?,
            audit: txn.open_table(AUDIT)?,
        })
    }

    /// Issue the next id of a named sequence. Ids start at 1.
    pub fn next_id(&mut self, counter: &str) -> LedgerResult<u64> {
        let next = self
            .counters
            .get(counter)?
            .map(|v| v.value())
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(InvariantViolation::Overflow("id counter"))?;
        self.counters.insert(counter, next)?;
        Ok(next)
    }

    pub fn put_vault(&mut self, vault: &VaultRecord) -> LedgerResult<()> {
        let json = encode(vault)?;
        self.vaults.insert(vault.vault_id, json.as_slice())?;
        Ok(())
    }

    pub fn put_ticket(&mut self, ticket: &TicketRecord) -> LedgerResult<()> {
        let json = encode(ticket)?;
        self.tickets
            .insert((ticket.vault_id, ticket.ticket_id), json.as_slice())?;
        Ok(())
    }

    /// Delete a ticket, returning whether it existed.
    pub fn remove_ticket(&mut self, vault_id: VaultId, ticket_id: TicketId) -> LedgerResult<bool> {
        Ok(self.tickets.remove((vault_id, ticket_id))?.is_some())
    }

    pub fn lock_ticket(
        &mut self,
        vault_id: VaultId,
        ticket_id: TicketId,
        intent_id: IntentId,
    ) -> LedgerResult<()> {
        self.ticket_locks.insert((vault_id, ticket_id), intent_id)?;
        Ok(())
    }

    pub fn unlock_ticket(&mut self, vault_id: VaultId, ticket_id: TicketId) -> LedgerResult<()> {
        self.ticket_locks.remove((vault_id, ticket_id))?;
        Ok(())
    }

    pub fn credit_pool(&mut self, asset: &AssetId, amount: Amount) -> LedgerResult<Amount> {
        let balance = self
            .pool_balance(asset)?
            .checked_add(amount)
            .ok_or(InvariantViolation::Overflow("pool balance"))?;
        self.pool.insert(asset.as_str(), balance)?;
        Ok(balance)
    }

    /// Withdraw real assets from custody, refusing to go below zero.
    pub fn debit_pool(&mut self, asset: &AssetId, amount: Amount) -> LedgerResult<Amount> {
        let available = self.pool_balance(asset)?;
        let balance = available.checked_sub(amount).ok_or_else(|| {
            InvariantViolation::Insolvent {
                asset: asset.clone(),
                available,
                required: amount,
            }
        })?;
        self.pool.insert(asset.as_str(), balance)?;
        Ok(balance)
    }

    pub fn put_intent(&mut self, intent: &IntentRecord) -> LedgerResult<()> {
        let json = encode(intent)?;
        self.intents.insert(intent.intent_id, json.as_slice())?;
        Ok(())
    }

    pub fn insert_pending(&mut self, intent_id: IntentId, deadline: u64) -> LedgerResult<()> {
        self.pending.insert(intent_id, deadline)?;
        Ok(())
    }

    /// Assert membership in the pending set and remove it in one step.
    pub fn take_pending(&mut self, intent_id: IntentId) -> LedgerResult<u64> {
        let removed = self.pending.remove(intent_id)?.map(|v| v.value());
        match removed {
            Some(deadline) => Ok(deadline),
            None => Err(self.not_pending_error(intent_id)?),
        }
    }

    /// `NotPending` for a finalized intent, `NotFound` for an unknown one.
    pub fn not_pending_error(&self, intent_id: IntentId) -> LedgerResult<LedgerError> {
        if self.outcomes.get(intent_id)?.is_some() {
            Ok(LedgerError::NotPending { intent_id })
        } else {
            Ok(LedgerError::not_found("intent", intent_id))
        }
    }

    pub fn put_outcome(&mut self, outcome: &IntentOutcome) -> LedgerResult<()> {
        let json = encode(outcome)?;
        self.outcomes.insert(outcome.intent_id, json.as_slice())?;
        Ok(())
    }

    pub fn put_attestation(&mut self, record: &AttestationRecord) -> LedgerResult<()> {
        let json = encode(record)?;
        self.attestations.insert(record.record_id, json.as_slice())?;
        self.worker_keys
            .insert(record.public_key.as_str(), record.record_id)?;
        Ok(())
    }

    pub fn append_audit(&mut self, event: &AuditEvent) -> LedgerResult<()> {
        let seq = self.next_id(AUDIT_COUNTER)?;
        let json = encode(&event.sequenced(seq))?;
        self.audit.insert(seq, json.as_slice())?;
        Ok(())
    }
}

impl<'txn> LedgerRead for LedgerTables<'txn> {
    type Json = Table<'txn, u64, &'static [u8]>;
    type TicketTable = Table<'txn, (u64, u64), &'static [u8]>;
    type LockTable = Table<'txn, (u64, u64), u64>;
    type IdTable = Table<'txn, u64, u64>;
    type NameTable = Table<'txn, &'static str, u64>;

    fn vaults_table(&self) -> &Self::Json {
        &self.vaults
    }
    fn tickets_table(&self) -> &Self::TicketTable {
        &self.tickets
    }
    fn locks_table(&self) -> &Self::LockTable {
        &self.ticket_locks
    }
    fn pool_table(&self) -> &Self::NameTable {
        &self.pool
    }
    fn intents_table(&self) -> &Self::Json {
        &self.intents
    }
    fn pending_table(&self) -> &Self::IdTable {
        &self.pending
    }
    fn outcomes_table(&self) -> &Self::Json {
        &self.outcomes
    }
    fn attestations_table(&self) -> &Self::Json {
        &self.attestations
    }
    fn worker_keys_table(&self) -> &Self::NameTable {
        &self.worker_keys
    }
    fn audit_table(&self) -> &Self::Json {
        &self.audit
    }
}

// =============================================================================
// LedgerDb
// =============================================================================

/// Embedded ACID ledger database.
pub struct LedgerDb {
    db: Database,
}

impl LedgerDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(VAULTS)?;
            let _ = write_txn.open_table(TICKETS)?;
            let _ = write_txn.open_table(TICKET_LOCKS)?;
            let _ = write_txn.open_table(POOL)?;
            let _ = write_txn.open_table(INTENTS)?;
            let _ = write_txn.open_table(PENDING)?;
            let _ = write_txn.open_table(INTENT_OUTCOMES)?;
            let _ = write_txn.open_table(ATTESTATIONS)?;
            let _ = write_txn.open_table(WORKER_KEYS)?;
            let _ = write_txn.open_table(COUNTERS)?;
            let _ = write_txn.open_table(AUDIT)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Run `f` inside one write transaction; commit on `Ok`, abort on `Err`.
    pub fn write<R>(
        &self,
        f: impl FnOnce(&mut LedgerTables<'_>) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut tables = LedgerTables::open(&write_txn)?;
            f(&mut tables)
        };
        match result {
            Ok(value) => {
                write_txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort ledger transaction");
                }
                Err(err)
            }
        }
    }

    /// Run `f` against a consistent snapshot.
    pub fn read<R>(&self, f: impl FnOnce(&LedgerSnapshot) -> LedgerResult<R>) -> LedgerResult<R> {
        let read_txn = self.db.begin_read()?;
        let snapshot = LedgerSnapshot::open(&read_txn)?;
        f(&snapshot)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccessScope, SealedAmount, TicketOrigin};

    fn temp_db() -> (LedgerDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerDb::open(&dir.path().join("ledger.redb")).unwrap();
        (db, dir)
    }

    fn sample_ticket(vault_id: VaultId, ticket_id: TicketId) -> TicketRecord {
        TicketRecord {
            vault_id,
            ticket_id,
            asset: AssetId::from("SUI"),
            sealed: SealedAmount::new(AccessScope::new("test", vault_id), vec![ticket_id as u8]),
            origin: TicketOrigin::Deposit,
            created_at: 1,
        }
    }

    #[test]
    fn counters_are_monotonic_per_name() {
        let (db, _dir) = temp_db();
        let ids = db
            .write(|t| Ok((t.next_id("a")?, t.next_id("a")?, t.next_id("b")?)))
            .unwrap();
        assert_eq!(ids, (1, 2, 1));
    }

    #[test]
    fn failed_closure_leaves_no_partial_writes() {
        let (db, _dir) = temp_db();
        let result: LedgerResult<()> = db.write(|t| {
            t.credit_pool(&AssetId::from("SUI"), 50)?;
            Err(LedgerError::Validation("boom".into()))
        });
        assert!(result.is_err());

        let balance = db.read(|s| s.pool_balance(&AssetId::from("SUI"))).unwrap();
        assert_eq!(balance, 0);
    }

    #[test]
    fn debit_below_zero_is_insolvent() {
        let (db, _dir) = temp_db();
        let asset = AssetId::from("USDC");
        db.write(|t| t.credit_pool(&asset, 10)).unwrap();

        let err = db.write(|t| t.debit_pool(&asset, 11)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Invariant(InvariantViolation::Insolvent { available: 10, required: 11, .. })
        ));
        assert_eq!(db.read(|s| s.pool_balance(&asset)).unwrap(), 10);
    }

    #[test]
    fn tickets_in_vault_scans_only_that_vault() {
        let (db, _dir) = temp_db();
        db.write(|t| {
            t.put_ticket(&sample_ticket(1, 2))?;
            t.put_ticket(&sample_ticket(1, 1))?;
            t.put_ticket(&sample_ticket(2, 1))
        })
        .unwrap();

        let tickets = db.read(|s| s.tickets_in_vault(1)).unwrap();
        let ids: Vec<_> = tickets.iter().map(|t| t.ticket_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn take_pending_distinguishes_unknown_from_finalized() {
        let (db, _dir) = temp_db();
        db.write(|t| t.insert_pending(7, 100)).unwrap();

        assert_eq!(db.write(|t| t.take_pending(7)).unwrap(), 100);

        let unknown = db.write(|t| t.take_pending(8)).unwrap_err();
        assert!(matches!(unknown, LedgerError::NotFound { .. }));

        db.write(|t| {
            t.put_outcome(&IntentOutcome {
                intent_id: 7,
                status: crate::ledger::IntentStatus::Expired,
                finalized_at: 1,
                settled_by: None,
                realized_out: None,
                new_ticket_ids: vec![],
                venue_receipt: None,
            })
        })
        .unwrap();
        let finalized = db.write(|t| t.take_pending(7)).unwrap_err();
        assert!(matches!(finalized, LedgerError::NotPending { intent_id: 7 }));
    }

    #[test]
    fn audit_events_are_newest_first() {
        let (db, _dir) = temp_db();
        db.write(|t| {
            for i in 0..3u64 {
                t.append_audit(
                    &AuditEvent::new(super::super::audit::AuditEventType::VaultCreated)
                        .with_resource("vault", i.to_string()),
                )?;
            }
            Ok(())
        })
        .unwrap();

        let page = db.read(|s| s.audit_events(0, 2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].resource.as_ref().unwrap().id, "2");
        assert_eq!(page[1].resource.as_ref().unwrap().id, "1");
        assert!(page[0].sequence > page[1].sequence);
    }
}
