// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger error type.

use crate::attestation::AttestationError;
use crate::error::ErrorCategory;

use super::types::{Amount, AssetId, IntentId, TicketId, VaultId};

/// Financial invariants a transaction refused to break.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("realized output {realized_out} is below the minimum {min_out}")]
    Slippage { realized_out: Amount, min_out: Amount },

    #[error("pool holds {available} of {asset}, {required} required")]
    Insolvent {
        asset: AssetId,
        available: Amount,
        required: Amount,
    },

    #[error("arithmetic overflow on {0}")]
    Overflow(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{principal} may not {action}")]
    PermissionDenied { principal: String, action: String },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("ticket {ticket_id} in vault {vault_id} is encumbered by intent {intent_id}")]
    TicketEncumbered {
        vault_id: VaultId,
        ticket_id: TicketId,
        intent_id: IntentId,
    },

    #[error("intent {intent_id} is no longer pending")]
    NotPending { intent_id: IntentId },

    #[error("deadline {deadline} of intent {intent_id} has not passed")]
    DeadlineNotReached { intent_id: IntentId, deadline: u64 },

    #[error("deadline {deadline} of intent {intent_id} has passed")]
    DeadlinePassed { intent_id: IntentId, deadline: u64 },

    #[error("settlement rejected: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Attestation(#[from] AttestationError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::Redb(_)
            | LedgerError::RedbDatabase(_)
            | LedgerError::RedbStorage(_)
            | LedgerError::RedbCommit(_) => ErrorCategory::Transient,
            LedgerError::RedbTransaction(_)
            | LedgerError::RedbTable(_)
            | LedgerError::Serde(_) => ErrorCategory::Internal,
            LedgerError::NotFound { .. }
            | LedgerError::Validation(_)
            | LedgerError::TicketEncumbered { .. }
            | LedgerError::DeadlineNotReached { .. }
            | LedgerError::DeadlinePassed { .. } => ErrorCategory::Validation,
            LedgerError::PermissionDenied { .. } | LedgerError::Unauthorized(_) => {
                ErrorCategory::Authorization
            }
            LedgerError::NotPending { .. } => ErrorCategory::Conflict,
            LedgerError::Invariant(_) => ErrorCategory::Invariant,
            LedgerError::Attestation(e) => e.category(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}
