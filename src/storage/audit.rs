// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for ledger mutations.
//!
//! Successful mutations append their event inside the same write transaction
//! as the mutation itself, so the trail and the ledger never disagree.
//! Rejected settlements and registrations are recorded in a separate
//! transaction as failed events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    VaultCreated,
    Deposit,
    Unwrap,

    IntentCreated,
    IntentSettled,
    IntentExpired,
    SettlementRejected,

    WorkerRegistered,
    WorkerRejected,
    WorkerDeactivated,
}

/// Ledger object an event is about, e.g. `intent/12`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditResource {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Position in the trail, assigned on append; strictly increasing.
    #[serde(default)]
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub kind: AuditEventType,
    /// Principal id or worker public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<AuditResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(kind: AuditEventType) -> Self {
        Self {
            sequence: 0,
            recorded_at: Utc::now(),
            kind,
            actor: None,
            resource: None,
            details: None,
            outcome: AuditOutcome::Succeeded,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource = Some(AuditResource {
            kind: kind.into(),
            id: id.into(),
        });
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failed {
            reason: reason.into(),
        };
        self
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AuditOutcome::Succeeded
    }

    pub(crate) fn sequenced(&self, sequence: u64) -> Self {
        Self {
            sequence,
            ..self.clone()
        }
    }
}
