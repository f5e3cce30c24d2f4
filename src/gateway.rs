// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization gateway consulted by decryption custodians.
//!
//! Evaluation is a pure function of the request and one ledger snapshot, so
//! independent custodians evaluating the same request against the same state
//! reach the same decision.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attestation::{normalize_public_key, AttestationRecord};
use crate::ledger::{AccessScope, Ledger, LedgerResult, TicketId, VaultId, VaultRecord};
use crate::storage::LedgerRead;

/// Who is asking for plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requester {
    /// Authenticated vault owner.
    Owner { principal_id: String },
    /// Attested worker, identified by its SEC1 hex public key.
    Worker { public_key: String },
}

/// What is being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessTarget {
    Vault { vault_id: VaultId },
    Ticket { vault_id: VaultId, ticket_id: TicketId },
}

impl AccessTarget {
    pub fn vault_id(&self) -> VaultId {
        match self {
            AccessTarget::Vault { vault_id } | AccessTarget::Ticket { vault_id, .. } => *vault_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Denied { reason: String },
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }

    fn deny(reason: impl Into<String>) -> Self {
        Decision::Denied {
            reason: reason.into(),
        }
    }
}

/// Ledger facts a decision depends on, read from one snapshot.
#[derive(Debug, Clone, Default)]
pub struct GatewayFacts {
    pub vault: Option<VaultRecord>,
    pub ticket_exists: bool,
    /// Latest attestation record for a worker requester.
    pub worker_record: Option<AttestationRecord>,
}

/// Owner-or-attested-worker policy.
pub fn evaluate_policy(
    namespace: &str,
    requester: &Requester,
    scope: &AccessScope,
    target: &AccessTarget,
    facts: &GatewayFacts,
) -> Decision {
    let Some(vault) = &facts.vault else {
        return Decision::deny(format!("vault {} does not exist", target.vault_id()));
    };
    if let AccessTarget::Ticket { ticket_id, .. } = target {
        if !facts.ticket_exists {
            return Decision::deny(format!("ticket {ticket_id} does not exist"));
        }
    }
    if scope.vault_id != vault.vault_id {
        return Decision::deny(format!(
            "ciphertext is scoped to vault {}, not {}",
            scope.vault_id, vault.vault_id
        ));
    }

    match requester {
        Requester::Owner { principal_id } => {
            if *principal_id == vault.owner {
                Decision::Approved
            } else {
                Decision::deny(format!("{principal_id} does not own vault {}", vault.vault_id))
            }
        }
        Requester::Worker { public_key } => {
            match &facts.worker_record {
                Some(record) if record.active => {}
                Some(record) => {
                    return Decision::deny(format!(
                        "attestation record {} is deactivated",
                        record.record_id
                    ))
                }
                None => return Decision::deny(format!("worker {public_key} is not attested")),
            }
            if scope.namespace != namespace {
                return Decision::deny(format!(
                    "ciphertext namespace {} is not this deployment ({namespace})",
                    scope.namespace
                ));
            }
            Decision::Approved
        }
    }
}

impl Ledger {
    /// Evaluate a decryption request against the current ledger state.
    pub fn evaluate(
        &self,
        requester: &Requester,
        scope: &AccessScope,
        target: &AccessTarget,
    ) -> LedgerResult<Decision> {
        let facts = self.read(|s| {
            let vault_id = target.vault_id();
            let ticket_exists = match target {
                AccessTarget::Ticket { ticket_id, .. } => s.ticket(vault_id, *ticket_id)?.is_some(),
                AccessTarget::Vault { .. } => false,
            };
            let worker_record = match requester {
                Requester::Worker { public_key } => match normalize_public_key(public_key) {
                    Ok(key) => s.record_for_key(&key)?,
                    Err(_) => None,
                },
                Requester::Owner { .. } => None,
            };
            Ok(GatewayFacts {
                vault: s.vault(vault_id)?,
                ticket_exists,
                worker_record,
            })
        })?;

        Ok(evaluate_policy(self.namespace(), requester, scope, target, &facts))
    }
}
