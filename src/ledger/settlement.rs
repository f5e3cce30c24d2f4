// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Atomic settlement: verify the worker signature, remove the intent from the
//! pending set, consume its tickets, write back the proceeds.
//!
//! All of it is one write transaction. A racing replica that commits first
//! leaves the intent absent from the pending set, so the loser fails with
//! `NotPending` before writing anything.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attestation::{normalize_public_key, verify_hex_signature, WorkerSigner};
use crate::canonical::{CanonicalBytes, SETTLEMENT_SCOPE};
use crate::error::ErrorCategory;
use crate::storage::{AuditEvent, AuditEventType, LedgerRead};

use super::vault::{consume_tickets, issue_ticket, require_vault};
use super::{
    Amount, AssetId, IntentId, IntentOutcome, IntentStatus, InvariantViolation, Ledger,
    LedgerError, LedgerResult, OutputMode, RecordId, SealedAmount, TicketId, TicketOrigin,
};

/// Worker-signed settlement of one pending intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SettlementRequest {
    pub intent_id: IntentId,
    /// Attested worker key, SEC1 hex.
    pub worker_public_key: String,
    pub consumed_ticket_ids: Vec<TicketId>,
    pub input_asset: AssetId,
    /// Sum of the decrypted inputs.
    pub total_in: Amount,
    pub output_asset: AssetId,
    pub realized_out: Amount,
    /// Sealed proceeds, one per new ticket.
    pub new_tickets: Vec<SealedAmount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_receipt: Option<String>,
    /// ECDSA signature over [`SettlementRequest::signing_bytes`], hex.
    #[serde(default)]
    pub signature: String,
}

impl SettlementRequest {
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = CanonicalBytes::new(SETTLEMENT_SCOPE)
            .u64(self.intent_id)
            .u64_list(&self.consumed_ticket_ids)
            .u64(self.new_tickets.len() as u64);
        for sealed in &self.new_tickets {
            bytes = bytes
                .str(&sealed.scope.namespace)
                .u64(sealed.scope.vault_id)
                .bytes(&sealed.ciphertext);
        }
        bytes
            .str(self.input_asset.as_str())
            .u64(self.total_in)
            .str(self.output_asset.as_str())
            .u64(self.realized_out)
            .str(self.venue_receipt.as_deref().unwrap_or_default())
            .finish()
    }

    pub fn sign(mut self, signer: &WorkerSigner) -> Self {
        self.worker_public_key = signer.public_key_hex().to_string();
        self.signature = signer.sign(&self.signing_bytes());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SettlementReceipt {
    pub intent_id: IntentId,
    /// Attestation record whose key signed the settlement.
    pub record_id: RecordId,
    pub new_ticket_ids: Vec<TicketId>,
}

impl Ledger {
    /// Commit a worker's settlement atomically, or change nothing.
    pub fn settle(&self, request: &SettlementRequest) -> LedgerResult<SettlementReceipt> {
        let result = self.settle_inner(request);

        match &result {
            Ok(receipt) => tracing::info!(
                intent_id = request.intent_id,
                record_id = receipt.record_id,
                new_tickets = receipt.new_ticket_ids.len(),
                "Settled intent"
            ),
            Err(LedgerError::NotPending { .. }) => tracing::debug!(
                intent_id = request.intent_id,
                "Settlement lost race; intent already finalized"
            ),
            Err(err) => {
                tracing::warn!(
                    intent_id = request.intent_id,
                    worker = %request.worker_public_key,
                    error = %err,
                    "Rejected settlement"
                );
                if matches!(
                    err.category(),
                    ErrorCategory::Authorization | ErrorCategory::Invariant
                ) && self.signed_by_known_worker(request)
                {
                    self.record_rejection(
                        AuditEvent::new(AuditEventType::SettlementRejected)
                            .with_actor(request.worker_public_key.clone())
                            .with_resource("intent", request.intent_id.to_string())
                            .failed(err.to_string()),
                    );
                }
            }
        }
        result
    }

    /// Whether the request carries a valid signature from a key with an
    /// attestation record, active or not. Only such rejections are audited.
    fn signed_by_known_worker(&self, request: &SettlementRequest) -> bool {
        let Ok(worker_key) = normalize_public_key(&request.worker_public_key) else {
            return false;
        };
        match self.db().read(|s| s.record_for_key(&worker_key)) {
            Ok(Some(record)) => verify_hex_signature(
                &record.public_key,
                &request.signing_bytes(),
                &request.signature,
            ),
            _ => false,
        }
    }

    fn settle_inner(&self, request: &SettlementRequest) -> LedgerResult<SettlementReceipt> {
        let worker_key = normalize_public_key(&request.worker_public_key)
            .map_err(|e| LedgerError::Unauthorized(format!("worker key: {e}")))?;
        let signing_bytes = request.signing_bytes();
        let now = self.now();
        let namespace = self.namespace().to_string();

        self.db().write(|t| {
            let record = t
                .record_for_key(&worker_key)?
                .filter(|r| r.active)
                .ok_or_else(|| {
                    LedgerError::Unauthorized(format!(
                        "worker key {worker_key} has no active attestation record"
                    ))
                })?;
            if !verify_hex_signature(&record.public_key, &signing_bytes, &request.signature) {
                return Err(LedgerError::Unauthorized(format!(
                    "signature does not verify against attestation record {}",
                    record.record_id
                )));
            }

            let deadline = t.take_pending(request.intent_id)?;
            let intent = t
                .intent(request.intent_id)?
                .ok_or_else(|| LedgerError::not_found("intent", request.intent_id))?;

            if now > deadline {
                return Err(LedgerError::DeadlinePassed {
                    intent_id: intent.intent_id,
                    deadline,
                });
            }
            if request.consumed_ticket_ids != intent.ticket_ids {
                return Err(LedgerError::Validation(format!(
                    "consumed tickets {:?} differ from intent tickets {:?}",
                    request.consumed_ticket_ids, intent.ticket_ids
                )));
            }
            if request.input_asset != intent.input_asset || request.output_asset != intent.out_asset {
                return Err(LedgerError::Validation(format!(
                    "settlement {} -> {} does not match intent {} -> {}",
                    request.input_asset, request.output_asset, intent.input_asset, intent.out_asset
                )));
            }
            if request.total_in == 0 {
                return Err(LedgerError::Validation("total_in must be positive".into()));
            }
            if request.realized_out < intent.min_out {
                return Err(InvariantViolation::Slippage {
                    realized_out: request.realized_out,
                    min_out: intent.min_out,
                }
                .into());
            }

            let max_tickets = match intent.output_mode {
                OutputMode::Merged => 1,
                OutputMode::PerTicket => intent.ticket_ids.len(),
            };
            let count = request.new_tickets.len();
            if request.realized_out > 0 && (count == 0 || count > max_tickets) {
                return Err(LedgerError::Validation(format!(
                    "expected 1..={max_tickets} new tickets, got {count}"
                )));
            }
            if request.realized_out == 0 && count > 0 {
                return Err(LedgerError::Validation("zero proceeds cannot create tickets".into()));
            }
            if let Some(bad) = request
                .new_tickets
                .iter()
                .find(|s| s.scope.namespace != namespace || s.scope.vault_id != intent.vault_id)
            {
                return Err(LedgerError::Validation(format!(
                    "new ticket scoped to {}/{}, expected {namespace}/{}",
                    bad.scope.namespace, bad.scope.vault_id, intent.vault_id
                )));
            }

            t.debit_pool(&intent.input_asset, request.total_in)?;
            t.credit_pool(&intent.out_asset, request.realized_out)?;
            consume_tickets(t, intent.vault_id, &intent.ticket_ids)?;

            let mut vault = require_vault(t, intent.vault_id)?;
            let mut new_ticket_ids = Vec::with_capacity(count);
            for sealed in &request.new_tickets {
                let ticket = issue_ticket(
                    t,
                    &mut vault,
                    intent.out_asset.clone(),
                    sealed.clone(),
                    TicketOrigin::Settlement {
                        intent_id: intent.intent_id,
                    },
                    now,
                )?;
                new_ticket_ids.push(ticket.ticket_id);
            }
            t.put_vault(&vault)?;

            t.put_outcome(&IntentOutcome {
                intent_id: intent.intent_id,
                status: IntentStatus::Settled,
                finalized_at: now,
                settled_by: Some(record.record_id),
                realized_out: Some(request.realized_out),
                new_ticket_ids: new_ticket_ids.clone(),
                venue_receipt: request.venue_receipt.clone(),
            })?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::IntentSettled)
                    .with_actor(worker_key.clone())
                    .with_resource("intent", intent.intent_id.to_string())
                    .with_details(serde_json::json!({
                        "record_id": record.record_id,
                        "consumed": intent.ticket_ids,
                        "created": new_ticket_ids,
                        "input_asset": intent.input_asset,
                        "total_in": request.total_in,
                        "output_asset": intent.out_asset,
                        "realized_out": request.realized_out,
                    })),
            )?;

            Ok(SettlementReceipt {
                intent_id: intent.intent_id,
                record_id: record.record_id,
                new_ticket_ids,
            })
        })
    }
}
