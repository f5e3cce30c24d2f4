// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Intent registry: `Pending -> {Settled, Expired}`.
//!
//! An intent record is immutable once written. Its state is derived from two
//! facts: membership in the pending set, and the outcome written when it
//! leaves that set.

use std::collections::HashSet;

use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::AuthenticatedPrincipal;
use crate::storage::ledger_db::INTENT_COUNTER;
use crate::storage::{AuditEvent, AuditEventType, LedgerRead, OwnershipEnforcer};

use super::vault::require_vault;
use super::{
    Amount, AssetId, IntentId, IntentOutcome, IntentRecord, IntentStatus, IntentView, Ledger,
    LedgerError, LedgerResult, OutputMode, PendingIntent, TicketId, TicketRecord, VaultId,
};

/// Owner request to swap some of a vault's tickets into `out_asset`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateIntent {
    pub vault_id: VaultId,
    /// Tickets to consume, in order.
    pub ticket_ids: Vec<TicketId>,
    pub out_asset: AssetId,
    pub min_out: Amount,
    /// Unix seconds; must be in the future.
    pub deadline: u64,
    #[serde(default)]
    pub output_mode: OutputMode,
}

impl Ledger {
    /// Validate ownership and ticket existence, then add the intent to the
    /// pending set and wake worker replicas.
    pub fn create_intent(
        &self,
        principal: &AuthenticatedPrincipal,
        request: &CreateIntent,
    ) -> LedgerResult<IntentRecord> {
        if request.ticket_ids.is_empty() {
            return Err(LedgerError::Validation("intent must reference at least one ticket".into()));
        }
        let mut seen = HashSet::with_capacity(request.ticket_ids.len());
        if let Some(dup) = request.ticket_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(LedgerError::Validation(format!("ticket {dup} listed twice")));
        }
        if request.out_asset.as_str().is_empty() {
            return Err(LedgerError::Validation("out_asset must not be empty".into()));
        }

        let now = self.now();
        if request.deadline <= now {
            return Err(LedgerError::Validation(format!(
                "deadline {} is not after current time {now}",
                request.deadline
            )));
        }

        let intent = self.db().write(|t| {
            let vault = require_vault(t, request.vault_id)?;
            vault.verify_ownership(principal, "create intent on")?;

            let mut input_asset: Option<AssetId> = None;
            for &ticket_id in &request.ticket_ids {
                let ticket = t.ticket(request.vault_id, ticket_id)?.ok_or_else(|| {
                    LedgerError::not_found("ticket", format!("{}/{ticket_id}", request.vault_id))
                })?;
                if let Some(intent_id) = t.ticket_lock(request.vault_id, ticket_id)? {
                    return Err(LedgerError::TicketEncumbered {
                        vault_id: request.vault_id,
                        ticket_id,
                        intent_id,
                    });
                }
                if let Some(asset) = &input_asset {
                    if *asset != ticket.asset {
                        return Err(LedgerError::Validation(format!(
                            "tickets mix assets {asset} and {}",
                            ticket.asset
                        )));
                    }
                } else {
                    input_asset = Some(ticket.asset);
                }
            }
            let input_asset = input_asset
                .ok_or_else(|| LedgerError::Validation("intent must reference at least one ticket".into()))?;

            let intent = IntentRecord {
                intent_id: t.next_id(INTENT_COUNTER)?,
                vault_id: request.vault_id,
                owner: principal.principal_id.clone(),
                ticket_ids: request.ticket_ids.clone(),
                input_asset,
                out_asset: request.out_asset.clone(),
                min_out: request.min_out,
                deadline: request.deadline,
                output_mode: request.output_mode,
                created_at: now,
            };
            t.put_intent(&intent)?;
            t.insert_pending(intent.intent_id, intent.deadline)?;
            for &ticket_id in &intent.ticket_ids {
                t.lock_ticket(intent.vault_id, ticket_id, intent.intent_id)?;
            }
            t.append_audit(
                &AuditEvent::new(AuditEventType::IntentCreated)
                    .with_actor(principal.principal_id.clone())
                    .with_resource("intent", intent.intent_id.to_string())
                    .with_details(serde_json::json!({
                        "vault_id": intent.vault_id,
                        "ticket_ids": intent.ticket_ids,
                        "out_asset": intent.out_asset,
                        "min_out": intent.min_out,
                        "deadline": intent.deadline,
                    })),
            )?;
            Ok(intent)
        })?;

        tracing::info!(
            intent_id = intent.intent_id,
            vault_id = intent.vault_id,
            tickets = intent.ticket_ids.len(),
            deadline = intent.deadline,
            "Created intent"
        );
        self.notify_intent_created();
        Ok(intent)
    }

    /// Move a pending intent past its deadline to `Expired`. Callable by
    /// anyone. Tickets are left untouched and become spendable again.
    pub fn expire(&self, intent_id: IntentId) -> LedgerResult<IntentOutcome> {
        let now = self.now();
        let outcome = self.db().write(|t| {
            let deadline = match t.pending_deadline(intent_id)? {
                Some(deadline) => deadline,
                None => return Err(t.not_pending_error(intent_id)?),
            };
            if now <= deadline {
                return Err(LedgerError::DeadlineNotReached { intent_id, deadline });
            }

            let intent = t
                .intent(intent_id)?
                .ok_or_else(|| LedgerError::not_found("intent", intent_id))?;
            t.take_pending(intent_id)?;
            for &ticket_id in &intent.ticket_ids {
                t.unlock_ticket(intent.vault_id, ticket_id)?;
            }

            let outcome = IntentOutcome {
                intent_id,
                status: IntentStatus::Expired,
                finalized_at: now,
                settled_by: None,
                realized_out: None,
                new_ticket_ids: Vec::new(),
                venue_receipt: None,
            };
            t.put_outcome(&outcome)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::IntentExpired)
                    .with_resource("intent", intent_id.to_string()),
            )?;
            Ok(outcome)
        })?;

        tracing::info!(intent_id, "Expired intent");
        Ok(outcome)
    }

    /// The pending set, ordered by intent id.
    pub fn list_pending(&self) -> LedgerResult<Vec<PendingIntent>> {
        self.db().read(|s| s.pending())
    }

    /// Authoritative membership check against the store.
    pub fn is_pending(&self, intent_id: IntentId) -> LedgerResult<bool> {
        Ok(self.db().read(|s| s.pending_deadline(intent_id))?.is_some())
    }

    pub fn intent_view(&self, intent_id: IntentId) -> LedgerResult<IntentView> {
        self.db().read(|s| {
            let intent = s
                .intent(intent_id)?
                .ok_or_else(|| LedgerError::not_found("intent", intent_id))?;
            let outcome = s.outcome(intent_id)?;
            let status = match (&outcome, s.pending_deadline(intent_id)?) {
                (Some(outcome), _) => outcome.status,
                (None, Some(_)) => IntentStatus::Pending,
                (None, None) => {
                    return Err(LedgerError::Validation(format!(
                        "intent {intent_id} is neither pending nor finalized"
                    )))
                }
            };
            Ok(IntentView {
                intent,
                status,
                outcome,
            })
        })
    }

    /// A pending intent together with its tickets, read from one snapshot.
    pub fn intent_with_tickets(
        &self,
        intent_id: IntentId,
    ) -> LedgerResult<(IntentRecord, Vec<TicketRecord>)> {
        self.db().read(|s| {
            if s.pending_deadline(intent_id)?.is_none() {
                return Err(match s.outcome(intent_id)? {
                    Some(_) => LedgerError::NotPending { intent_id },
                    None => LedgerError::not_found("intent", intent_id),
                });
            }
            let intent = s
                .intent(intent_id)?
                .ok_or_else(|| LedgerError::not_found("intent", intent_id))?;
            let tickets = intent
                .ticket_ids
                .iter()
                .map(|&ticket_id| {
                    s.ticket(intent.vault_id, ticket_id)?.ok_or_else(|| {
                        LedgerError::not_found("ticket", format!("{}/{ticket_id}", intent.vault_id))
                    })
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok((intent, tickets))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{owner, TestLedger, START};
    use super::*;

    fn request(vault_id: VaultId, ticket_ids: Vec<TicketId>) -> CreateIntent {
        CreateIntent {
            vault_id,
            ticket_ids,
            out_asset: AssetId::from("USDC"),
            min_out: 90,
            deadline: START + 60,
            output_mode: OutputMode::Merged,
        }
    }

    #[test]
    fn create_intent_adds_to_pending_and_locks_tickets() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60, 40]);

        let intent = env.ledger.create_intent(&alice, &request(vault_id, tickets.clone())).unwrap();

        assert_eq!(intent.input_asset, AssetId::from("SUI"));
        assert_eq!(
            env.ledger.list_pending().unwrap(),
            vec![PendingIntent { intent_id: intent.intent_id, deadline: START + 60 }]
        );
        assert_eq!(env.ledger.intent_view(intent.intent_id).unwrap().status, IntentStatus::Pending);

        // Encumbered tickets can be neither reused nor withdrawn.
        let reuse = env.ledger.create_intent(&alice, &request(vault_id, vec![tickets[0]])).unwrap_err();
        assert!(matches!(reuse, LedgerError::TicketEncumbered { .. }));
        let unwrap = env.ledger.unwrap(&alice, vault_id, tickets[1], 40).unwrap_err();
        assert!(matches!(unwrap, LedgerError::TicketEncumbered { .. }));
    }

    #[test]
    fn create_intent_validates_synchronously() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60]);

        let empty = env.ledger.create_intent(&alice, &request(vault_id, vec![]));
        assert!(matches!(empty, Err(LedgerError::Validation(_))));

        let dup = env.ledger.create_intent(&alice, &request(vault_id, vec![tickets[0], tickets[0]]));
        assert!(matches!(dup, Err(LedgerError::Validation(_))));

        let mut past = request(vault_id, tickets.clone());
        past.deadline = START;
        assert!(matches!(env.ledger.create_intent(&alice, &past), Err(LedgerError::Validation(_))));

        let unknown = env.ledger.create_intent(&alice, &request(vault_id, vec![99]));
        assert!(matches!(unknown, Err(LedgerError::NotFound { kind: "ticket", .. })));

        let stranger = env.ledger.create_intent(&owner("bob"), &request(vault_id, tickets));
        assert!(matches!(stranger, Err(LedgerError::PermissionDenied { .. })));

        assert!(env.ledger.list_pending().unwrap().is_empty());
    }

    #[test]
    fn consumed_ticket_cannot_back_an_intent() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60]);
        env.ledger.unwrap(&alice, vault_id, tickets[0], 60).unwrap();

        let err = env.ledger.create_intent(&alice, &request(vault_id, tickets)).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[test]
    fn mixed_assets_are_rejected() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, mut tickets) = env.funded_vault(&alice, "SUI", &[60]);
        let usdc = env
            .ledger
            .deposit(&alice, vault_id, &AssetId::from("USDC"), 5, env.sealed(vault_id, 5))
            .unwrap();
        tickets.push(usdc.ticket_id);

        let err = env.ledger.create_intent(&alice, &request(vault_id, tickets)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn expire_only_after_deadline_and_releases_tickets() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60, 40]);
        let intent = env.ledger.create_intent(&alice, &request(vault_id, tickets.clone())).unwrap();

        env.clock.set(START + 60);
        assert!(matches!(
            env.ledger.expire(intent.intent_id),
            Err(LedgerError::DeadlineNotReached { .. })
        ));

        env.clock.advance(1);
        let outcome = env.ledger.expire(intent.intent_id).unwrap();
        assert_eq!(outcome.status, IntentStatus::Expired);
        assert!(env.ledger.list_pending().unwrap().is_empty());
        assert_eq!(env.ledger.intent_view(intent.intent_id).unwrap().status, IntentStatus::Expired);

        // Tickets are untouched and spendable by a new intent.
        assert_eq!(env.ledger.tickets(vault_id).unwrap().len(), 2);
        let mut next = request(vault_id, tickets);
        next.deadline = env.ledger.now() + 60;
        env.ledger.create_intent(&alice, &next).unwrap();

        assert!(matches!(
            env.ledger.expire(intent.intent_id),
            Err(LedgerError::NotPending { .. })
        ));
        assert!(matches!(env.ledger.expire(999), Err(LedgerError::NotFound { .. })));
    }

    #[test]
    fn intent_with_tickets_reads_one_snapshot() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60, 40]);
        let intent = env.ledger.create_intent(&alice, &request(vault_id, tickets.clone())).unwrap();

        let (record, loaded) = env.ledger.intent_with_tickets(intent.intent_id).unwrap();
        assert_eq!(record, intent);
        let ids: Vec<_> = loaded.iter().map(|t| t.ticket_id).collect();
        assert_eq!(ids, tickets);
    }

    #[tokio::test]
    async fn create_intent_wakes_waiters() {
        let env = TestLedger::new();
        let alice = owner("alice");
        let (vault_id, tickets) = env.funded_vault(&alice, "SUI", &[60]);

        let ledger = env.ledger.clone();
        let waiter = tokio::spawn(async move { ledger.intent_notified().await });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        env.ledger.create_intent(&alice, &request(vault_id, tickets)).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
