// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vaults, deposits and withdrawals.

use crate::auth::AuthenticatedPrincipal;
use crate::storage::ledger_db::VAULT_COUNTER;
use crate::storage::{
    AuditEvent, AuditEventType, LedgerRead, LedgerTables, OwnedResource, OwnershipEnforcer,
};

use super::{
    Amount, AssetId, Ledger, LedgerError, LedgerResult, SealedAmount, TicketId, TicketOrigin,
    TicketRecord, VaultId, VaultRecord,
};

impl OwnedResource for VaultRecord {
    fn owner_principal_id(&self) -> &str {
        &self.owner
    }

    fn resource_label(&self) -> String {
        format!("vault {}", self.vault_id)
    }
}

/// Load a vault or fail with `NotFound`.
pub(crate) fn require_vault(t: &impl LedgerRead, vault_id: VaultId) -> LedgerResult<VaultRecord> {
    t.vault(vault_id)?
        .ok_or_else(|| LedgerError::not_found("vault", vault_id))
}

/// Store a new ticket under the vault's next id.
pub(crate) fn issue_ticket(
    t: &mut LedgerTables<'_>,
    vault: &mut VaultRecord,
    asset: AssetId,
    sealed: SealedAmount,
    origin: TicketOrigin,
    now: u64,
) -> LedgerResult<TicketRecord> {
    let ticket = TicketRecord {
        vault_id: vault.vault_id,
        ticket_id: vault.next_ticket_id,
        asset,
        sealed,
        origin,
        created_at: now,
    };
    vault.next_ticket_id = vault
        .next_ticket_id
        .checked_add(1)
        .ok_or(super::InvariantViolation::Overflow("ticket id"))?;
    t.put_ticket(&ticket)?;
    Ok(ticket)
}

/// Delete every listed ticket and its lock. Any absent id fails the whole
/// transaction, which is the double-spend guard for settlements.
pub(crate) fn consume_tickets(
    t: &mut LedgerTables<'_>,
    vault_id: VaultId,
    ticket_ids: &[TicketId],
) -> LedgerResult<()> {
    for &ticket_id in ticket_ids {
        if !t.remove_ticket(vault_id, ticket_id)? {
            return Err(LedgerError::not_found("ticket", format!("{vault_id}/{ticket_id}")));
        }
        t.unlock_ticket(vault_id, ticket_id)?;
    }
    Ok(())
}

impl Ledger {
    pub fn create_vault(&self, owner: &AuthenticatedPrincipal) -> LedgerResult<VaultRecord> {
        let now = self.now();
        let vault = self.db().write(|t| {
            let vault = VaultRecord {
                vault_id: t.next_id(VAULT_COUNTER)?,
                owner: owner.principal_id.clone(),
                next_ticket_id: 1,
                created_at: now,
            };
            t.put_vault(&vault)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::VaultCreated)
                    .with_actor(owner.principal_id.clone())
                    .with_resource("vault", vault.vault_id.to_string()),
            )?;
            Ok(vault)
        })?;

        tracing::info!(vault_id = vault.vault_id, owner = %vault.owner, "Created vault");
        Ok(vault)
    }

    pub fn vault(&self, vault_id: VaultId) -> LedgerResult<VaultRecord> {
        self.db().read(|s| require_vault(s, vault_id))
    }

    /// Outstanding tickets of a vault, ordered by id.
    pub fn tickets(&self, vault_id: VaultId) -> LedgerResult<Vec<TicketRecord>> {
        self.db().read(|s| {
            require_vault(s, vault_id)?;
            s.tickets_in_vault(vault_id)
        })
    }

    /// Move `real_amount` into custody and store `sealed` as a new ticket.
    ///
    /// The ciphertext is not checked against `real_amount`; solvency is keyed
    /// off the real pool balance only.
    pub fn deposit(
        &self,
        principal: &AuthenticatedPrincipal,
        vault_id: VaultId,
        asset: &AssetId,
        real_amount: Amount,
        sealed: SealedAmount,
    ) -> LedgerResult<TicketRecord> {
        if real_amount == 0 {
            return Err(LedgerError::Validation("deposit amount must be positive".into()));
        }
        if asset.as_str().is_empty() {
            return Err(LedgerError::Validation("asset must not be empty".into()));
        }
        if sealed.scope != self.scope_for(vault_id) {
            return Err(LedgerError::Validation(format!(
                "ciphertext is scoped to {}/{}, expected {}/{vault_id}",
                sealed.scope.namespace,
                sealed.scope.vault_id,
                self.namespace()
            )));
        }

        let now = self.now();
        let ticket = self.db().write(|t| {
            let mut vault = require_vault(t, vault_id)?;
            vault.verify_ownership(principal, "deposit into")?;

            t.credit_pool(asset, real_amount)?;
            let ticket = issue_ticket(t, &mut vault, asset.clone(), sealed, TicketOrigin::Deposit, now)?;
            t.put_vault(&vault)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::Deposit)
                    .with_actor(principal.principal_id.clone())
                    .with_resource("vault", vault_id.to_string())
                    .with_details(serde_json::json!({
                        "ticket_id": ticket.ticket_id,
                        "asset": asset,
                        "amount": real_amount,
                    })),
            )?;
            Ok(ticket)
        })?;

        tracing::info!(
            vault_id,
            ticket_id = ticket.ticket_id,
            asset = %asset,
            "Deposited into vault"
        );
        Ok(ticket)
    }

    /// Owner-only withdrawal of `claimed_amount` real asset, deleting the ticket.
    pub fn unwrap(
        &self,
        principal: &AuthenticatedPrincipal,
        vault_id: VaultId,
        ticket_id: TicketId,
        claimed_amount: Amount,
    ) -> LedgerResult<TicketRecord> {
        let ticket = self.db().write(|t| {
            let vault = require_vault(t, vault_id)?;
            vault.verify_ownership(principal, "unwrap from")?;

            let ticket = t
                .ticket(vault_id, ticket_id)?
                .ok_or_else(|| LedgerError::not_found("ticket", format!("{vault_id}/{ticket_id}")))?;
            if let Some(intent_id) = t.ticket_lock(vault_id, ticket_id)? {
                return Err(LedgerError::TicketEncumbered {
                    vault_id,
                    ticket_id,
                    intent_id,
                });
            }

            t.debit_pool(&ticket.asset, claimed_amount)?;
            t.remove_ticket(vault_id, ticket_id)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::Unwrap)
                    .with_actor(principal.principal_id.clone())
                    .with_resource("vault", vault_id.to_string())
                    .with_details(serde_json::json!({
                        "ticket_id": ticket_id,
                        "asset": ticket.asset,
                        "amount": claimed_amount,
                    })),
            )?;
            Ok(ticket)
        })?;

        tracing::info!(vault_id, ticket_id, asset = %ticket.asset, "Unwrapped ticket");
        Ok(ticket)
    }
}
