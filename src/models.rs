// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies shared by the REST handlers. Ledger records
//! ([`VaultRecord`], [`TicketRecord`], [`IntentView`], ...) are returned as-is;
//! the types here only wrap or reshape them for the wire.
//!
//! ## Model Categories
//!
//! - **Vaults**: deposits, unwraps and owner reveals
//! - **Intents**: pending listings
//! - **Gateway**: custodian authorization checks
//! - **Admin**: pool balances and audit paging

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::decryption::AuthorizationContext;
use crate::ledger::{AccessScope, Amount, AssetId, PendingIntent, TicketId, TicketRecord, VaultId, VaultRecord};
use crate::storage::AuditEvent;

// =============================================================================
// Vaults
// =============================================================================

/// A vault and its current tickets.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VaultResponse {
    pub vault: VaultRecord,
    pub tickets: Vec<TicketRecord>,
}

/// Move real funds into custody and record a sealed ticket.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositRequest {
    pub asset: AssetId,
    /// Real amount transferred into the custody pool.
    pub amount: Amount,
    /// Client-sealed ciphertext (hex) under the vault's scope. When omitted
    /// the server seals `amount` through the decryption service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnwrapRequest {
    /// Real amount to release from the custody pool.
    pub claimed_amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnwrapResponse {
    pub vault_id: VaultId,
    pub ticket_id: TicketId,
    pub asset: AssetId,
    pub amount: Amount,
}

/// Plaintext of one ticket, released to its owner.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevealResponse {
    pub vault_id: VaultId,
    pub ticket_id: TicketId,
    pub asset: AssetId,
    pub amount: Amount,
}

// =============================================================================
// Intents
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingIntentsResponse {
    pub intents: Vec<PendingIntent>,
    pub total: usize,
}

// =============================================================================
// Gateway
// =============================================================================

/// A custodian asking whether to release plaintext for `context`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Scope bound into the ciphertext being opened.
    pub scope: AccessScope,
    pub context: AuthorizationContext,
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolBalance {
    pub asset: AssetId,
    pub balance: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolResponse {
    pub balances: Vec<PoolBalance>,
}

/// Paging for audit queries.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    /// Events to skip (default 0).
    pub offset: Option<usize>,
    /// Maximum number of events (default 100, capped at 1000).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLogResponse {
    pub events: Vec<AuditEvent>,
    pub offset: usize,
    /// Whether more events follow this page.
    pub has_more: bool,
}
