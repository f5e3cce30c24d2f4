// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault API endpoints.
//!
//! Vault creation, deposits, unwraps and owner reveals. All operations
//! require authentication and enforce ownership.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    decryption::AuthorizationContext,
    error::ApiError,
    gateway::AccessTarget,
    ledger::{SealedAmount, TicketId, TicketRecord, VaultId, VaultRecord},
    models::{DepositRequest, RevealResponse, UnwrapRequest, UnwrapResponse, VaultResponse},
    state::AppState,
    storage::OwnershipEnforcer,
};

/// Create an empty vault owned by the caller.
#[utoipa::path(
    post,
    path = "/v1/vaults",
    tag = "Vaults",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Vault created", body = VaultRecord),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_vault(
    Auth(principal): Auth,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<VaultRecord>), ApiError> {
    let vault = state.ledger.create_vault(&principal)?;
    Ok((StatusCode::CREATED, Json(vault)))
}

/// Get a vault and its tickets.
///
/// Only the owner may list a vault's tickets.
#[utoipa::path(
    get,
    path = "/v1/vaults/{vault_id}",
    tag = "Vaults",
    security(("bearer_auth" = [])),
    params(("vault_id" = u64, Path, description = "Vault ID")),
    responses(
        (status = 200, description = "Vault details", body = VaultResponse),
        (status = 403, description = "Forbidden - not your vault"),
        (status = 404, description = "Vault not found")
    )
)]
pub async fn get_vault(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Path(vault_id): Path<VaultId>,
) -> Result<Json<VaultResponse>, ApiError> {
    let vault = state.ledger.vault(vault_id)?;
    vault.verify_ownership(&principal, "read")?;
    let tickets = state.ledger.tickets(vault_id)?;
    Ok(Json(VaultResponse { vault, tickets }))
}

/// Deposit real funds and record a sealed ticket.
#[utoipa::path(
    post,
    path = "/v1/vaults/{vault_id}/deposits",
    tag = "Vaults",
    security(("bearer_auth" = [])),
    params(("vault_id" = u64, Path, description = "Vault ID")),
    request_body = DepositRequest,
    responses(
        (status = 201, description = "Ticket created", body = TicketRecord),
        (status = 400, description = "Invalid amount, asset or ciphertext"),
        (status = 403, description = "Forbidden - not your vault"),
        (status = 404, description = "Vault not found"),
        (status = 503, description = "Decryption service unavailable")
    )
)]
pub async fn deposit(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Path(vault_id): Path<VaultId>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<TicketRecord>), ApiError> {
    let scope = state.ledger.scope_for(vault_id);
    let sealed = match request.ciphertext {
        Some(ref hex_ciphertext) => {
            let ciphertext = hex::decode(hex_ciphertext.trim_start_matches("0x"))
                .map_err(|e| ApiError::bad_request(format!("ciphertext is not hex: {e}")))?;
            SealedAmount::new(scope, ciphertext)
        }
        None => {
            // Ownership is checked before sealing anything on the caller's behalf.
            state.ledger.vault(vault_id)?.verify_ownership(&principal, "deposit into")?;
            state.decryption.seal(&scope, request.amount).await?
        }
    };

    let ticket = state
        .ledger
        .deposit(&principal, vault_id, &request.asset, request.amount, sealed)?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Withdraw a ticket's real amount and delete the ticket.
#[utoipa::path(
    post,
    path = "/v1/vaults/{vault_id}/tickets/{ticket_id}/unwrap",
    tag = "Vaults",
    security(("bearer_auth" = [])),
    params(
        ("vault_id" = u64, Path, description = "Vault ID"),
        ("ticket_id" = u64, Path, description = "Ticket ID")
    ),
    request_body = UnwrapRequest,
    responses(
        (status = 200, description = "Ticket unwrapped", body = UnwrapResponse),
        (status = 400, description = "Ticket is encumbered by a pending intent"),
        (status = 403, description = "Forbidden - not your vault"),
        (status = 404, description = "Vault or ticket not found"),
        (status = 422, description = "Custody pool cannot cover the claim")
    )
)]
pub async fn unwrap_ticket(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Path((vault_id, ticket_id)): Path<(VaultId, TicketId)>,
    Json(request): Json<UnwrapRequest>,
) -> Result<Json<UnwrapResponse>, ApiError> {
    let ticket = state
        .ledger
        .unwrap(&principal, vault_id, ticket_id, request.claimed_amount)?;
    Ok(Json(UnwrapResponse {
        vault_id,
        ticket_id,
        asset: ticket.asset,
        amount: request.claimed_amount,
    }))
}

/// Decrypt one of the caller's tickets through the custodians.
#[utoipa::path(
    post,
    path = "/v1/vaults/{vault_id}/tickets/{ticket_id}/reveal",
    tag = "Vaults",
    security(("bearer_auth" = [])),
    params(
        ("vault_id" = u64, Path, description = "Vault ID"),
        ("ticket_id" = u64, Path, description = "Ticket ID")
    ),
    responses(
        (status = 200, description = "Ticket plaintext", body = RevealResponse),
        (status = 403, description = "Not your vault, or custodians denied the request"),
        (status = 404, description = "Vault or ticket not found"),
        (status = 503, description = "Too few custodians reachable")
    )
)]
pub async fn reveal_ticket(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Path((vault_id, ticket_id)): Path<(VaultId, TicketId)>,
) -> Result<Json<RevealResponse>, ApiError> {
    state.ledger.vault(vault_id)?.verify_ownership(&principal, "reveal")?;
    let ticket = state
        .ledger
        .tickets(vault_id)?
        .into_iter()
        .find(|t| t.ticket_id == ticket_id)
        .ok_or_else(|| ApiError::not_found(format!("ticket {vault_id}/{ticket_id} not found")))?;

    let context = AuthorizationContext::for_owner(
        principal.principal_id.clone(),
        AccessTarget::Ticket {
            vault_id,
            ticket_id,
        },
        &ticket.sealed,
        state.ledger.now(),
    );
    let amount = ticket.sealed.decrypt(state.decryption.as_ref(), &context).await?;

    Ok(Json(RevealResponse {
        vault_id,
        ticket_id,
        asset: ticket.asset,
        amount,
    }))
}
