// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Intent API endpoints.
//!
//! Owners submit intents; anyone may expire an intent once its deadline has
//! passed.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    ledger::{CreateIntent, IntentId, IntentOutcome, IntentRecord, IntentView},
    models::PendingIntentsResponse,
    state::AppState,
};

/// Submit an intent to swap some of a vault's tickets.
#[utoipa::path(
    post,
    path = "/v1/intents",
    tag = "Intents",
    security(("bearer_auth" = [])),
    request_body = CreateIntent,
    responses(
        (status = 201, description = "Intent is pending", body = IntentRecord),
        (status = 400, description = "Invalid intent (tickets, assets, deadline)"),
        (status = 403, description = "Forbidden - not your vault"),
        (status = 404, description = "Vault or ticket not found")
    )
)]
pub async fn create_intent(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateIntent>,
) -> Result<(StatusCode, Json<IntentRecord>), ApiError> {
    let intent = state.ledger.create_intent(&principal, &request)?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// List pending intents with their deadlines.
#[utoipa::path(
    get,
    path = "/v1/intents/pending",
    tag = "Intents",
    responses((status = 200, description = "Pending intents", body = PendingIntentsResponse))
)]
pub async fn list_pending(
    State(state): State<AppState>,
) -> Result<Json<PendingIntentsResponse>, ApiError> {
    let intents = state.ledger.list_pending()?;
    let total = intents.len();
    Ok(Json(PendingIntentsResponse { intents, total }))
}

#[utoipa::path(
    get,
    path = "/v1/intents/{intent_id}",
    tag = "Intents",
    params(("intent_id" = u64, Path, description = "Intent ID")),
    responses(
        (status = 200, description = "Intent and its status", body = IntentView),
        (status = 404, description = "Intent not found")
    )
)]
pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<IntentId>,
) -> Result<Json<IntentView>, ApiError> {
    Ok(Json(state.ledger.intent_view(intent_id)?))
}

/// Expire a pending intent whose deadline has passed, releasing its tickets.
///
/// Callable by anyone.
#[utoipa::path(
    post,
    path = "/v1/intents/{intent_id}/expire",
    tag = "Intents",
    params(("intent_id" = u64, Path, description = "Intent ID")),
    responses(
        (status = 200, description = "Intent expired", body = IntentOutcome),
        (status = 400, description = "Deadline has not passed"),
        (status = 404, description = "Intent not found"),
        (status = 409, description = "Intent is no longer pending")
    )
)]
pub async fn expire_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<IntentId>,
) -> Result<Json<IntentOutcome>, ApiError> {
    Ok(Json(state.ledger.expire(intent_id)?))
}
