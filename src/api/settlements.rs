// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settlement submission and custodian authorization.
//!
//! Settlements carry no bearer token: the attested worker signature over the
//! settlement is the credential, verified inside the ledger transaction.

use axum::{extract::State, Json};

use crate::{
    auth::Auth,
    error::ApiError,
    gateway::{Decision, Requester},
    ledger::{SettlementReceipt, SettlementRequest},
    models::AuthorizeRequest,
    state::AppState,
};

/// Commit a worker-signed settlement of a pending intent.
#[utoipa::path(
    post,
    path = "/v1/settlements",
    tag = "Settlements",
    request_body = SettlementRequest,
    responses(
        (status = 200, description = "Settlement committed", body = SettlementReceipt),
        (status = 400, description = "Settlement does not match the intent"),
        (status = 403, description = "Worker not attested or signature invalid"),
        (status = 409, description = "Intent is no longer pending"),
        (status = 422, description = "Slippage or insolvency")
    )
)]
pub async fn submit_settlement(
    State(state): State<AppState>,
    Json(request): Json<SettlementRequest>,
) -> Result<Json<SettlementReceipt>, ApiError> {
    Ok(Json(state.ledger.settle(&request)?))
}

/// Evaluate the authorization gateway for a decryption request.
///
/// Worker contexts must carry a valid signature by the worker key. Owner
/// contexts are accepted only from that owner, a custodian or an admin.
#[utoipa::path(
    post,
    path = "/v1/authorize",
    tag = "Settlements",
    security(("bearer_auth" = [])),
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Gateway decision", body = Decision),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn authorize(
    Auth(principal): Auth,
    State(state): State<AppState>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Json<Decision>, ApiError> {
    let context = &request.context;
    if let Requester::Owner { principal_id } = &context.requester {
        if !principal.may_speak_for(principal_id) {
            return Err(ApiError::forbidden(
                "owner contexts may only be submitted by that owner or a custodian",
            ));
        }
    }
    if !context.verify_signature() {
        return Ok(Json(Decision::Denied {
            reason: "request signature does not verify".to_string(),
        }));
    }

    let decision = state
        .ledger
        .evaluate(&context.requester, &request.scope, &context.target)?;
    tracing::debug!(
        caller = %principal.principal_id,
        access = ?context.target,
        approved = decision.is_approved(),
        "Evaluated decryption request"
    );
    Ok(Json(decision))
}
