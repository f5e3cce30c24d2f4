// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation registry endpoints.
//!
//! Registration needs no bearer token; the root-of-trust signature on the
//! attestation proof is the credential.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    attestation::{AttestationRecord, RegisterWorker},
    error::ApiError,
    ledger::RecordId,
    state::AppState,
};

/// Register an attested worker key.
#[utoipa::path(
    post,
    path = "/v1/workers",
    tag = "Workers",
    request_body = RegisterWorker,
    responses(
        (status = 201, description = "Attestation record created", body = AttestationRecord),
        (status = 400, description = "Malformed key, measurement or proof"),
        (status = 403, description = "Proof rejected (root, measurements, key, allowlist)"),
        (status = 409, description = "Key already has an active record")
    )
)]
pub async fn register_worker(
    State(state): State<AppState>,
    Json(request): Json<RegisterWorker>,
) -> Result<(StatusCode, Json<AttestationRecord>), ApiError> {
    let record = state.ledger.register_worker(&request)?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/v1/workers/{record_id}",
    tag = "Workers",
    params(("record_id" = u64, Path, description = "Attestation record ID")),
    responses(
        (status = 200, description = "Attestation record", body = AttestationRecord),
        (status = 404, description = "Record not found")
    )
)]
pub async fn get_worker(
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
) -> Result<Json<AttestationRecord>, ApiError> {
    Ok(Json(state.ledger.attestation_record(record_id)?))
}
