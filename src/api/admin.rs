// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for system management.
//!
//! - Worker deactivation (Admin role)
//! - Custody pool balances and audit log queries (Admin or Auditor role)

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::{
    attestation::AttestationRecord,
    auth::{AdminOnly, AuditAccess},
    error::ApiError,
    ledger::RecordId,
    models::{AuditLogResponse, AuditQueryParams, PoolBalance, PoolResponse},
    state::AppState,
};

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// Deactivate a worker's attestation record.
///
/// Settlements signed by the key are rejected from the next transaction on.
/// Deactivating an inactive record is a no-op.
#[utoipa::path(
    post,
    path = "/v1/admin/workers/{record_id}/deactivate",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("record_id" = u64, Path, description = "Attestation record ID")),
    responses(
        (status = 200, description = "Record is inactive", body = AttestationRecord),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Record not found")
    )
)]
pub async fn deactivate_worker(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
) -> Result<Json<AttestationRecord>, ApiError> {
    Ok(Json(state.ledger.deactivate_worker(&admin, record_id)?))
}

/// Real balances held in the custody pool, per asset.
#[utoipa::path(
    get,
    path = "/v1/admin/pool",
    tag = "Admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pool balances", body = PoolResponse),
        (status = 403, description = "Admin or auditor role required")
    )
)]
pub async fn pool_balances(
    AuditAccess(_principal): AuditAccess,
    State(state): State<AppState>,
) -> Result<Json<PoolResponse>, ApiError> {
    let balances = state
        .ledger
        .pool_balances()?
        .into_iter()
        .map(|(asset, balance)| PoolBalance { asset, balance })
        .collect();
    Ok(Json(PoolResponse { balances }))
}

/// Page through the audit trail, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/audit",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Audit events", body = AuditLogResponse),
        (status = 403, description = "Admin or auditor role required")
    )
)]
pub async fn audit_log(
    AuditAccess(_principal): AuditAccess,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let offset = params.offset.unwrap_or(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);

    // One extra event tells whether another page exists.
    let mut events = state.ledger.audit_events(offset, limit + 1)?;
    let has_more = events.len() > limit;
    events.truncate(limit);

    Ok(Json(AuditLogResponse {
        events,
        offset,
        has_more,
    }))
}
