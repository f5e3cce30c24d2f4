// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Liveness, readiness and a ledger health summary.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::DATA_DIR_ENV;
use crate::ledger::PendingIntent;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Missing,
    Unavailable,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthReport {
    /// `ok` when every check passes, `degraded` otherwise.
    pub status: String,
    pub ledger: CheckStatus,
    /// Only reported when `DATA_DIR` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_intents: Option<usize>,
    /// Pending intents past their deadline, waiting for someone to expire them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overdue_intents: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessResponse {
    pub status: String,
}

fn data_dir_status() -> Option<CheckStatus> {
    let dir = std::env::var(DATA_DIR_ENV).ok()?;
    Some(if std::path::Path::new(&dir).is_dir() {
        CheckStatus::Ok
    } else {
        CheckStatus::Missing
    })
}

fn pending(state: &AppState) -> Option<Vec<PendingIntent>> {
    match state.ledger.list_pending() {
        Ok(pending) => Some(pending),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger health check failed");
            None
        }
    }
}

fn report(ledger: Option<&[PendingIntent]>, now: u64, data_dir: Option<CheckStatus>) -> HealthReport {
    let healthy = ledger.is_some() && data_dir.is_none_or(|s| s == CheckStatus::Ok);
    HealthReport {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        ledger: if ledger.is_some() {
            CheckStatus::Ok
        } else {
            CheckStatus::Unavailable
        },
        data_dir,
        pending_intents: ledger.map(<[_]>::len),
        overdue_intents: ledger.map(|p| p.iter().filter(|i| now > i.deadline).count()),
    }
}

fn respond(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let status = if report.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Ledger and data directory summary.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "All checks pass", body = HealthReport),
        (status = 503, description = "At least one check failed", body = HealthReport)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let pending = pending(&state);
    respond(report(pending.as_deref(), state.ledger.now(), data_dir_status()))
}

/// Always 200 while the process runs.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is running", body = LivenessResponse))
)]
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
    })
}

/// 200 once the ledger answers reads.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ledger is readable", body = HealthReport),
        (status = 503, description = "Ledger is unavailable", body = HealthReport)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let pending = pending(&state);
    respond(report(pending.as_deref(), state.ledger.now(), None))
}
