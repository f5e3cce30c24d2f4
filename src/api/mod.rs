// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    attestation::{AttestationDocument, AttestationProof, AttestationRecord, RegisterWorker},
    decryption::AuthorizationContext,
    gateway::{AccessTarget, Decision, Requester},
    ledger::{
        AccessScope, CreateIntent, IntentOutcome, IntentRecord, IntentStatus, IntentView,
        OutputMode, PendingIntent, SealedAmount, SettlementReceipt, SettlementRequest,
        TicketOrigin, TicketRecord, VaultRecord,
    },
    models::{
        AuditLogResponse, AuthorizeRequest, DepositRequest, PendingIntentsResponse, PoolBalance,
        PoolResponse, RevealResponse, UnwrapRequest, UnwrapResponse, VaultResponse,
    },
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditOutcome, AuditResource},
};

pub mod admin;
pub mod health;
pub mod intents;
pub mod settlements;
pub mod vaults;
pub mod workers;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Vaults
        .route("/vaults", post(vaults::create_vault))
        .route("/vaults/{vault_id}", get(vaults::get_vault))
        .route("/vaults/{vault_id}/deposits", post(vaults::deposit))
        .route(
            "/vaults/{vault_id}/tickets/{ticket_id}/unwrap",
            post(vaults::unwrap_ticket),
        )
        .route(
            "/vaults/{vault_id}/tickets/{ticket_id}/reveal",
            post(vaults::reveal_ticket),
        )
        // Intents
        .route("/intents", post(intents::create_intent))
        .route("/intents/pending", get(intents::list_pending))
        .route("/intents/{intent_id}", get(intents::get_intent))
        .route("/intents/{intent_id}/expire", post(intents::expire_intent))
        // Settlement and custodians
        .route("/settlements", post(settlements::submit_settlement))
        .route("/authorize", post(settlements::authorize))
        // Attestation registry
        .route("/workers", post(workers::register_worker))
        .route("/workers/{record_id}", get(workers::get_worker))
        // Admin
        .route(
            "/admin/workers/{record_id}/deactivate",
            post(admin::deactivate_worker),
        )
        .route("/admin/pool", get(admin::pool_balances))
        .route("/admin/audit", get(admin::audit_log));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        vaults::create_vault,
        vaults::get_vault,
        vaults::deposit,
        vaults::unwrap_ticket,
        vaults::reveal_ticket,
        intents::create_intent,
        intents::list_pending,
        intents::get_intent,
        intents::expire_intent,
        settlements::submit_settlement,
        settlements::authorize,
        workers::register_worker,
        workers::get_worker,
        admin::deactivate_worker,
        admin::pool_balances,
        admin::audit_log
    ),
    components(
        schemas(
            VaultRecord,
            TicketRecord,
            TicketOrigin,
            SealedAmount,
            AccessScope,
            VaultResponse,
            DepositRequest,
            UnwrapRequest,
            UnwrapResponse,
            RevealResponse,
            CreateIntent,
            OutputMode,
            IntentRecord,
            IntentStatus,
            IntentOutcome,
            IntentView,
            PendingIntent,
            PendingIntentsResponse,
            SettlementRequest,
            SettlementReceipt,
            AuthorizeRequest,
            AuthorizationContext,
            Requester,
            AccessTarget,
            Decision,
            RegisterWorker,
            AttestationProof,
            AttestationDocument,
            AttestationRecord,
            PoolBalance,
            PoolResponse,
            AuditEvent,
            AuditEventType,
            AuditOutcome,
            AuditResource,
            AuditLogResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Vaults", description = "Vaults, deposits and withdrawals"),
        (name = "Intents", description = "Swap intents and expiry"),
        (name = "Settlements", description = "Worker settlements and custodian authorization"),
        (name = "Workers", description = "Attestation registry"),
        (name = "Admin", description = "Operator tooling")
    )
)]
struct ApiDoc;
