// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end settlement scenarios against a real redb ledger, the in-process
//! threshold committee and scripted swap venues.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use confidential_settlement::{
    api::router,
    attestation::{
        AttestationPolicy, AttestationSource, MockAttestationSource, RegisterWorker, WorkerSigner,
    },
    auth::{AuthenticatedPrincipal, Role},
    clock::ManualClock,
    decryption::{AuthorizationContext, LocalThresholdService, ThresholdDecryption},
    error::ErrorCategory,
    gateway::{AccessTarget, Decision, Requester},
    ledger::{
        Amount, AssetId, CreateIntent, IntentId, IntentStatus, Ledger, LedgerConfig, LedgerError,
        OutputMode, TicketOrigin, VaultId,
    },
    state::{AppState, AuthConfig},
    venue::{Quote, SwapFailure, SwapReceipt, SwapVenue, VenueError},
    worker::{ConfidentialWorker, ProcessOutcome, RetryPolicy, WorkerConfig, WorkerError},
};

const START: u64 = 1_700_000_000;
const DEADLINE: u64 = START + 600;
const SECRET: &str = "scenario-secret";

/// Venue that always fills at a fixed output amount.
struct FixedVenue {
    out: Amount,
}

#[async_trait]
impl SwapVenue for FixedVenue {
    async fn quote(
        &self,
        asset_in: &AssetId,
        asset_out: &AssetId,
        amount: Amount,
    ) -> Result<Quote, VenueError> {
        Ok(Quote {
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
            amount_in: amount,
            amount_out: self.out,
        })
    }

    async fn execute(
        &self,
        _asset_in: &AssetId,
        _asset_out: &AssetId,
        _amount: Amount,
        min_out: Amount,
    ) -> Result<SwapReceipt, VenueError> {
        if self.out < min_out {
            return Err(VenueError::Failure(SwapFailure::SlippageExceeded));
        }
        Ok(SwapReceipt {
            realized_out: self.out,
            receipt: format!("fixed-{}", self.out),
        })
    }
}

struct Scenario {
    ledger: Arc<Ledger>,
    clock: Arc<ManualClock>,
    attestation: MockAttestationSource,
    decryption: Arc<LocalThresholdService>,
    venue: Arc<FixedVenue>,
    _dir: TempDir,
}

impl Scenario {
    fn new(venue_out: Amount) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let attestation = MockAttestationSource::new();
        let ledger = Arc::new(
            Ledger::open(
                &dir.path().join("ledger.redb"),
                LedgerConfig {
                    namespace: "scenario".to_string(),
                    attestation: AttestationPolicy::new(attestation.root_of_trust(), Vec::new())
                        .unwrap(),
                },
                clock.clone(),
            )
            .unwrap(),
        );
        let decryption =
            Arc::new(LocalThresholdService::new(ledger.clone(), &[9u8; 32], 3, 2).unwrap());
        Self {
            ledger,
            clock,
            attestation,
            decryption,
            venue: Arc::new(FixedVenue { out: venue_out }),
            _dir: dir,
        }
    }

    async fn worker(&self, replica: usize) -> Arc<ConfidentialWorker> {
        let worker = ConfidentialWorker::new(
            replica,
            self.ledger.clone(),
            self.decryption.clone(),
            self.venue.clone(),
            WorkerSigner::generate(),
            WorkerConfig {
                poll_interval: Duration::from_millis(20),
                max_concurrency: 4,
                retry: RetryPolicy {
                    initial: Duration::from_millis(1),
                    max: Duration::from_millis(2),
                    multiplier: 2,
                    max_attempts: 2,
                },
            },
        );
        worker.ensure_registered(&self.attestation).await.unwrap();
        Arc::new(worker)
    }

    /// Vault of `alice` with one sealed deposit per amount.
    async fn vault(&self, asset: &str, amounts: &[Amount]) -> VaultId {
        let alice = alice();
        let vault = self.ledger.create_vault(&alice).unwrap();
        for &amount in amounts {
            let sealed = self
                .decryption
                .seal(&self.ledger.scope_for(vault.vault_id), amount)
                .await
                .unwrap();
            self.ledger
                .deposit(&alice, vault.vault_id, &AssetId::from(asset), amount, sealed)
                .unwrap();
        }
        vault.vault_id
    }

    fn intent(&self, vault_id: VaultId, min_out: Amount, mode: OutputMode) -> IntentId {
        let ticket_ids = self
            .ledger
            .tickets(vault_id)
            .unwrap()
            .iter()
            .map(|t| t.ticket_id)
            .collect();
        self.ledger
            .create_intent(
                &alice(),
                &CreateIntent {
                    vault_id,
                    ticket_ids,
                    out_asset: "B".into(),
                    min_out,
                    deadline: DEADLINE,
                    output_mode: mode,
                },
            )
            .unwrap()
            .intent_id
    }

    /// Owner-authorized plaintext of every ticket in the vault.
    async fn open(&self, vault_id: VaultId) -> Vec<Amount> {
        let mut amounts = Vec::new();
        for ticket in self.ledger.tickets(vault_id).unwrap() {
            let context = AuthorizationContext::for_owner(
                "alice",
                AccessTarget::Ticket {
                    vault_id,
                    ticket_id: ticket.ticket_id,
                },
                &ticket.sealed,
                self.ledger.now(),
            );
            amounts.push(self.decryption.request(&ticket.sealed, &context).await.unwrap());
        }
        amounts
    }

    fn status(&self, intent_id: IntentId) -> IntentStatus {
        self.ledger.intent_view(intent_id).unwrap().status
    }
}

fn alice() -> AuthenticatedPrincipal {
    AuthenticatedPrincipal::new("alice", Role::Client)
}

#[tokio::test]
async fn merged_swap_replaces_inputs_with_one_output_ticket() {
    let s = Scenario::new(95);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    let outcome = worker.process_intent(intent_id).await.unwrap();
    let ProcessOutcome::Settled(receipt) = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert_eq!(receipt.new_ticket_ids, vec![3]);

    let tickets = s.ledger.tickets(vault_id).unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].ticket_id, 3);
    assert_eq!(tickets[0].asset, AssetId::from("B"));
    assert_eq!(tickets[0].origin, TicketOrigin::Settlement { intent_id });
    assert_eq!(s.open(vault_id).await, vec![95]);

    let view = s.ledger.intent_view(intent_id).unwrap();
    assert_eq!(view.status, IntentStatus::Settled);
    let outcome = view.outcome.unwrap();
    assert_eq!(outcome.realized_out, Some(95));
    assert_eq!(outcome.venue_receipt.as_deref(), Some("fixed-95"));

    assert_eq!(s.ledger.pool_balance(&"A".into()).unwrap(), 0);
    assert_eq!(s.ledger.pool_balance(&"B".into()).unwrap(), 95);
    assert!(s.ledger.list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn slippage_leaves_intent_pending_until_expiry() {
    let s = Scenario::new(85);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    let err = worker.process_intent(intent_id).await.unwrap_err();
    assert!(
        matches!(err, WorkerError::Venue(VenueError::Failure(SwapFailure::SlippageExceeded))),
        "unexpected error {err:?}"
    );
    assert_eq!(s.status(intent_id), IntentStatus::Pending);
    assert_eq!(s.ledger.tickets(vault_id).unwrap().len(), 2);

    let early = s.ledger.expire(intent_id).unwrap_err();
    assert!(matches!(early, LedgerError::DeadlineNotReached { .. }));

    s.clock.set(DEADLINE + 1);
    let outcome = s.ledger.expire(intent_id).unwrap();
    assert_eq!(outcome.status, IntentStatus::Expired);
    assert_eq!(s.status(intent_id), IntentStatus::Expired);

    // Inputs are spendable again.
    let tickets = s.ledger.tickets(vault_id).unwrap();
    assert_eq!(tickets.iter().map(|t| t.ticket_id).collect::<Vec<_>>(), vec![1, 2]);
    s.ledger.unwrap(&alice(), vault_id, 1, 60).unwrap();
    assert_eq!(s.ledger.pool_balance(&"A".into()).unwrap(), 40);
}

#[tokio::test]
async fn racing_replicas_settle_exactly_once() {
    let s = Scenario::new(95);
    let first = s.worker(0).await;
    let second = s.worker(1).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    // Both replicas complete the pipeline up to the commit.
    let winner = first.prepare_settlement(intent_id).await.unwrap();
    let loser = second.prepare_settlement(intent_id).await.unwrap();

    s.ledger.settle(&winner).unwrap();
    let audit_before = s.ledger.audit_events(0, 1_000).unwrap().len();
    let pool_before = s.ledger.pool_balances().unwrap();
    let tickets_before = s.ledger.tickets(vault_id).unwrap();

    let err = s.ledger.settle(&loser).unwrap_err();
    assert!(matches!(err, LedgerError::NotPending { intent_id: id } if id == intent_id));

    assert_eq!(s.ledger.audit_events(0, 1_000).unwrap().len(), audit_before);
    assert_eq!(s.ledger.pool_balances().unwrap(), pool_before);
    assert_eq!(s.ledger.tickets(vault_id).unwrap(), tickets_before);
    assert_eq!(s.open(vault_id).await, vec![95]);
}

#[tokio::test]
async fn concurrent_workers_commit_one_settlement() {
    let s = Scenario::new(95);
    let first = s.worker(0).await;
    let second = s.worker(1).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    let (a, b) = tokio::join!(first.process_intent(intent_id), second.process_intent(intent_id));
    let outcomes = [a.unwrap(), b.unwrap()];
    let settled = outcomes
        .iter()
        .filter(|o| matches!(o, ProcessOutcome::Settled(_)))
        .count();
    assert_eq!(settled, 1, "outcomes: {outcomes:?}");

    assert_eq!(s.ledger.tickets(vault_id).unwrap().len(), 1);
    assert_eq!(s.ledger.pool_balance(&"B".into()).unwrap(), 95);
}

#[tokio::test]
async fn measurement_mismatch_creates_no_record() {
    let s = Scenario::new(95);
    let signer = WorkerSigner::generate();
    let proof = s.attestation.attest(signer.public_key_hex()).await.unwrap();

    let request = RegisterWorker {
        measurements: BTreeSet::from(["ab".repeat(32)]),
        public_key: signer.public_key_hex().to_string(),
        proof,
    };
    let err = s.ledger.register_worker(&request).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert!(s
        .ledger
        .active_record_for_key(signer.public_key_hex())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn per_ticket_output_splits_pro_rata() {
    let s = Scenario::new(101);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::PerTicket);

    let outcome = worker.process_intent(intent_id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Settled(_)));

    let shares = s.open(vault_id).await;
    assert_eq!(shares.len(), 2);
    assert_eq!(shares.iter().sum::<Amount>(), 101);
    assert!(shares[0] > shares[1]);
    assert_eq!(s.ledger.pool_balance(&"B".into()).unwrap(), 101);
}

#[tokio::test]
async fn deactivated_worker_cannot_decrypt_or_settle() {
    let s = Scenario::new(95);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    // Signed before deactivation, submitted after.
    let request = worker.prepare_settlement(intent_id).await.unwrap();

    let record = s
        .ledger
        .active_record_for_key(worker.public_key())
        .unwrap()
        .unwrap();
    let admin = AuthenticatedPrincipal::new("ops", Role::Admin);
    s.ledger.deactivate_worker(&admin, record.record_id).unwrap();

    let err = s.ledger.settle(&request).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);

    let err = worker.process_intent(intent_id).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(s.status(intent_id), IntentStatus::Pending);
    assert_eq!(s.ledger.tickets(vault_id).unwrap().len(), 2);
}

#[tokio::test]
async fn gateway_decisions_are_repeatable() {
    let s = Scenario::new(95);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60]).await;
    let scope = s.ledger.scope_for(vault_id);
    let target = AccessTarget::Ticket {
        vault_id,
        ticket_id: 1,
    };

    let requesters = [
        Requester::Owner {
            principal_id: "alice".into(),
        },
        Requester::Owner {
            principal_id: "mallory".into(),
        },
        Requester::Worker {
            public_key: worker.public_key().to_string(),
        },
        Requester::Worker {
            public_key: WorkerSigner::generate().public_key_hex().to_string(),
        },
    ];
    let expected = [true, false, true, false];

    for (requester, approved) in requesters.iter().zip(expected) {
        let first = s.ledger.evaluate(requester, &scope, &target).unwrap();
        let second = s.ledger.evaluate(requester, &scope, &target).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.is_approved(), approved, "{requester:?}");
    }

    let missing = AccessTarget::Ticket {
        vault_id,
        ticket_id: 9,
    };
    let decision = s.ledger.evaluate(&requesters[0], &scope, &missing).unwrap();
    assert!(matches!(decision, Decision::Denied { .. }));
}

#[tokio::test]
async fn settlement_after_deadline_is_rejected() {
    let s = Scenario::new(95);
    let worker = s.worker(0).await;
    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    let request = worker.prepare_settlement(intent_id).await.unwrap();
    s.clock.set(DEADLINE + 1);

    let err = s.ledger.settle(&request).unwrap_err();
    assert!(matches!(err, LedgerError::DeadlinePassed { .. }));
    assert_eq!(s.status(intent_id), IntentStatus::Pending);
    assert_eq!(s.ledger.pool_balance(&"A".into()).unwrap(), 100);

    s.ledger.expire(intent_id).unwrap();
    assert_eq!(s.status(intent_id), IntentStatus::Expired);
}

#[tokio::test]
async fn run_loop_settles_new_intents() {
    let s = Scenario::new(95);
    let workers = [s.worker(0).await, s.worker(1).await];
    let shutdown = CancellationToken::new();
    let handles: Vec<_> = workers
        .iter()
        .map(|w| tokio::spawn(Arc::clone(w).run(shutdown.clone())))
        .collect();

    let vault_id = s.vault("A", &[60, 40]).await;
    let intent_id = s.intent(vault_id, 90, OutputMode::Merged);

    tokio::time::timeout(Duration::from_secs(5), async {
        while s.status(intent_id) != IntentStatus::Settled {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("intent was not settled");

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(s.ledger.tickets(vault_id).unwrap().len(), 1);
    assert_eq!(s.ledger.pool_balance(&"B".into()).unwrap(), 95);
}

fn token(sub: &str, role: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": sub, "role": role, "exp": chrono::Utc::now().timestamp() + 3600 }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

async fn call(app: &Router, method: &str, uri: &str, bearer: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {bearer}"));
    let request = match body {
        Some(body) => request
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn api_intent_is_settled_by_worker() {
    let s = Scenario::new(95);
    let worker = s.worker(0).await;
    let app = router(AppState::new(
        s.ledger.clone(),
        s.decryption.clone(),
        AuthConfig {
            secret: Some(SECRET.to_string()),
            issuer: None,
        },
    ));
    let alice = token("alice", "client");

    let (status, vault) = call(&app, "POST", "/v1/vaults", &alice, None).await;
    assert_eq!(status, StatusCode::CREATED);
    let vault_id = vault["vault_id"].as_u64().unwrap();
    for amount in [60, 40] {
        let (status, _) = call(
            &app,
            "POST",
            &format!("/v1/vaults/{vault_id}/deposits"),
            &alice,
            Some(json!({ "asset": "A", "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, intent) = call(
        &app,
        "POST",
        "/v1/intents",
        &alice,
        Some(json!({
            "vault_id": vault_id,
            "ticket_ids": [1, 2],
            "out_asset": "B",
            "min_out": 90,
            "deadline": DEADLINE,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let intent_id = intent["intent_id"].as_u64().unwrap();

    let outcome = worker.process_intent(intent_id).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Settled(_)));

    let (status, view) = call(&app, "GET", &format!("/v1/intents/{intent_id}"), &alice, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "settled");
    assert_eq!(view["outcome"]["realized_out"], 95);

    let (status, revealed) = call(
        &app,
        "POST",
        &format!("/v1/vaults/{vault_id}/tickets/3/reveal"),
        &alice,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revealed["asset"], "B");
    assert_eq!(revealed["amount"], 95);

    let auditor = token("audit", "auditor");
    let (status, pool) = call(&app, "GET", "/v1/admin/pool", &auditor, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pool["balances"], json!([{ "asset": "A", "balance": 0 }, { "asset": "B", "balance": 95 }]));
}
