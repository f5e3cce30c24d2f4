// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process k-of-n custodian committee.
//!
//! Ciphertexts are AES-256-GCM under a per-scope key derived from the master
//! secret with HMAC-SHA256; the scope is bound as associated data, so a
//! ciphertext moved to another vault or deployment fails to open. Layout:
//! `nonce (12) || ciphertext+tag`, plaintext is the amount as u64 big-endian.
//!
//! Each online custodian independently checks the request signature and
//! evaluates the authorization gateway against the ledger. Plaintext is
//! released only with at least `threshold` approvals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::canonical::{CanonicalBytes, SEAL_KEY_SCOPE};
use crate::gateway::Decision;
use crate::ledger::{AccessScope, Amount, Ledger, SealedAmount};

use super::{AuthorizationContext, DecryptError, ThresholdDecryption};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

struct Custodian {
    online: AtomicBool,
}

pub struct LocalThresholdService {
    ledger: Arc<Ledger>,
    master_key: Vec<u8>,
    custodians: Vec<Custodian>,
    threshold: usize,
}

impl LocalThresholdService {
    pub fn new(
        ledger: Arc<Ledger>,
        master_key: &[u8],
        custodian_count: usize,
        threshold: usize,
    ) -> Result<Self, DecryptError> {
        if master_key.len() < 32 {
            return Err(DecryptError::Malformed(
                "master key must be at least 32 bytes".into(),
            ));
        }
        if threshold == 0 || threshold > custodian_count {
            return Err(DecryptError::Malformed(format!(
                "threshold {threshold} must be within 1..={custodian_count}"
            )));
        }
        let custodians = (0..custodian_count)
            .map(|_| Custodian {
                online: AtomicBool::new(true),
            })
            .collect();
        Ok(Self {
            ledger,
            master_key: master_key.to_vec(),
            custodians,
            threshold,
        })
    }

    /// Take a custodian offline (or back online).
    pub fn set_custodian_online(&self, index: usize, online: bool) {
        if let Some(custodian) = self.custodians.get(index) {
            custodian.online.store(online, Ordering::SeqCst);
        }
    }

    fn cipher(&self, scope: &AccessScope) -> Result<Aes256Gcm, DecryptError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.master_key)
            .map_err(|e| DecryptError::Malformed(format!("master key: {e}")))?;
        mac.update(&scope_bytes(SEAL_KEY_SCOPE, scope));
        let key = mac.finalize().into_bytes();
        Aes256Gcm::new_from_slice(&key).map_err(|e| DecryptError::Malformed(format!("scope key: {e}")))
    }

    fn open(&self, sealed: &SealedAmount) -> Result<Amount, DecryptError> {
        if sealed.ciphertext.len() <= NONCE_LEN {
            return Err(DecryptError::Malformed("ciphertext too short".into()));
        }
        let (nonce, body) = sealed.ciphertext.split_at(NONCE_LEN);
        let aad = scope_bytes("aad", &sealed.scope);
        let plaintext = self
            .cipher(&sealed.scope)?
            .decrypt(Nonce::from_slice(nonce), Payload { msg: body, aad: &aad })
            .map_err(|_| DecryptError::Malformed("ciphertext does not open under its scope".into()))?;
        let bytes: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| DecryptError::Malformed("plaintext is not an amount".into()))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

fn scope_bytes(tag: &str, scope: &AccessScope) -> Vec<u8> {
    CanonicalBytes::new(tag)
        .str(&scope.namespace)
        .u64(scope.vault_id)
        .finish()
}

#[async_trait]
impl ThresholdDecryption for LocalThresholdService {
    async fn seal(&self, scope: &AccessScope, amount: Amount) -> Result<SealedAmount, DecryptError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let aad = scope_bytes("aad", scope);
        let body = self
            .cipher(scope)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &amount.to_be_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| DecryptError::Malformed(format!("seal failed: {e}")))?;

        let mut ciphertext = Vec::with_capacity(NONCE_LEN + body.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&body);
        Ok(SealedAmount::new(scope.clone(), ciphertext))
    }

    async fn request(
        &self,
        sealed: &SealedAmount,
        context: &AuthorizationContext,
    ) -> Result<Amount, DecryptError> {
        if context.ciphertext_id != sealed.ciphertext_id() {
            return Err(DecryptError::Malformed(
                "context does not reference this ciphertext".into(),
            ));
        }

        let mut approvals = 0;
        let mut reachable = 0;
        let mut denial = None;
        for custodian in &self.custodians {
            if !custodian.online.load(Ordering::SeqCst) {
                continue;
            }
            if !context.verify_signature() {
                reachable += 1;
                denial.get_or_insert_with(|| "request signature does not verify".to_string());
                continue;
            }
            match self
                .ledger
                .evaluate(&context.requester, &sealed.scope, &context.target)
            {
                Ok(Decision::Approved) => {
                    reachable += 1;
                    approvals += 1;
                }
                Ok(Decision::Denied { reason }) => {
                    reachable += 1;
                    denial.get_or_insert(reason);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Custodian could not read ledger");
                }
            }
        }

        if approvals >= self.threshold {
            return self.open(sealed);
        }
        if let Some(reason) = denial {
            tracing::warn!(
                access = ?context.target,
                approvals,
                threshold = self.threshold,
                reason = %reason,
                "Decryption denied"
            );
            return Err(DecryptError::Denied(reason));
        }
        Err(DecryptError::Transient(format!(
            "{reachable} of {} custodians reachable, {} required",
            self.custodians.len(),
            self.threshold
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::attestation::{AttestationSource, RegisterWorker, WorkerSigner, MOCK_MEASUREMENT};
    use crate::gateway::AccessTarget;
    use crate::ledger::test_support::{owner, TestLedger};

    const MASTER: [u8; 32] = [7u8; 32];

    async fn setup() -> (TestLedger, LocalThresholdService, WorkerSigner) {
        let env = TestLedger::new();
        let service = LocalThresholdService::new(env.ledger.clone(), &MASTER, 3, 2).unwrap();
        let signer = WorkerSigner::generate();
        env.ledger
            .register_worker(&RegisterWorker {
                measurements: BTreeSet::from([MOCK_MEASUREMENT.to_string()]),
                public_key: signer.public_key_hex().to_string(),
                proof: env.attestation.attest(signer.public_key_hex()).await.unwrap(),
            })
            .unwrap();
        (env, service, signer)
    }

    async fn deposit(env: &TestLedger, service: &LocalThresholdService, amount: Amount) -> (AccessTarget, SealedAmount) {
        let alice = owner("alice");
        let vault = env.ledger.create_vault(&alice).unwrap();
        let sealed = service.seal(&env.ledger.scope_for(vault.vault_id), amount).await.unwrap();
        let ticket = env
            .ledger
            .deposit(&alice, vault.vault_id, &"SUI".into(), amount, sealed.clone())
            .unwrap();
        (
            AccessTarget::Ticket { vault_id: vault.vault_id, ticket_id: ticket.ticket_id },
            sealed,
        )
    }

    #[tokio::test]
    async fn attested_worker_opens_ticket() {
        let (env, service, signer) = setup().await;
        let (target, sealed) = deposit(&env, &service, 60).await;

        let context = AuthorizationContext::for_worker(&signer, target, &sealed, env.ledger.now());
        assert_eq!(sealed.decrypt(&service, &context).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn owner_opens_own_ticket_only() {
        let (env, service, _) = setup().await;
        let (target, sealed) = deposit(&env, &service, 5).await;

        let alice = AuthorizationContext::for_owner("alice", target, &sealed, 0);
        assert_eq!(service.request(&sealed, &alice).await.unwrap(), 5);

        let bob = AuthorizationContext::for_owner("bob", target, &sealed, 0);
        assert!(matches!(service.request(&sealed, &bob).await, Err(DecryptError::Denied(_))));
    }

    #[tokio::test]
    async fn unattested_worker_is_denied() {
        let (env, service, _) = setup().await;
        let (target, sealed) = deposit(&env, &service, 5).await;

        let stranger = WorkerSigner::generate();
        let context = AuthorizationContext::for_worker(&stranger, target, &sealed, 0);
        assert!(matches!(service.request(&sealed, &context).await, Err(DecryptError::Denied(_))));
    }

    #[tokio::test]
    async fn below_threshold_is_transient() {
        let (env, service, signer) = setup().await;
        let (target, sealed) = deposit(&env, &service, 5).await;
        service.set_custodian_online(0, false);
        service.set_custodian_online(1, false);

        let context = AuthorizationContext::for_worker(&signer, target, &sealed, 0);
        let err = service.request(&sealed, &context).await.unwrap_err();
        assert!(err.is_transient());

        service.set_custodian_online(1, true);
        assert_eq!(service.request(&sealed, &context).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn ciphertext_moved_to_another_scope_does_not_open() {
        let (env, service, _) = setup().await;
        let (target, sealed) = deposit(&env, &service, 5).await;

        let moved = SealedAmount::new(AccessScope::new("other", 99), sealed.ciphertext.clone());
        assert!(service.open(&moved).is_err());

        let context = AuthorizationContext::for_owner("alice", target, &sealed, 0);
        assert!(matches!(
            service.request(&moved, &context).await,
            Err(DecryptError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_bad_parameters() {
        let env = TestLedger::new();
        assert!(LocalThresholdService::new(env.ledger.clone(), &MASTER, 3, 4).is_err());
        assert!(LocalThresholdService::new(env.ledger.clone(), &MASTER, 3, 0).is_err());
        assert!(LocalThresholdService::new(env.ledger.clone(), &[1u8; 8], 3, 2).is_err());
    }
}
