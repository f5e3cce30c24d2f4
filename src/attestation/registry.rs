// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation registry: worker registration, deactivation and signature checks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedPrincipal;
use crate::ledger::{Ledger, LedgerError, LedgerResult, RecordId};
use crate::storage::ledger_db::ATTESTATION_COUNTER;
use crate::storage::{AdminAccess, AuditEvent, AuditEventType, LedgerRead};

use super::proof::{normalize_measurement, AttestationProof, RootOfTrust};
use super::signer::{normalize_public_key, verify_hex_signature};
use super::{AttestationError, AttestationRecord};

/// Trust anchor plus the measurements this deployment accepts.
#[derive(Debug, Clone)]
pub struct AttestationPolicy {
    root: RootOfTrust,
    /// Empty means any root-signed measurement is accepted.
    allowed_measurements: BTreeSet<String>,
}

impl AttestationPolicy {
    pub fn new(
        root: RootOfTrust,
        allowed_measurements: impl IntoIterator<Item = String>,
    ) -> Result<Self, AttestationError> {
        let allowed_measurements = allowed_measurements
            .into_iter()
            .map(|m| normalize_measurement(&m))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            root,
            allowed_measurements,
        })
    }

    pub fn root(&self) -> &RootOfTrust {
        &self.root
    }

    /// Validate a registration request, returning the normalized key and
    /// measurement set to record.
    pub fn check(
        &self,
        request: &RegisterWorker,
    ) -> Result<(String, BTreeSet<String>), AttestationError> {
        self.root.verify(&request.proof)?;

        let declared = normalize_all(&request.measurements)?;
        let attested = normalize_all(&request.proof.document.measurements)?;
        if declared.is_empty() || declared != attested {
            return Err(AttestationError::MeasurementMismatch { declared, attested });
        }

        let public_key = normalize_public_key(&request.public_key)?;
        if normalize_public_key(&request.proof.document.public_key)? != public_key {
            return Err(AttestationError::KeyMismatch);
        }

        if !self.allowed_measurements.is_empty() {
            if let Some(unknown) = declared
                .iter()
                .find(|m| !self.allowed_measurements.contains(*m))
            {
                return Err(AttestationError::MeasurementNotAllowed(unknown.clone()));
            }
        }

        Ok((public_key, declared))
    }
}

fn normalize_all(measurements: &BTreeSet<String>) -> Result<BTreeSet<String>, AttestationError> {
    measurements.iter().map(|m| normalize_measurement(m)).collect()
}

/// Request to bind a worker key to attested measurements.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterWorker {
    /// Measurement digests the worker claims to run.
    pub measurements: BTreeSet<String>,
    /// Worker public key, SEC1 hex.
    pub public_key: String,
    pub proof: AttestationProof,
}

impl AdminAccess for Ledger {}

impl Ledger {
    /// Create an active attestation record after checking the proof.
    ///
    /// A rejected proof creates no record. The rejection is audited only
    /// when the proof chains to the root and the key already has a record.
    pub fn register_worker(&self, request: &RegisterWorker) -> LedgerResult<AttestationRecord> {
        let (public_key, measurements) = match self.attestation_policy().check(request) {
            Ok(checked) => checked,
            Err(err) => {
                tracing::warn!(
                    public_key = %request.public_key,
                    error = %err,
                    "Rejected worker registration"
                );
                let verifiable = !matches!(
                    err,
                    AttestationError::UntrustedRoot | AttestationError::InvalidEncoding(_)
                );
                if verifiable && self.has_record_for_key(&request.public_key) {
                    self.record_rejection(
                        AuditEvent::new(AuditEventType::WorkerRejected)
                            .with_actor(request.public_key.clone())
                            .failed(err.to_string()),
                    );
                }
                return Err(err.into());
            }
        };

        let now = self.now();
        let record = self.db().write(|t| {
            if let Some(existing) = t.record_for_key(&public_key)? {
                if existing.active {
                    return Err(AttestationError::AlreadyRegistered {
                        record_id: existing.record_id,
                    }
                    .into());
                }
            }

            let record = AttestationRecord {
                record_id: t.next_id(ATTESTATION_COUNTER)?,
                public_key: public_key.clone(),
                measurements,
                module_id: request.proof.document.module_id.clone(),
                active: true,
                registered_at: now,
                deactivated_at: None,
            };
            t.put_attestation(&record)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::WorkerRegistered)
                    .with_actor(public_key.clone())
                    .with_resource("attestation", record.record_id.to_string())
                    .with_details(serde_json::json!({ "module_id": record.module_id })),
            )?;
            Ok(record)
        })?;

        tracing::info!(
            record_id = record.record_id,
            public_key = %record.public_key,
            "Registered worker"
        );
        Ok(record)
    }

    /// Admin-only. Marks the record inactive; records are never deleted.
    pub fn deactivate_worker(
        &self,
        principal: &AuthenticatedPrincipal,
        record_id: RecordId,
    ) -> LedgerResult<AttestationRecord> {
        self.check_admin_access(principal)?;

        let now = self.now();
        let record = self.db().write(|t| {
            let mut record = t
                .attestation(record_id)?
                .ok_or_else(|| LedgerError::not_found("attestation record", record_id))?;
            if !record.active {
                return Ok(record);
            }

            record.active = false;
            record.deactivated_at = Some(now);
            t.put_attestation(&record)?;
            t.append_audit(
                &AuditEvent::new(AuditEventType::WorkerDeactivated)
                    .with_actor(principal.principal_id.clone())
                    .with_resource("attestation", record_id.to_string()),
            )?;
            Ok(record)
        })?;

        tracing::info!(record_id, by = %principal.principal_id, "Deactivated worker");
        Ok(record)
    }

    /// Check `signature` over `message` against a record's key. Inactive
    /// records never verify.
    pub fn verify_signature(
        &self,
        message: &[u8],
        signature: &str,
        record_id: RecordId,
    ) -> LedgerResult<bool> {
        let record = self.attestation_record(record_id)?;
        Ok(record.active && verify_hex_signature(&record.public_key, message, signature))
    }

    pub fn attestation_record(&self, record_id: RecordId) -> LedgerResult<AttestationRecord> {
        self.db()
            .read(|s| s.attestation(record_id))?
            .ok_or_else(|| LedgerError::not_found("attestation record", record_id))
    }

    fn has_record_for_key(&self, public_key: &str) -> bool {
        let Ok(public_key) = normalize_public_key(public_key) else {
            return false;
        };
        matches!(self.db().read(|s| s.record_for_key(&public_key)), Ok(Some(_)))
    }

    /// Active record for a worker key, if any.
    pub fn active_record_for_key(&self, public_key: &str) -> LedgerResult<Option<AttestationRecord>> {
        let Ok(public_key) = normalize_public_key(public_key) else {
            return Ok(None);
        };
        let record = self.db().read(|s| s.record_for_key(&public_key))?;
        Ok(record.filter(|r| r.active))
    }
}
