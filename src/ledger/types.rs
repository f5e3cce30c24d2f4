// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger records as persisted in redb.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::canonical::{CanonicalBytes, CIPHERTEXT_SCOPE};
use crate::decryption::{AuthorizationContext, DecryptError, ThresholdDecryption};

pub type VaultId = u64;
pub type TicketId = u64;
pub type IntentId = u64;
pub type RecordId = u64;
pub type Amount = u64;

/// Public asset label (e.g. `SUI`, `USDC`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AssetId(pub String);

impl AssetId {
    pub fn new(asset: impl Into<String>) -> Self {
        Self(asset.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Access scope bound into every ciphertext.
///
/// The decryption service only releases plaintext for requests whose target
/// vault and deployment namespace match this scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct AccessScope {
    pub namespace: String,
    pub vault_id: VaultId,
}

impl AccessScope {
    pub fn new(namespace: impl Into<String>, vault_id: VaultId) -> Self {
        Self {
            namespace: namespace.into(),
            vault_id,
        }
    }
}

/// Opaque encrypted amount. Only the threshold decryption service can open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SealedAmount {
    pub scope: AccessScope,
    /// Hex-encoded ciphertext.
    #[serde(with = "hex::serde")]
    #[schema(value_type = String)]
    pub ciphertext: Vec<u8>,
}

impl SealedAmount {
    pub fn new(scope: AccessScope, ciphertext: Vec<u8>) -> Self {
        Self { scope, ciphertext }
    }

    /// Content address of this ciphertext, bound to its scope.
    pub fn ciphertext_id(&self) -> String {
        CanonicalBytes::new(CIPHERTEXT_SCOPE)
            .str(&self.scope.namespace)
            .u64(self.scope.vault_id)
            .bytes(&self.ciphertext)
            .digest_hex()
    }

    /// Ask the decryption service to open this amount.
    pub async fn decrypt(
        &self,
        service: &dyn ThresholdDecryption,
        context: &AuthorizationContext,
    ) -> Result<Amount, DecryptError> {
        service.request(self, context).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VaultRecord {
    pub vault_id: VaultId,
    pub owner: String,
    /// Next vault-local ticket id. Ticket ids are never reused.
    pub next_ticket_id: TicketId,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicketOrigin {
    Deposit,
    Settlement { intent_id: IntentId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TicketRecord {
    pub vault_id: VaultId,
    pub ticket_id: TicketId,
    pub asset: AssetId,
    pub sealed: SealedAmount,
    pub origin: TicketOrigin,
    pub created_at: u64,
}

/// How settlement proceeds are written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// One new ticket holding the whole proceeds.
    #[default]
    Merged,
    /// One new ticket per consumed ticket, split pro-rata by contribution.
    PerTicket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntentRecord {
    pub intent_id: IntentId,
    pub vault_id: VaultId,
    pub owner: String,
    /// Tickets to consume, in submission order.
    pub ticket_ids: Vec<TicketId>,
    pub input_asset: AssetId,
    pub out_asset: AssetId,
    pub min_out: Amount,
    /// Unix seconds after which the intent may be expired.
    pub deadline: u64,
    #[serde(default)]
    pub output_mode: OutputMode,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Settled,
    Expired,
}

/// Terminal record written exactly once when an intent leaves the pending set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntentOutcome {
    pub intent_id: IntentId,
    pub status: IntentStatus,
    pub finalized_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_out: Option<Amount>,
    #[serde(default)]
    pub new_ticket_ids: Vec<TicketId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_receipt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntentView {
    pub intent: IntentRecord,
    pub status: IntentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<IntentOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PendingIntent {
    pub intent_id: IntentId,
    pub deadline: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_id_depends_on_scope() {
        let a = SealedAmount::new(AccessScope::new("ns", 1), vec![1, 2, 3]);
        let b = SealedAmount::new(AccessScope::new("ns", 2), vec![1, 2, 3]);
        assert_ne!(a.ciphertext_id(), b.ciphertext_id());
        assert_eq!(a.ciphertext_id().len(), 64);
    }

    #[test]
    fn sealed_amount_serializes_ciphertext_as_hex() {
        let sealed = SealedAmount::new(AccessScope::new("ns", 1), vec![0xab, 0xcd]);
        let json = serde_json::to_value(&sealed).unwrap();
        assert_eq!(json["ciphertext"], "abcd");
    }

    #[test]
    fn output_mode_defaults_to_merged() {
        let json = r#"{"intent_id":1,"vault_id":1,"owner":"o","ticket_ids":[1],
            "input_asset":"SUI","out_asset":"USDC","min_out":1,"deadline":5,"created_at":1}"#;
        let intent: IntentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(intent.output_mode, OutputMode::Merged);
    }
}
