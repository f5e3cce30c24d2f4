// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership enforcement for owner-only ledger operations.
//!
//! Vault owners are immutable after creation, so a deposit, unwrap or
//! intent passes the check iff the caller is the recorded owner.

use crate::auth::AuthenticatedPrincipal;
use crate::ledger::{LedgerError, LedgerResult};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    /// Get the owner's principal ID.
    fn owner_principal_id(&self) -> &str;

    /// Resource label used in permission errors.
    fn resource_label(&self) -> String;
}

/// Trait for enforcing ownership on ledger operations.
pub trait OwnershipEnforcer {
    /// Verify that the principal owns this resource.
    ///
    /// # Errors
    /// Returns `LedgerError::PermissionDenied` if the principal doesn't own the resource.
    fn verify_ownership(&self, principal: &AuthenticatedPrincipal, action: &str) -> LedgerResult<()>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, principal: &AuthenticatedPrincipal, action: &str) -> LedgerResult<()> {
        if self.owner_principal_id() == principal.principal_id {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied {
                principal: principal.principal_id.clone(),
                action: format!("{action} {}", self.resource_label()),
            })
        }
    }
}

/// Admin-level operations (worker deactivation).
pub trait AdminAccess {
    /// Check if the principal has admin privileges for this operation.
    fn check_admin_access(&self, principal: &AuthenticatedPrincipal) -> LedgerResult<()> {
        if principal.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::PermissionDenied {
                principal: principal.principal_id.clone(),
                action: "perform admin operation".to_string(),
            })
        }
    }
}
