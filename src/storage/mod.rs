// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state lives in a single redb database under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   ledger.redb                 # Vaults, tickets, pool, intents, attestations, audit
//!   workers/replica-{n}/
//!     key.pem                   # Worker signing key (NEVER exposed via API)
//! ```

pub mod audit;
pub mod ledger_db;
pub mod ownership;
pub mod paths;

pub use audit::{AuditEvent, AuditEventType, AuditOutcome, AuditResource};
pub use ledger_db::{LedgerDb, LedgerRead, LedgerSnapshot, LedgerTables};
pub use ownership::{AdminAccess, OwnedResource, OwnershipEnforcer};
pub use paths::StoragePaths;
