// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Confidential Settlement - Attested Intent Settlement Service
//!
//! Users hold sealed balance tickets in vaults and submit swap intents.
//! Attested worker replicas decrypt the tickets through a threshold
//! decryption committee, execute one aggregated swap, re-seal the proceeds
//! and commit the settlement atomically. Any number of replicas may race on
//! the same intent; exactly one settlement commits.
//!
//! ## Modules
//!
//! - `ledger` - Vaults, custody pool, intent registry and atomic settlement (redb)
//! - `attestation` - Worker keys, attestation proofs and the registry
//! - `gateway` - Decryption authorization policy
//! - `decryption` - Threshold decryption adapters
//! - `venue` - Swap venue adapters
//! - `worker` - The confidential worker pipeline
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer-token authentication
//! - `storage` - redb tables, audit trail, ownership checks

pub mod api;
pub mod attestation;
pub mod auth;
pub mod canonical;
pub mod clock;
pub mod config;
pub mod decryption;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod state;
pub mod storage;
pub mod venue;
pub mod worker;
