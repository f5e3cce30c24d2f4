// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Data directory layout.

use std::io;
use std::path::{Path, PathBuf};

/// `DATA_DIR` when unset.
pub const DATA_ROOT: &str = "/data";

const LEDGER_FILE: &str = "ledger.redb";
const WORKERS_DIR: &str = "workers";
const WORKER_KEY_FILE: &str = "key.pem";

#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_db(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    /// Replica `n`'s private directory. Only its signing key lives here.
    pub fn replica_dir(&self, replica: usize) -> PathBuf {
        self.root.join(WORKERS_DIR).join(format!("replica-{replica}"))
    }

    /// PKCS#8 PEM signing key of replica `n`; never served over the API.
    pub fn worker_key(&self, replica: usize) -> PathBuf {
        self.replica_dir(replica).join(WORKER_KEY_FILE)
    }

    /// Create the root and one directory per replica.
    pub fn ensure_layout(&self, replicas: usize) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for replica in 0..replicas {
            std::fs::create_dir_all(self.replica_dir(replica))?;
        }
        Ok(())
    }
}
