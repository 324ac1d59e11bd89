// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the wallet directory layout.

use std::path::{Path, PathBuf};

/// Default wallet directory, relative to the working directory.
pub const DEFAULT_WALLET_DIR: &str = "wallet";

/// File extension used for identity files (Fabric file-system wallet format).
pub const IDENTITY_EXTENSION: &str = "id";

/// Storage path utilities for the wallet directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DEFAULT_WALLET_DIR)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory of the wallet.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Identity Paths ==========

    /// Identities live directly in the wallet root, one file per label.
    pub fn identities_dir(&self) -> PathBuf {
        self.root.clone()
    }

    /// Path to the identity file for a label.
    pub fn identity(&self, label: &str) -> PathBuf {
        self.identities_dir()
            .join(format!("{label}.{IDENTITY_EXTENSION}"))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}
