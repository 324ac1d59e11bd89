// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity store backed by the wallet directory.
//!
//! ## Storage Layout
//!
//! One file per label, in the Fabric file-system wallet format:
//! ```text
//! wallet/
//!   admin.id      # {"credentials":{...},"mspId":"Org1MSP","type":"X.509","version":1}
//!   appUser.id
//! ```
//!
//! Identities are immutable: `put` on an existing label fails with
//! `AlreadyExists` and never overwrites the stored credentials.

use serde::{Deserialize, Serialize};

use super::paths::IDENTITY_EXTENSION;
use super::{StorageError, StorageResult, WalletStorage};
use crate::identity::{Identity, IdentityKind, PrivateKeyPem};

/// Wallet file format version written by this store.
const WALLET_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCredentials {
    certificate: String,
    private_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletEntry {
    credentials: WalletCredentials,
    msp_id: String,
    #[serde(rename = "type")]
    kind: IdentityKind,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    WALLET_FORMAT_VERSION
}

impl WalletEntry {
    fn from_identity(identity: &Identity) -> Self {
        Self {
            credentials: WalletCredentials {
                certificate: identity.certificate.clone(),
                private_key: identity.private_key.expose().to_string(),
            },
            msp_id: identity.msp_id.clone(),
            kind: identity.kind,
            version: WALLET_FORMAT_VERSION,
        }
    }

    fn into_identity(self, label: &str) -> Identity {
        Identity {
            label: label.to_string(),
            certificate: self.credentials.certificate,
            private_key: PrivateKeyPem::new(self.credentials.private_key),
            msp_id: self.msp_id,
            kind: self.kind,
        }
    }
}

/// Persistent label → identity store.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    storage: WalletStorage,
}

impl IdentityStore {
    pub fn new(storage: WalletStorage) -> Self {
        Self { storage }
    }

    /// Underlying wallet storage (shared with the audit log).
    pub fn storage(&self) -> &WalletStorage {
        &self.storage
    }

    /// Check if an identity is stored under `label`.
    pub fn exists(&self, label: &str) -> bool {
        validate_label(label).is_ok() && self.storage.exists(self.storage.paths().identity(label))
    }

    /// Load the identity stored under `label`.
    pub fn get(&self, label: &str) -> StorageResult<Identity> {
        validate_label(label)?;

        let path = self.storage.paths().identity(label);
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!("Identity {label}")));
        }

        let entry: WalletEntry = self.storage.read_json(path)?;
        Ok(entry.into_identity(label))
    }

    /// Persist a new identity under its label.
    ///
    /// # Returns
    /// - `Ok(())` once the identity file is durably written
    /// - `Err(StorageError::AlreadyExists)` if the label is taken
    pub fn put(&self, identity: &Identity) -> StorageResult<()> {
        validate_label(&identity.label)?;

        let path = self.storage.paths().identity(&identity.label);
        self.storage
            .create_json(path, &WalletEntry::from_identity(identity))
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => {
                    StorageError::AlreadyExists(format!("Identity {}", identity.label))
                }
                other => other,
            })
    }

    /// Labels of all stored identities, sorted.
    pub fn list_labels(&self) -> StorageResult<Vec<String>> {
        self.storage
            .list_files(self.storage.paths().identities_dir(), IDENTITY_EXTENSION)
    }
}

fn validate_label(label: &str) -> StorageResult<()> {
    let valid = !label.is_empty()
        && label.len() <= 128
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        && !label.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(format!("invalid identity label {label:?}")))
    }
}
