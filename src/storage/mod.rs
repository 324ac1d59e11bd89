// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Storage Module
//!
//! Persistent storage for enrolled identities and the audit log, kept in a
//! plain directory (the "wallet") that survives process restarts.
//!
//! ## Storage Layout
//!
//! ```text
//! wallet/
//!   {label}.id               # One identity per label (certificate + key)
//!   audit/
//!     {date}/events.jsonl    # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - Identity files contain private keys; they are created owner-only.
//! - An identity file is never rewritten once created.

pub mod audit;
pub mod identity_store;
pub mod paths;
pub mod wallet_fs;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use identity_store::IdentityStore;
pub use paths::StoragePaths;
pub use wallet_fs::{StorageError, StorageResult, WalletStorage};
