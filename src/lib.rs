// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger Gateway - HTTP gateway for a permissioned ledger network
//!
//! Enrolls a registrar and an application identity with the network CA,
//! keeps them in a file-backed wallet, and dispatches query and submit
//! transactions to the transaction contract on behalf of HTTP clients.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `ca` - Certificate authority clients (Fabric CA, development CA)
//! - `enrollment` - Admin and application user bootstrap
//! - `ledger` - Ledger sessions and connectors
//! - `storage` - Wallet storage, identity store and audit log
//! - `transactions` - Transaction cache, identifier minting and submission

pub mod api;
pub mod ca;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod profile;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod transactions;
