// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Access
//!
//! Connections to the ledger network are made on behalf of a stored
//! identity and scoped to one channel. A [`LedgerSession`] wraps a
//! connection, resolves contracts on its channel and releases the
//! connection on every exit path.
//!
//! ## Backends
//!
//! - [`HttpLedgerConnector`]: signed JSON calls to a ledger gateway REST
//!   endpoint.
//! - [`InMemoryLedger`]: the transaction contract evaluated in process.

pub mod http;
pub mod memory;
pub mod session;

use std::time::Duration;

use async_trait::async_trait;

use crate::identity::Identity;

pub use http::HttpLedgerConnector;
pub use memory::InMemoryLedger;
pub use session::{Contract, LedgerGateway, LedgerSession, SessionSettings};

/// Transaction names exposed by the transaction contract.
pub mod transactions {
    pub const INIT_LEDGER: &str = "InitLedger";
    pub const CREATE_TRANSACTION: &str = "CreateTransaction";
    pub const QUERY_TRANSACTION: &str = "QueryTransaction";
    pub const QUERY_ALL_TRANSACTIONS: &str = "QueryAllTransactions";
}

/// Errors that can occur while talking to the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger connection failed: {0}")]
    Connection(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Ledger call timed out after {0:?}")]
    Timeout(Duration),
}

/// Opens connections to the ledger network.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    /// Connect as `identity` to `channel`.
    async fn connect(
        &self,
        identity: &Identity,
        channel: &str,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError>;
}

/// An open connection bound to one identity and channel.
#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Run a read-only transaction; nothing is committed.
    async fn evaluate(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Submit a transaction and wait for it to commit.
    async fn submit(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Release the connection. Called exactly once by the owning session.
    fn close(&mut self);
}
