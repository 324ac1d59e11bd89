// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Response bodies of the REST API. Request bodies are the core types
//! themselves ([`NewTransaction`]). All types derive `ToSchema` for the
//! OpenAPI document.
//!
//! ## Model Categories
//!
//! - **Transactions**: query-all, single query and submission responses
//! - **Health**: see `api::health`

use serde::Serialize;
use utoipa::ToSchema;

use crate::transactions::{SubmissionReport, TransactionRecord};

pub use crate::transactions::NewTransaction;

/// Message returned with the transaction list.
pub const QUERY_ALL_MESSAGE: &str = "oke rui do";

/// Confirmation returned when a whole batch was submitted.
pub const SUBMITTED_MESSAGE: &str = "Transaction has been submitted";

// =============================================================================
// Transactions
// =============================================================================

/// Freshly read transaction list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryAllResponse {
    /// HTTP status, repeated in the body.
    pub status: u16,
    pub message: String,
    /// Number of records; always `transactions.len()`.
    pub count: usize,
    pub transactions: Vec<TransactionRecord>,
}

/// A single transaction record as stored by the contract.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryResponse {
    #[schema(value_type = Object)]
    pub response: serde_json::Value,
}

/// Every record of the batch was committed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub message: String,
    /// Minted identifiers, in input order.
    pub submitted: Vec<String>,
}

/// A batch stopped at a failed submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitFailureResponse {
    pub error: String,
    pub error_code: String,
    pub report: SubmissionReport,
}
