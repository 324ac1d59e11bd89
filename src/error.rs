// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::ca::CaError;
use crate::ledger::LedgerError;
use crate::storage::StorageError;

/// Errors surfaced by the gateway core.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Prerequisite missing: {0}")]
    Prerequisite(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Identity {0} is not enrolled")]
    IdentityMissing(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Enrollment failed: {0}")]
    Enrollment(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    /// Stable machine-readable code, returned as `error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage",
            Self::Authorization(_) => "authorization",
            Self::Prerequisite(_) => "prerequisite",
            Self::Connection(_) => "connection",
            Self::IdentityMissing(_) => "identity_missing",
            Self::Evaluation(_) => "evaluation",
            Self::Submission(_) => "submission",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Enrollment(_) => "enrollment",
            Self::Registration(_) => "registration",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}

impl From<CaError> for GatewayError {
    fn from(err: CaError) -> Self {
        match err {
            CaError::Enrollment(message) => Self::Enrollment(message),
            CaError::Registration(message) => Self::Registration(message),
            CaError::Authorization(message) => Self::Authorization(message),
            CaError::Connection(message) => Self::Connection(message),
            CaError::Timeout(after) => Self::Timeout(after),
            CaError::InvalidResponse(message) => {
                Self::Connection(format!("invalid CA response: {message}"))
            }
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Connection(message) => Self::Connection(message),
            LedgerError::Evaluation(message) => Self::Evaluation(message),
            LedgerError::Submission(message) => Self::Submission(message),
            LedgerError::Timeout(after) => Self::Timeout(after),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

/// Error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match err {
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.error_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}
