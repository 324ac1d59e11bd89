// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction endpoints: list, query and batch submission.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::{ApiError, ErrorBody},
    models::{
        NewTransaction, QueryAllResponse, QueryResponse, SubmitFailureResponse, SubmitResponse,
        QUERY_ALL_MESSAGE, SUBMITTED_MESSAGE,
    },
    state::AppState,
};

/// Refresh the cache from the ledger and return the full list.
#[utoipa::path(
    get,
    path = "/api/queryallTransaction",
    tag = "Transactions",
    responses(
        (status = 200, description = "Current transaction list", body = QueryAllResponse),
        (status = 500, description = "Ledger unavailable", body = ErrorBody)
    )
)]
pub async fn query_all_transactions(
    State(state): State<AppState>,
) -> Result<Json<QueryAllResponse>, ApiError> {
    let cache = state.transactions.refresh().await?;

    Ok(Json(QueryAllResponse {
        status: StatusCode::OK.as_u16(),
        message: QUERY_ALL_MESSAGE.to_string(),
        count: cache.count(),
        transactions: cache.into_records(),
    }))
}

/// Read one transaction directly from the ledger.
#[utoipa::path(
    get,
    path = "/api/query/{id}",
    tag = "Transactions",
    params(("id" = String, Path, description = "Transaction key, e.g. TRANSACTION3")),
    responses(
        (status = 200, description = "Stored record", body = QueryResponse),
        (status = 400, description = "Empty id", body = ErrorBody),
        (status = 500, description = "Not found or ledger failure; see error_code", body = ErrorBody)
    )
)]
pub async fn query_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueryResponse>, ApiError> {
    let record = state.transactions.query(&id).await?;
    Ok(Json(QueryResponse {
        response: record.record,
    }))
}

/// Mint identifiers for and submit a batch of transactions, in order.
///
/// The batch stops at the first failed submission; the response then lists
/// what was submitted, the failing record and the records not attempted.
#[utoipa::path(
    post,
    path = "/api/addTransaction",
    tag = "Transactions",
    request_body = Vec<NewTransaction>,
    responses(
        (status = 200, description = "All records submitted", body = SubmitResponse),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 500, description = "Batch stopped or ledger failure", body = SubmitFailureResponse)
    )
)]
pub async fn add_transactions(
    State(state): State<AppState>,
    payload: Result<Json<Vec<NewTransaction>>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(batch) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let report = state.transactions.submit_new(batch).await?;

    match &report.failed {
        None => Ok(Json(SubmitResponse {
            message: SUBMITTED_MESSAGE.to_string(),
            submitted: report.submitted,
        })
        .into_response()),
        Some(failed) => {
            let body = SubmitFailureResponse {
                error: format!(
                    "Submission of {} failed: {}",
                    failed.transaction_id, failed.error
                ),
                error_code: failed.error_code.clone(),
                report: report.clone(),
            };
            Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response())
        }
    }
}
