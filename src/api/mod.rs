// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::health::{HealthChecks, HealthResponse, ReadyResponse},
    error::ErrorBody,
    identity::{IdentityKind, IdentitySummary},
    models::{NewTransaction, QueryAllResponse, QueryResponse, SubmitFailureResponse, SubmitResponse},
    state::AppState,
    transactions::{FailedSubmission, SubmissionReport, TransactionRecord},
};

pub mod health;
pub mod transactions;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/queryallTransaction",
            get(transactions::query_all_transactions),
        )
        .route("/query/{id}", get(transactions::query_transaction))
        .route("/addTransaction", post(transactions::add_transactions))
        .route("/addTransaction/", post(transactions::add_transactions));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        transactions::query_all_transactions,
        transactions::query_transaction,
        transactions::add_transactions,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            TransactionRecord,
            NewTransaction,
            QueryAllResponse,
            QueryResponse,
            SubmitResponse,
            SubmitFailureResponse,
            SubmissionReport,
            FailedSubmission,
            ErrorBody,
            IdentitySummary,
            IdentityKind,
            ReadyResponse,
            HealthChecks,
            HealthResponse
        )
    ),
    tags(
        (name = "Transactions", description = "Ledger transaction queries and submission"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
