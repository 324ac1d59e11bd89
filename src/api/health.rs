// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::identity::{IdentitySummary, ADMIN_LABEL};
use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Wallet directory read/write probe.
    pub wallet: String,
    /// Both gateway identities are enrolled.
    pub identities: String,
    /// Transaction cache populated by at least one refresh.
    pub cache: String,
    /// Enrolled identities, by certificate fingerprint.
    pub enrolled: Vec<IdentitySummary>,
    /// Cached transaction count.
    pub transaction_count: usize,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn check(ok: bool, failure: &str) -> String {
    if ok { "ok" } else { failure }.to_string()
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let wallet_ok = state.identities.storage().health_check().is_ok();

    let app_user = &state.transactions.gateway().settings().identity_label;
    let enrolled: Vec<IdentitySummary> = [ADMIN_LABEL, app_user.as_str()]
        .into_iter()
        .filter_map(|label| state.identities.get(label).ok())
        .map(|identity| identity.summary())
        .collect();
    let identities_ok = enrolled.len() == 2;

    let cache = state.transactions.snapshot().await;
    let cache_ok = cache.refreshed_at().is_some();

    let all_ok = wallet_ok && identities_ok && cache_ok;
    let response = ReadyResponse {
        status: check(all_ok, "degraded"),
        checks: HealthChecks {
            service: "ok".to_string(),
            wallet: check(wallet_ok, "unavailable"),
            identities: check(identities_ok, "missing"),
            cache: check(cache_ok, "empty"),
            enrolled,
            transaction_count: cache.count(),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler: identities enrolled and cache populated.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::state::testing::TestContext;

    #[tokio::test]
    async fn not_ready_before_first_refresh() {
        let ctx = TestContext::enrolled(InMemoryLedger::seeded("mychannel", "fabcar").await).await;

        let (status, Json(body)) = readiness(State(ctx.state.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.checks.identities, "ok");
        assert_eq!(body.checks.cache, "empty");
    }

    #[tokio::test]
    async fn ready_after_refresh() {
        let ctx = TestContext::enrolled(InMemoryLedger::seeded("mychannel", "fabcar").await).await;
        ctx.state.transactions.refresh().await.unwrap();

        let (status, Json(body)) = health(State(ctx.state.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.transaction_count, 4);
        assert_eq!(body.checks.enrolled.len(), 2);
        assert_eq!(body.checks.enrolled[0].label, "admin");
    }

    #[tokio::test]
    async fn missing_identities_are_reported() {
        let ctx = TestContext::empty(InMemoryLedger::new("mychannel", "fabcar"));

        let (status, Json(body)) = health(State(ctx.state.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.checks.identities, "missing");
        assert!(body.checks.enrolled.is_empty());
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness().await.0.status, "ok");
    }
}
