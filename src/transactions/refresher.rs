// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cache Refresher
//!
//! Background task that re-reads the transaction list every
//! `refresh_interval`, so `/health/ready` and cached views stay current
//! without a client calling the query-all endpoint.
//!
//! ## Shutdown
//!
//! Stops when its `CancellationToken` is cancelled, like the other
//! background tasks of the server.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TransactionService;

pub struct CacheRefresher {
    service: Arc<TransactionService>,
    refresh_interval: Duration,
}

impl CacheRefresher {
    pub fn new(service: Arc<TransactionService>, refresh_interval: Duration) -> Self {
        Self {
            service,
            refresh_interval,
        }
    }

    /// Run until `shutdown` is cancelled. The first refresh happens one
    /// interval after start.
    ///
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.refresh_interval.as_secs(),
            "Transaction cache refresher starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Transaction cache refresher shutting down");
                    return;
                }
            }

            self.refresh_step().await;
        }
    }

    async fn refresh_step(&self) {
        match self.service.refresh().await {
            Ok(cache) => debug!(count = cache.count(), "Periodic cache refresh done"),
            Err(e) => warn!(
                error = %e,
                error_code = e.error_code(),
                "Periodic cache refresh failed"
            ),
        }
    }
}
