// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction Cache & Counter
//!
//! [`TransactionService`] owns the cached transaction list and the counter
//! used to mint `TRANSACTION<n>` identifiers.
//!
//! ## Identifier minting
//!
//! - The counter baseline after a refresh is
//!   `max(records.len(), highest numeric suffix + 1)` and is only ever
//!   raised (`fetch_max`), never lowered.
//! - Submit batches run one at a time under `submit_lock`. Each batch
//!   re-reads the ledger first, then mints and submits sequentially.
//! - The transaction list is a key range scan and does not show every key,
//!   so each minted identifier is looked up with `QueryTransaction` before
//!   it is submitted. Identifiers already on the ledger are skipped.
//! - A minted identifier is consumed even when its submission fails: the
//!   transaction may have been committed anyway, so the id is never reused.
//! - A batch stops at the first failed submission.

pub mod refresher;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::GatewayError;
use crate::ledger::{transactions, Contract, LedgerGateway, LedgerSession};
use crate::storage::{AuditEvent, AuditEventType, AuditRepository, WalletStorage};

pub use refresher::CacheRefresher;

/// Prefix of minted transaction identifiers.
pub const ID_PREFIX: &str = "TRANSACTION";

/// One entry of the ledger's transaction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Record")]
    #[schema(value_type = Object)]
    pub record: serde_json::Value,
}

/// A transaction to be created on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewTransaction {
    pub id_bill: String,
    pub id_product: String,
    /// Accepted as a JSON string or number; stored as text.
    #[serde(deserialize_with = "quantity_text")]
    #[schema(value_type = String, example = "2")]
    pub quantity: String,
}

fn quantity_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Quantity::deserialize(deserializer)? {
        Quantity::Text(text) => text,
        Quantity::Number(number) => number.to_string(),
    })
}

/// Last fetched transaction list.
#[derive(Debug, Clone, Default)]
pub struct TransactionCache {
    records: Vec<TransactionRecord>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl TransactionCache {
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }

    /// Always `records().len()`.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// `None` until the first successful refresh.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// The record whose submission stopped a batch.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FailedSubmission {
    pub transaction_id: String,
    pub record: NewTransaction,
    pub error_code: String,
    pub error: String,
}

/// Outcome of [`TransactionService::submit_new`].
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SubmissionReport {
    /// Identifiers committed, in submission order.
    pub submitted: Vec<String>,
    pub failed: Option<FailedSubmission>,
    /// Records after the failure, never sent.
    pub not_attempted: Vec<NewTransaction>,
}

impl SubmissionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

pub struct TransactionService {
    gateway: LedgerGateway,
    storage: WalletStorage,
    cache: RwLock<TransactionCache>,
    counter: AtomicU64,
    submit_lock: Mutex<()>,
}

impl TransactionService {
    pub fn new(gateway: LedgerGateway, storage: WalletStorage) -> Self {
        Self {
            gateway,
            storage,
            cache: RwLock::new(TransactionCache::default()),
            counter: AtomicU64::new(0),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    /// Cached view, without a ledger round trip.
    pub async fn snapshot(&self) -> TransactionCache {
        self.cache.read().await.clone()
    }

    /// Next counter value to be minted.
    pub fn next_counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Re-read the full transaction list and replace the cache.
    pub async fn refresh(&self) -> Result<TransactionCache, GatewayError> {
        let session = self.gateway.open_session().await?;
        let result = self.fetch_all(&session).await;
        session.close();

        let cache = self.install(result?).await;
        info!(count = cache.count(), "Transaction cache refreshed");
        Ok(cache)
    }

    /// Fetch one transaction from the ledger. Never served from the cache.
    pub async fn query(&self, id: &str) -> Result<TransactionRecord, GatewayError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(GatewayError::InvalidInput(
                "transaction id must not be empty".to_string(),
            ));
        }

        let session = self.gateway.open_session().await?;
        let result = session
            .contract(self.gateway.contract_name())
            .evaluate(transactions::QUERY_TRANSACTION, &[id.to_string()])
            .await;
        session.close();

        let payload = match result {
            Ok(payload) => payload,
            Err(GatewayError::Evaluation(message)) if message.contains("does not exist") => {
                return Err(GatewayError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e),
        };
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(GatewayError::NotFound(id.to_string()));
        }

        let record = serde_json::from_slice(&payload)
            .map_err(|e| GatewayError::Evaluation(format!("malformed record for {id}: {e}")))?;
        Ok(TransactionRecord {
            key: id.to_string(),
            record,
        })
    }

    /// Mint an identifier for each record and submit them in order.
    ///
    /// # Returns
    /// - `Ok(report)` once the batch ran; `report.failed` names the record
    ///   that stopped it, if any
    /// - `Err(_)` if the session could not be opened or the ledger could not
    ///   be re-read (nothing was minted)
    pub async fn submit_new(
        &self,
        batch: Vec<NewTransaction>,
    ) -> Result<SubmissionReport, GatewayError> {
        if batch.is_empty() {
            return Ok(SubmissionReport::default());
        }

        let _batch = self.submit_lock.lock().await;

        let session = self.gateway.open_session().await?;
        let result = self.run_batch(&session, batch).await;
        session.close();
        result
    }

    async fn run_batch(
        &self,
        session: &LedgerSession,
        batch: Vec<NewTransaction>,
    ) -> Result<SubmissionReport, GatewayError> {
        let records = self.fetch_all(session).await?;
        self.install(records).await;

        let contract = session.contract(self.gateway.contract_name());
        let audit = AuditRepository::new(&self.storage);
        let mut report = SubmissionReport::default();
        let mut pending = batch.into_iter();

        while let Some(record) = pending.next() {
            let details = json!({
                "id_bill": record.id_bill,
                "id_product": record.id_product,
                "quantity": record.quantity,
            });

            let (transaction_id, outcome) = match self.mint_unused(&contract).await {
                Ok(transaction_id) => {
                    let args = [
                        transaction_id.clone(),
                        record.id_bill.clone(),
                        record.id_product.clone(),
                        record.quantity.clone(),
                    ];
                    let outcome = contract.submit(transactions::CREATE_TRANSACTION, &args).await;
                    (transaction_id, outcome)
                }
                Err((transaction_id, e)) => (transaction_id, Err(e)),
            };

            match outcome {
                Ok(_) => {
                    info!(transaction_id = %transaction_id, "Transaction submitted");
                    audit
                        .record_async(
                            AuditEvent::new(AuditEventType::TransactionSubmitted)
                                .with_identity(session.identity_label())
                                .with_resource(&transaction_id)
                                .with_details(details),
                        )
                        .await;
                    report.submitted.push(transaction_id);
                }
                Err(e) => {
                    warn!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Transaction submission failed; stopping batch"
                    );
                    audit
                        .record_async(
                            AuditEvent::new(AuditEventType::TransactionFailed)
                                .with_identity(session.identity_label())
                                .with_resource(&transaction_id)
                                .with_details(details)
                                .failed(e.to_string()),
                        )
                        .await;
                    report.failed = Some(FailedSubmission {
                        transaction_id,
                        record,
                        error_code: e.error_code().to_string(),
                        error: e.to_string(),
                    });
                    report.not_attempted = pending.by_ref().collect();
                    break;
                }
            }
        }

        Ok(report)
    }

    async fn fetch_all(&self, session: &LedgerSession) -> Result<Vec<TransactionRecord>, GatewayError> {
        let payload = session
            .contract(self.gateway.contract_name())
            .evaluate(transactions::QUERY_ALL_TRANSACTIONS, &[])
            .await?;
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&payload)
            .map_err(|e| GatewayError::Evaluation(format!("malformed transaction list: {e}")))
    }

    /// Replace the cache and raise the counter baseline.
    async fn install(&self, records: Vec<TransactionRecord>) -> TransactionCache {
        self.counter.fetch_max(baseline(&records), Ordering::SeqCst);

        let mut cache = self.cache.write().await;
        *cache = TransactionCache {
            records,
            refreshed_at: Some(Utc::now()),
        };
        cache.clone()
    }

    fn mint(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{ID_PREFIX}{n}")
    }

    /// Mint identifiers until one is absent from the ledger.
    ///
    /// A failed lookup consumes the identifier it was checking and is
    /// returned with it.
    async fn mint_unused(&self, contract: &Contract<'_>) -> Result<String, (String, GatewayError)> {
        loop {
            let transaction_id = self.mint();
            let lookup = contract
                .evaluate(transactions::QUERY_TRANSACTION, &[transaction_id.clone()])
                .await;

            match lookup {
                Err(GatewayError::Evaluation(message)) if message.contains("does not exist") => {
                    return Ok(transaction_id);
                }
                Ok(payload) if payload.iter().all(u8::is_ascii_whitespace) => {
                    return Ok(transaction_id);
                }
                Ok(_) => warn!(
                    transaction_id = %transaction_id,
                    "Identifier already on the ledger; skipping"
                ),
                Err(e) => return Err((transaction_id, e)),
            }
        }
    }
}

/// Lowest counter value that cannot collide with `records`.
fn baseline(records: &[TransactionRecord]) -> u64 {
    let count = u64::try_from(records.len()).unwrap_or(u64::MAX);
    records
        .iter()
        .filter_map(|record| id_number(&record.key))
        .map(|n| n.saturating_add(1))
        .fold(count, u64::max)
}

fn id_number(key: &str) -> Option<u64> {
    let digits = key.strip_prefix(ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
