// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger running the transaction contract.
//!
//! World state is a sorted key/value map, so `QueryAllTransactions` has the
//! same lexicographic range semantics as the peer's state database.
//! Connection open/close counts and failure switches are exposed for tests.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::{transactions, LedgerConnection, LedgerConnector, LedgerError};
use crate::identity::Identity;

const RANGE_START: &str = "TRANSACTION0";
const RANGE_END: &str = "TRANSACTION999";

/// Records written by `InitLedger`.
const SEED: [(&str, &str, &str); 4] = [
    ("62c27c668772d1ba23884fa1", "62a60b1f717c6989b0165e55", "2"),
    ("62c27c668772d1ba23884fa1", "62a60b42717c6989b0165e58", "2"),
    ("62c2a2cf9b6915dea0039b5b", "62a61170717c6989b0165e73", "3"),
    ("62c2a3ae9b6915dea0039b5d", "62a611e4717c6989b0165e7a", "3"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTransaction {
    id_bill: String,
    id_product: String,
    quantity: String,
}

#[derive(Serialize)]
struct QueryResult<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "Record")]
    record: StoredTransaction,
}

type WorldState = BTreeMap<String, Vec<u8>>;

#[derive(Debug)]
struct LedgerState {
    channel: String,
    contract: String,
    world: RwLock<WorldState>,
    reachable: AtomicBool,
    latency_ms: AtomicU64,
    rejected_bill: Mutex<Option<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    submissions: AtomicUsize,
}

/// Ledger network with one channel hosting one contract.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<LedgerState>,
}

impl InMemoryLedger {
    /// Empty ledger serving `contract` on `channel`.
    pub fn new(channel: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            state: Arc::new(LedgerState {
                channel: channel.into(),
                contract: contract.into(),
                world: RwLock::new(WorldState::new()),
                reachable: AtomicBool::new(true),
                latency_ms: AtomicU64::new(0),
                rejected_bill: Mutex::new(None),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                submissions: AtomicUsize::new(0),
            }),
        }
    }

    /// Ledger after `InitLedger`.
    pub async fn seeded(channel: impl Into<String>, contract: impl Into<String>) -> Self {
        let ledger = Self::new(channel, contract);
        {
            let mut world = ledger.state.world.write().await;
            init_ledger(&mut world);
        }
        ledger
    }

    /// Ledger holding `TRANSACTION0..TRANSACTION{count-1}`.
    pub async fn with_records(
        channel: impl Into<String>,
        contract: impl Into<String>,
        count: usize,
    ) -> Self {
        let ledger = Self::new(channel, contract);
        {
            let mut world = ledger.state.world.write().await;
            for n in 0..count {
                let (bill, product, quantity) = SEED[n % SEED.len()];
                put(&mut world, &format!("TRANSACTION{n}"), bill, product, quantity);
            }
        }
        ledger
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay applied to every connect and contract call.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.state.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Make endorsement fail for submissions with this bill id.
    pub fn reject_bill(&self, id_bill: impl Into<String>) {
        if let Ok(mut rejected) = self.state.rejected_bill.lock() {
            *rejected = Some(id_bill.into());
        }
    }

    pub fn opened_connections(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn live_connections(&self) -> usize {
        self.opened_connections() - self.closed_connections()
    }

    /// Number of committed submissions.
    pub fn submissions(&self) -> usize {
        self.state.submissions.load(Ordering::SeqCst)
    }

    /// Keys currently in world state.
    pub async fn keys(&self) -> Vec<String> {
        self.state.world.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl LedgerConnector for InMemoryLedger {
    async fn connect(
        &self,
        identity: &Identity,
        channel: &str,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError> {
        self.state.delay().await;

        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(LedgerError::Connection("no peers reachable".to_string()));
        }
        if channel != self.state.channel {
            return Err(LedgerError::Connection(format!("channel {channel} not found")));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        debug!(label = %identity.label, channel, "In-memory ledger connection opened");

        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<LedgerState>,
    closed: bool,
}

#[async_trait]
impl LedgerConnection for MemoryConnection {
    async fn evaluate(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.state.delay().await;
        self.state
            .check_contract(contract)
            .map_err(LedgerError::Evaluation)?;

        // Simulated against a copy; evaluation never commits.
        let mut world = self.state.world.read().await.clone();
        execute(&mut world, transaction, args).map_err(LedgerError::Evaluation)
    }

    async fn submit(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.state.delay().await;
        self.state
            .check_contract(contract)
            .map_err(LedgerError::Submission)?;

        if let Some(bill) = args.get(1) {
            let rejected = self
                .state
                .rejected_bill
                .lock()
                .map(|rejected| rejected.as_deref() == Some(bill.as_str()))
                .unwrap_or(false);
            if rejected {
                return Err(LedgerError::Submission(format!(
                    "endorsement policy failure for bill {bill}"
                )));
            }
        }

        let mut world = self.state.world.write().await;
        let payload = execute(&mut world, transaction, args).map_err(LedgerError::Submission)?;
        self.state.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(payload)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl LedgerState {
    async fn delay(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn check_contract(&self, contract: &str) -> Result<(), String> {
        if contract == self.contract {
            Ok(())
        } else {
            Err(format!(
                "contract {contract} is not deployed on channel {}",
                self.channel
            ))
        }
    }
}

fn execute(world: &mut WorldState, transaction: &str, args: &[String]) -> Result<Vec<u8>, String> {
    match transaction {
        transactions::INIT_LEDGER => {
            init_ledger(world);
            Ok(Vec::new())
        }
        transactions::CREATE_TRANSACTION => match args {
            [key, bill, product, quantity] => {
                put(world, key, bill, product, quantity);
                Ok(Vec::new())
            }
            _ => Err(format!(
                "Incorrect number of arguments. Expecting 4, got {}",
                args.len()
            )),
        },
        transactions::QUERY_TRANSACTION => match args {
            [key] => world
                .get(key)
                .cloned()
                .ok_or_else(|| format!("{key} does not exist")),
            _ => Err(format!(
                "Incorrect number of arguments. Expecting 1, got {}",
                args.len()
            )),
        },
        transactions::QUERY_ALL_TRANSACTIONS => {
            let results: Vec<QueryResult<'_>> = world
                .range::<str, _>((Bound::Included(RANGE_START), Bound::Excluded(RANGE_END)))
                .filter_map(|(key, value)| {
                    serde_json::from_slice(value)
                        .ok()
                        .map(|record| QueryResult { key, record })
                })
                .collect();
            serde_json::to_vec(&results).map_err(|e| e.to_string())
        }
        other => Err(format!("unknown transaction {other}")),
    }
}

fn init_ledger(world: &mut WorldState) {
    for (n, (bill, product, quantity)) in SEED.iter().enumerate() {
        put(world, &format!("TRANSACTION{n}"), bill, product, quantity);
    }
}

fn put(world: &mut WorldState, key: &str, bill: &str, product: &str, quantity: &str) {
    let record = StoredTransaction {
        id_bill: bill.to_string(),
        id_product: product.to_string(),
        quantity: quantity.to_string(),
    };
    if let Ok(bytes) = serde_json::to_vec(&record) {
        world.insert(key.to_string(), bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PrivateKeyPem;
    use serde_json::Value;

    fn identity() -> Identity {
        Identity::new("appUser", "cert", PrivateKeyPem::new("key"), "Org1MSP")
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn seeded_ledger_lists_init_records() {
        let ledger = InMemoryLedger::seeded("mychannel", "fabcar").await;
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();

        let payload = connection
            .evaluate("fabcar", transactions::QUERY_ALL_TRANSACTIONS, &[])
            .await
            .unwrap();
        let records: Vec<Value> = serde_json::from_slice(&payload).unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["Key"], "TRANSACTION0");
        assert_eq!(records[0]["Record"]["id_bill"], "62c27c668772d1ba23884fa1");
        assert_eq!(records[3]["Record"]["quantity"], "3");
    }

    #[tokio::test]
    async fn create_then_query() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();

        connection
            .submit(
                "fabcar",
                transactions::CREATE_TRANSACTION,
                &args(&["TRANSACTION0", "B1", "P1", "5"]),
            )
            .await
            .unwrap();
        let payload = connection
            .evaluate("fabcar", transactions::QUERY_TRANSACTION, &args(&["TRANSACTION0"]))
            .await
            .unwrap();

        let record: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(record["id_product"], "P1");
        assert_eq!(ledger.submissions(), 1);
    }

    #[tokio::test]
    async fn evaluate_does_not_commit_writes() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();

        connection
            .evaluate("fabcar", transactions::INIT_LEDGER, &[])
            .await
            .unwrap();

        assert!(ledger.keys().await.is_empty());
    }

    #[tokio::test]
    async fn missing_key_does_not_exist() {
        let ledger = InMemoryLedger::seeded("mychannel", "fabcar").await;
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();

        let err = connection
            .evaluate("fabcar", transactions::QUERY_TRANSACTION, &args(&["CAR4"]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Evaluation(message) if message == "CAR4 does not exist"));
    }

    #[tokio::test]
    async fn query_all_uses_lexicographic_range() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();
        for key in ["TRANSACTION1000", "TRANSACTION999", "OTHER1"] {
            connection
                .submit("fabcar", transactions::CREATE_TRANSACTION, &args(&[key, "B", "P", "1"]))
                .await
                .unwrap();
        }

        let payload = connection
            .evaluate("fabcar", transactions::QUERY_ALL_TRANSACTIONS, &[])
            .await
            .unwrap();
        let records: Vec<Value> = serde_json::from_slice(&payload).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Key"], "TRANSACTION1000");
    }

    #[tokio::test]
    async fn rejected_bill_fails_submission() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        ledger.reject_bill("BAD");
        let connection = ledger.connect(&identity(), "mychannel").await.unwrap();

        let err = connection
            .submit(
                "fabcar",
                transactions::CREATE_TRANSACTION,
                &args(&["TRANSACTION0", "BAD", "P", "1"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Submission(_)));
        assert!(ledger.keys().await.is_empty());
    }

    #[tokio::test]
    async fn wrong_channel_is_connection_error() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        let err = ledger.connect(&identity(), "otherchannel").await.err().unwrap();
        assert!(matches!(err, LedgerError::Connection(_)));
        assert_eq!(ledger.opened_connections(), 0);
    }

    #[tokio::test]
    async fn close_counts_once() {
        let ledger = InMemoryLedger::new("mychannel", "fabcar");
        let mut connection = ledger.connect(&identity(), "mychannel").await.unwrap();
        connection.close();
        connection.close();
        assert_eq!(ledger.closed_connections(), 1);
    }
}
