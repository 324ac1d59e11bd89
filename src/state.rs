// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::storage::IdentityStore;
use crate::transactions::TransactionService;

#[derive(Clone)]
pub struct AppState {
    pub identities: Arc<IdentityStore>,
    pub transactions: Arc<TransactionService>,
}

impl AppState {
    pub fn new(identities: Arc<IdentityStore>, transactions: Arc<TransactionService>) -> Self {
        Self {
            identities,
            transactions,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use super::*;
    use crate::ca::DevCertificateAuthority;
    use crate::enrollment::{EnrollmentManager, EnrollmentSettings};
    use crate::ledger::{InMemoryLedger, LedgerGateway, SessionSettings};
    use crate::storage::WalletStorage;

    /// Application state over a temporary wallet, the development CA and
    /// an in-memory ledger.
    pub(crate) struct TestContext {
        pub _dir: tempfile::TempDir,
        pub state: AppState,
        pub enrollment: Arc<EnrollmentManager>,
        pub ledger: InMemoryLedger,
        pub ca: Arc<DevCertificateAuthority>,
    }

    impl TestContext {
        pub async fn enrolled(ledger: InMemoryLedger) -> Self {
            let context = Self::empty(ledger);
            context
                .enrollment
                .bootstrap()
                .await
                .expect("bootstrap enrollment");
            context
        }

        pub fn empty(ledger: InMemoryLedger) -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let storage = WalletStorage::open(dir.path()).expect("wallet");
            let identities = Arc::new(IdentityStore::new(storage.clone()));
            let ca = Arc::new(DevCertificateAuthority::new("admin", "adminpw").expect("dev CA"));
            let settings = EnrollmentSettings::default();

            let enrollment = Arc::new(EnrollmentManager::new(
                Arc::clone(&identities),
                ca.clone(),
                settings.clone(),
            ));
            let gateway = LedgerGateway::new(
                Arc::clone(&identities),
                Arc::new(ledger.clone()),
                SessionSettings {
                    identity_label: settings.app_user_id,
                    channel: "mychannel".to_string(),
                    contract: "fabcar".to_string(),
                    timeout: Duration::from_secs(2),
                },
            );
            let transactions = Arc::new(TransactionService::new(gateway, storage));

            Self {
                _dir: dir,
                state: AppState::new(identities, transactions),
                enrollment,
                ledger,
                ca,
            }
        }
    }
}
