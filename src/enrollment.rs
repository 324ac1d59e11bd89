// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enrollment Manager
//!
//! Makes sure the registrar identity (`admin`) and the application user
//! exist in the identity store, creating them through the CA on first run.
//!
//! ## Ordering
//!
//! 1. `ensure_admin`: enroll the bootstrap registrar.
//! 2. `ensure_app_user`: register the user with the admin identity, enroll
//!    it with the returned secret.
//!
//! The app user is never created without an admin already in the store,
//! and admin is never enrolled as a side effect of step 2. One mutex covers
//! each check-then-create sequence. An identity is stored only once the CA
//! returned its complete credentials.
//!
//! ## Startup
//!
//! Only an unreachable CA stops the process. Any other bootstrap failure is
//! logged and the server starts without identities; [`EnrollmentManager::retry_until_enrolled`]
//! then re-runs the bootstrap in the background.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::ca::{CertificateAuthority, RegistrationRequest};
use crate::error::GatewayError;
use crate::identity::{Identity, ADMIN_LABEL, APP_USER_LABEL};
use crate::storage::{AuditEvent, AuditEventType, AuditRepository, IdentityStore, StorageError};

/// Bootstrap credentials and registration parameters.
#[derive(Debug, Clone)]
pub struct EnrollmentSettings {
    pub admin_id: String,
    pub admin_secret: String,
    /// Label and enrollment id of the application user.
    pub app_user_id: String,
    pub affiliation: String,
    pub role: String,
    pub msp_id: String,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            admin_id: "admin".to_string(),
            admin_secret: "adminpw".to_string(),
            app_user_id: APP_USER_LABEL.to_string(),
            affiliation: "org1.department1".to_string(),
            role: "client".to_string(),
            msp_id: "Org1MSP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentOutcome {
    AlreadyEnrolled,
    Enrolled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct EnrollmentReport {
    pub admin: EnrollmentOutcome,
    pub app_user: EnrollmentOutcome,
}

pub struct EnrollmentManager {
    identities: Arc<IdentityStore>,
    ca: Arc<dyn CertificateAuthority>,
    settings: EnrollmentSettings,
    lock: Mutex<()>,
}

impl EnrollmentManager {
    pub fn new(
        identities: Arc<IdentityStore>,
        ca: Arc<dyn CertificateAuthority>,
        settings: EnrollmentSettings,
    ) -> Self {
        Self {
            identities,
            ca,
            settings,
            lock: Mutex::new(()),
        }
    }

    /// Enroll the registrar unless it is already stored.
    pub async fn ensure_admin(&self) -> Result<EnrollmentOutcome, GatewayError> {
        let _guard = self.lock.lock().await;
        self.ensure_admin_locked().await
    }

    /// Register and enroll the application user unless it is already stored.
    ///
    /// # Errors
    /// `Prerequisite` when no admin identity is stored.
    pub async fn ensure_app_user(&self) -> Result<EnrollmentOutcome, GatewayError> {
        let _guard = self.lock.lock().await;
        self.ensure_app_user_locked().await
    }

    /// Both steps, in order.
    pub async fn bootstrap(&self) -> Result<EnrollmentReport, GatewayError> {
        let _guard = self.lock.lock().await;
        let admin = self.ensure_admin_locked().await?;
        let app_user = self.ensure_app_user_locked().await?;
        Ok(EnrollmentReport { admin, app_user })
    }

    /// Bootstrap before the server starts accepting requests.
    ///
    /// # Returns
    /// - `Ok(Some(report))` once both identities are stored
    /// - `Ok(None)` if enrollment failed for any reason other than an
    ///   unreachable CA; the failure is logged
    /// - `Err(_)` with `Connection` or `Timeout` if the CA cannot be reached
    pub async fn bootstrap_at_startup(&self) -> Result<Option<EnrollmentReport>, GatewayError> {
        match self.bootstrap().await {
            Ok(report) => Ok(Some(report)),
            Err(e) if ca_unreachable(&e) => Err(e),
            Err(e) => {
                error!(
                    error = %e,
                    error_code = e.error_code(),
                    "Enrollment failed; starting without gateway identities"
                );
                Ok(None)
            }
        }
    }

    /// Re-run [`bootstrap`](Self::bootstrap) every `interval` until it
    /// succeeds or `shutdown` is cancelled.
    pub async fn retry_until_enrolled(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Enrollment retry starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Enrollment retry shutting down");
                    return;
                }
            }

            match self.bootstrap().await {
                Ok(report) => {
                    info!(admin = ?report.admin, app_user = ?report.app_user, "Identities ready");
                    return;
                }
                Err(e) => warn!(
                    error = %e,
                    error_code = e.error_code(),
                    "Enrollment retry failed"
                ),
            }
        }
    }

    async fn ensure_admin_locked(&self) -> Result<EnrollmentOutcome, GatewayError> {
        if self.identities.exists(ADMIN_LABEL) {
            debug!(label = ADMIN_LABEL, "Admin identity already in the wallet");
            return Ok(EnrollmentOutcome::AlreadyEnrolled);
        }

        let enrollment = match self
            .ca
            .enroll(&self.settings.admin_id, &self.settings.admin_secret)
            .await
        {
            Ok(enrollment) => enrollment,
            Err(e) => {
                self.audit(
                    AuditEvent::new(AuditEventType::AdminEnrolled)
                        .with_resource(ADMIN_LABEL)
                        .failed(e.to_string()),
                )
                .await;
                return Err(e.into());
            }
        };

        let identity = enrollment.into_identity(ADMIN_LABEL, &self.settings.msp_id);
        let outcome = self.store(&identity)?;
        if outcome == EnrollmentOutcome::Enrolled {
            self.audit(
                AuditEvent::new(AuditEventType::AdminEnrolled)
                    .with_resource(ADMIN_LABEL)
                    .with_details(serde_json::json!({ "fingerprint": identity.fingerprint() })),
            )
            .await;
        }
        Ok(outcome)
    }

    async fn ensure_app_user_locked(&self) -> Result<EnrollmentOutcome, GatewayError> {
        let label = self.settings.app_user_id.as_str();
        if self.identities.exists(label) {
            debug!(label, "Application user already in the wallet");
            return Ok(EnrollmentOutcome::AlreadyEnrolled);
        }

        let admin = match self.identities.get(ADMIN_LABEL) {
            Ok(admin) => admin,
            Err(StorageError::NotFound(_)) => {
                return Err(GatewayError::Prerequisite(format!(
                    "identity {ADMIN_LABEL} is not in the wallet; run admin enrollment first"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let request = RegistrationRequest {
            enrollment_id: label.to_string(),
            affiliation: self.settings.affiliation.clone(),
            role: self.settings.role.clone(),
        };
        let secret = match self.ca.register(&request, &admin).await {
            Ok(secret) => secret,
            Err(e) => {
                self.audit(
                    AuditEvent::new(AuditEventType::UserRegistered)
                        .with_identity(ADMIN_LABEL)
                        .with_resource(label)
                        .failed(e.to_string()),
                )
                .await;
                return Err(e.into());
            }
        };
        self.audit(
            AuditEvent::new(AuditEventType::UserRegistered)
                .with_identity(ADMIN_LABEL)
                .with_resource(label)
                .with_details(serde_json::json!({
                    "affiliation": request.affiliation,
                    "role": request.role,
                })),
        )
        .await;
        info!(label, affiliation = %request.affiliation, "Application user registered");

        let enrollment = match self.ca.enroll(label, &secret).await {
            Ok(enrollment) => enrollment,
            Err(e) => {
                self.audit(
                    AuditEvent::new(AuditEventType::UserEnrolled)
                        .with_resource(label)
                        .failed(e.to_string()),
                )
                .await;
                return Err(e.into());
            }
        };

        let identity = enrollment.into_identity(label, &self.settings.msp_id);
        let outcome = self.store(&identity)?;
        if outcome == EnrollmentOutcome::Enrolled {
            self.audit(
                AuditEvent::new(AuditEventType::UserEnrolled)
                    .with_resource(label)
                    .with_details(serde_json::json!({ "fingerprint": identity.fingerprint() })),
            )
            .await;
        }
        Ok(outcome)
    }

    /// Persist a freshly enrolled identity. Losing a race against another
    /// process keeps the identity already on disk.
    fn store(&self, identity: &Identity) -> Result<EnrollmentOutcome, GatewayError> {
        match self.identities.put(identity) {
            Ok(()) => {
                info!(
                    label = %identity.label,
                    msp_id = %identity.msp_id,
                    fingerprint = %identity.fingerprint(),
                    "Identity enrolled and stored"
                );
                Ok(EnrollmentOutcome::Enrolled)
            }
            Err(StorageError::AlreadyExists(_)) => {
                warn!(label = %identity.label, "Identity appeared concurrently; keeping stored one");
                Ok(EnrollmentOutcome::AlreadyEnrolled)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn audit(&self, event: AuditEvent) {
        AuditRepository::new(self.identities.storage())
            .record_async(event)
            .await;
    }
}

fn ca_unreachable(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Connection(_) | GatewayError::Timeout(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::DevCertificateAuthority;
    use crate::identity::PrivateKeyPem;
    use crate::storage::WalletStorage;

    struct Fixture {
        _dir: tempfile::TempDir,
        identities: Arc<IdentityStore>,
        ca: Arc<DevCertificateAuthority>,
        manager: Arc<EnrollmentManager>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let identities = Arc::new(IdentityStore::new(WalletStorage::open(dir.path()).unwrap()));
        let ca = Arc::new(DevCertificateAuthority::new("admin", "adminpw").unwrap());
        let manager = Arc::new(EnrollmentManager::new(
            Arc::clone(&identities),
            ca.clone(),
            EnrollmentSettings::default(),
        ));
        Fixture {
            _dir: dir,
            identities,
            ca,
            manager,
        }
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let f = fixture();

        assert_eq!(f.manager.ensure_admin().await.unwrap(), EnrollmentOutcome::Enrolled);
        let admin = f.identities.get("admin").unwrap();
        assert_eq!(
            f.manager.ensure_admin().await.unwrap(),
            EnrollmentOutcome::AlreadyEnrolled
        );
        assert_eq!(
            f.manager.ensure_app_user().await.unwrap(),
            EnrollmentOutcome::Enrolled
        );
        assert_eq!(
            f.manager.ensure_app_user().await.unwrap(),
            EnrollmentOutcome::AlreadyEnrolled
        );

        assert_eq!(f.identities.list_labels().unwrap(), vec!["admin", "appUser"]);
        assert_eq!(f.identities.get("admin").unwrap(), admin);
        assert_eq!(f.ca.enroll_calls(), 2);
        assert_eq!(f.ca.register_calls(), 1);
    }

    #[tokio::test]
    async fn app_user_requires_admin() {
        let f = fixture();

        let err = f.manager.ensure_app_user().await.unwrap_err();

        assert!(matches!(err, GatewayError::Prerequisite(_)));
        assert!(f.identities.list_labels().unwrap().is_empty());
        assert_eq!(f.ca.enroll_calls(), 0);
        assert_eq!(f.ca.register_calls(), 0);
    }

    #[tokio::test]
    async fn bootstrap_runs_both_steps_in_order() {
        let f = fixture();

        let report = f.manager.bootstrap().await.unwrap();
        assert_eq!(
            report,
            EnrollmentReport {
                admin: EnrollmentOutcome::Enrolled,
                app_user: EnrollmentOutcome::Enrolled,
            }
        );

        let again = f.manager.bootstrap().await.unwrap();
        assert_eq!(again.admin, EnrollmentOutcome::AlreadyEnrolled);
        assert_eq!(again.app_user, EnrollmentOutcome::AlreadyEnrolled);

        let events = AuditRepository::new(f.identities.storage()).read_today().unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                AuditEventType::AdminEnrolled,
                AuditEventType::UserRegistered,
                AuditEventType::UserEnrolled,
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_ensures_enroll_once() {
        let f = fixture();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&f.manager);
            handles.push(tokio::spawn(async move { manager.ensure_admin().await.unwrap() }));
        }
        let mut enrolled = 0;
        for handle in handles {
            if handle.await.unwrap() == EnrollmentOutcome::Enrolled {
                enrolled += 1;
            }
        }

        assert_eq!(enrolled, 1);
        assert_eq!(f.ca.enroll_calls(), 1);
    }

    #[tokio::test]
    async fn offline_ca_stores_nothing() {
        let f = fixture();
        f.ca.set_reachable(false);

        let err = f.manager.bootstrap().await.unwrap_err();

        assert!(matches!(err, GatewayError::Connection(_)));
        assert!(f.identities.list_labels().unwrap().is_empty());
    }

    #[tokio::test]
    async fn startup_fails_only_when_ca_is_unreachable() {
        let f = fixture();
        f.ca.set_reachable(false);

        let err = f.manager.bootstrap_at_startup().await.unwrap_err();

        assert!(matches!(err, GatewayError::Connection(_)));
    }

    #[tokio::test]
    async fn startup_continues_after_authorization_failure() {
        let f = fixture();
        put_foreign_admin(&f.identities);

        let report = f.manager.bootstrap_at_startup().await.unwrap();

        assert!(report.is_none());
        assert!(!f.identities.exists("appUser"));
    }

    #[tokio::test]
    async fn retry_enrolls_once_ca_is_back() {
        let f = fixture();
        f.ca.set_reachable(false);
        assert!(f.manager.bootstrap().await.is_err());

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            Arc::clone(&f.manager).retry_until_enrolled(Duration::from_millis(20), shutdown.clone()),
        );
        f.ca.set_reachable(true);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("retry stops after enrolling")
            .unwrap();
        assert_eq!(f.identities.list_labels().unwrap(), vec!["admin", "appUser"]);
    }

    #[tokio::test]
    async fn retry_stops_on_shutdown() {
        let f = fixture();
        f.ca.set_reachable(false);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            Arc::clone(&f.manager).retry_until_enrolled(Duration::from_millis(20), shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("retry stops on cancel")
            .unwrap();
        assert!(f.identities.list_labels().unwrap().is_empty());
    }

    /// An admin the CA never issued; it cannot register users.
    fn put_foreign_admin(identities: &IdentityStore) {
        let key = rcgen::KeyPair::generate().unwrap();
        identities
            .put(&Identity::new(
                "admin",
                "-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----\n",
                PrivateKeyPem::new(key.serialize_pem()),
                "Org1MSP",
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_admin_leaves_no_app_user() {
        let f = fixture();
        put_foreign_admin(&f.identities);

        let err = f.manager.ensure_app_user().await.unwrap_err();

        assert!(matches!(err, GatewayError::Authorization(_)));
        assert!(!f.identities.exists("appUser"));
    }
}
