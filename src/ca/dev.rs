// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process certificate authority.
//!
//! Issues real P-256 certificates signed by an ephemeral root, keeps the
//! user registry in memory and treats certificates it issued to the
//! bootstrap registrar as the only ones allowed to register new users.
//! Used by the `memory` ledger backend and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use tracing::debug;

use super::{CaError, CertificateAuthority, Enrollment, RegistrationRequest};
use crate::identity::{Identity, IdentitySigner, PrivateKeyPem};

#[derive(Debug, Clone)]
struct RegisteredUser {
    secret: String,
    registrar: bool,
}

#[derive(Debug, Default)]
struct Registry {
    users: HashMap<String, RegisteredUser>,
    /// Certificates issued to registrar identities.
    registrar_certs: HashSet<String>,
}

pub struct DevCertificateAuthority {
    root_key: KeyPair,
    root: Certificate,
    registry: Mutex<Registry>,
    reachable: AtomicBool,
    enroll_calls: AtomicUsize,
    register_calls: AtomicUsize,
}

impl std::fmt::Debug for DevCertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevCertificateAuthority")
            .field("reachable", &self.reachable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DevCertificateAuthority {
    /// Create a CA whose bootstrap registrar is `admin_id`/`admin_secret`.
    pub fn new(admin_id: &str, admin_secret: &str) -> Result<Self, CaError> {
        let root_key = KeyPair::generate().map_err(issue_error)?;
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(issue_error)?;
        params
            .distinguished_name
            .push(DnType::CommonName, "dev-ca.ledger-gateway.local");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let root = params.self_signed(&root_key).map_err(issue_error)?;

        let mut registry = Registry::default();
        registry.users.insert(
            admin_id.to_string(),
            RegisteredUser {
                secret: admin_secret.to_string(),
                registrar: true,
            },
        );

        Ok(Self {
            root_key,
            root,
            registry: Mutex::new(registry),
            reachable: AtomicBool::new(true),
            enroll_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
        })
    }

    /// Simulate the CA being down.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn enroll_calls(&self) -> usize {
        self.enroll_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), CaError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CaError::Connection("development CA is offline".to_string()))
        }
    }

    fn issue(&self, enrollment_id: &str) -> Result<Enrollment, CaError> {
        let key_pair = KeyPair::generate().map_err(issue_error)?;
        let mut params = CertificateParams::new(Vec::<String>::new()).map_err(issue_error)?;
        params.distinguished_name.push(DnType::CommonName, enrollment_id);
        let certificate = params
            .signed_by(&key_pair, &self.root, &self.root_key)
            .map_err(issue_error)?;

        Ok(Enrollment {
            certificate: certificate.pem(),
            private_key: PrivateKeyPem::new(key_pair.serialize_pem()),
        })
    }

    fn registry(&self) -> Result<std::sync::MutexGuard<'_, Registry>, CaError> {
        self.registry
            .lock()
            .map_err(|_| CaError::InvalidResponse("registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl CertificateAuthority for DevCertificateAuthority {
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let user = self
            .registry()?
            .users
            .get(enrollment_id)
            .cloned()
            .filter(|user| user.secret == secret)
            .ok_or_else(|| {
                CaError::Enrollment(format!("authentication failure for {enrollment_id}"))
            })?;

        let enrollment = self.issue(enrollment_id)?;
        if user.registrar {
            self.registry()?
                .registrar_certs
                .insert(enrollment.certificate.clone());
        }

        debug!(enrollment_id, "Development CA issued certificate");
        Ok(enrollment)
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        acting: &Identity,
    ) -> Result<String, CaError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        IdentitySigner::from_identity(acting).map_err(|e| {
            CaError::Authorization(format!("identity {} cannot sign: {e}", acting.label))
        })?;

        let mut registry = self.registry()?;
        if !registry.registrar_certs.contains(&acting.certificate) {
            return Err(CaError::Authorization(format!(
                "identity {} is not a registrar",
                acting.label
            )));
        }
        if registry.users.contains_key(&request.enrollment_id) {
            return Err(CaError::Registration(format!(
                "identity {} is already registered",
                request.enrollment_id
            )));
        }

        let secret = uuid::Uuid::new_v4().simple().to_string();
        registry.users.insert(
            request.enrollment_id.clone(),
            RegisteredUser {
                secret: secret.clone(),
                registrar: false,
            },
        );

        debug!(
            enrollment_id = %request.enrollment_id,
            role = %request.role,
            affiliation = %request.affiliation,
            "Development CA registered identity"
        );
        Ok(secret)
    }
}

fn issue_error(e: rcgen::Error) -> CaError {
    CaError::Enrollment(format!("certificate issuance failed: {e}"))
}
