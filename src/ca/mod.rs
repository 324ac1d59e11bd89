// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Certificate authority integration.
//!
//! This module provides:
//! - The [`CertificateAuthority`] capability used by the enrollment manager
//! - [`FabricCaClient`], a client for the Fabric CA REST API
//! - [`DevCertificateAuthority`], an in-process CA for local runs and tests

pub mod dev;
pub mod fabric;

use std::time::Duration;

use async_trait::async_trait;

use crate::identity::{Identity, PrivateKeyPem};

pub use dev::DevCertificateAuthority;
pub use fabric::{CaSettings, FabricCaClient};

/// Credentials returned by a successful enrollment.
#[derive(Debug, Clone)]
pub struct Enrollment {
    /// PEM certificate signed by the CA.
    pub certificate: String,
    /// PEM PKCS#8 key generated for the enrollment.
    pub private_key: PrivateKeyPem,
}

impl Enrollment {
    /// Bind the credentials to a store label and MSP.
    pub fn into_identity(self, label: impl Into<String>, msp_id: impl Into<String>) -> Identity {
        Identity::new(label, self.certificate, self.private_key, msp_id)
    }
}

/// New identity to create under the acting registrar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub enrollment_id: String,
    pub affiliation: String,
    /// Identity type, e.g. `client`.
    pub role: String,
}

/// Errors that can occur during CA operations.
#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("Enrollment failed: {0}")]
    Enrollment(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Not authorized to register identities: {0}")]
    Authorization(String),

    #[error("CA unreachable: {0}")]
    Connection(String),

    #[error("CA call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid CA response: {0}")]
    InvalidResponse(String),
}

/// Enrollment and registration against a certificate authority.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Prove the right to `enrollment_id` with its secret and obtain a
    /// certificate for a freshly generated key.
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError>;

    /// Create a new identity, authenticated as `acting`. Returns the
    /// enrollment secret of the new identity.
    ///
    /// Fails with [`CaError::Authorization`] when `acting` may not register.
    async fn register(
        &self,
        request: &RegistrationRequest,
        acting: &Identity,
    ) -> Result<String, CaError>;
}
