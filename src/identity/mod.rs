// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Identities
//!
//! An [`Identity`] is an enrolled X.509 credential bundle: the certificate
//! issued by the network CA, the matching private key and the MSP the
//! identity belongs to.
//!
//! ## Security
//!
//! - The private key is wrapped in [`PrivateKeyPem`], whose `Debug` output is
//!   redacted and which has no `Serialize` impl.
//! - API responses use [`IdentitySummary`], which carries only the
//!   certificate fingerprint.
//! - Identities are immutable once created.

pub mod signing;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

pub use signing::{IdentitySigner, SigningError};

/// Label of the bootstrap registrar identity.
pub const ADMIN_LABEL: &str = "admin";

/// Default label of the application user identity.
pub const APP_USER_LABEL: &str = "appUser";

/// Credential type of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum IdentityKind {
    #[serde(rename = "X.509")]
    X509,
}

impl Default for IdentityKind {
    fn default() -> Self {
        Self::X509
    }
}

/// PEM-encoded private key. Never logged and never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyPem(String);

impl PrivateKeyPem {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(pem.into())
    }

    /// Raw PEM text, for signing and for the wallet file only.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyPem(<redacted>)")
    }
}

/// An enrolled identity as held in the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Unique store key, e.g. `admin` or `appUser`.
    pub label: String,
    /// PEM-encoded X.509 certificate.
    pub certificate: String,
    /// PEM-encoded PKCS#8 private key.
    pub private_key: PrivateKeyPem,
    /// Membership service provider the identity belongs to.
    pub msp_id: String,
    pub kind: IdentityKind,
}

impl Identity {
    pub fn new(
        label: impl Into<String>,
        certificate: impl Into<String>,
        private_key: PrivateKeyPem,
        msp_id: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            certificate: certificate.into(),
            private_key,
            msp_id: msp_id.into(),
            kind: IdentityKind::X509,
        }
    }

    /// Hex SHA-256 of the certificate DER (or of the raw text when the
    /// certificate is not valid PEM). Safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = match pem::parse(&self.certificate) {
            Ok(block) => Sha256::digest(block.contents()),
            Err(_) => Sha256::digest(self.certificate.as_bytes()),
        };
        hex::encode(digest)
    }

    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            label: self.label.clone(),
            msp_id: self.msp_id.clone(),
            kind: self.kind,
            fingerprint: self.fingerprint(),
        }
    }
}

/// Public view of an identity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct IdentitySummary {
    pub label: String,
    pub msp_id: String,
    pub kind: IdentityKind,
    /// SHA-256 fingerprint of the certificate.
    pub fingerprint: String,
}
