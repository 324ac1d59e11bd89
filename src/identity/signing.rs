// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECDSA P-256 signing with a stored identity key.
//!
//! Fabric components reject signatures whose `s` value lies in the upper
//! half of the curve order, so every signature produced here is normalized
//! to low-S form before it leaves this module.

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;

use super::Identity;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed")]
    SigningFailed,
}

/// Signer bound to one identity's private key.
pub struct IdentitySigner {
    key: SigningKey,
    public_key: Vec<u8>,
}

impl IdentitySigner {
    /// Load the PKCS#8 key of `identity`.
    pub fn from_identity(identity: &Identity) -> Result<Self, SigningError> {
        Self::from_pkcs8_pem(identity.private_key.expose())
    }

    pub fn from_pkcs8_pem(pem_text: &str) -> Result<Self, SigningError> {
        let key = SigningKey::from_pkcs8_pem(pem_text)
            .map_err(|e| SigningError::InvalidKey(format!("expected a PKCS#8 P-256 key: {e}")))?;
        let public_key = key.verifying_key().to_encoded_point(false).as_bytes().to_vec();

        Ok(Self { key, public_key })
    }

    /// DER-encoded, low-S ECDSA-SHA256 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        let signature: Signature = self
            .key
            .try_sign(message)
            .map_err(|_| SigningError::SigningFailed)?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_der().as_bytes().to_vec())
    }

    /// Uncompressed SEC1 public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}
