// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger gateway REST connector.
//!
//! ## Wire format
//!
//! ```text
//! POST {base}/channels/{channel}/contracts/{contract}/evaluate
//! POST {base}/channels/{channel}/contracts/{contract}/submit
//!   X-Msp-Id: Org1MSP
//!   X-Identity-Certificate: base64(certificate PEM)
//!   X-Signature: base64(DER ECDSA-SHA256 over the request body)
//!   {"transaction": "...", "arguments": ["..."]}
//! ```
//!
//! Channel and contract names are percent-encoded as single path segments.
//! A 2xx response body is the raw transaction payload. Errors carry
//! `{"error": "..."}` or plain text.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{LedgerConnection, LedgerConnector, LedgerError};
use crate::identity::{Identity, IdentitySigner};

pub const MSP_ID_HEADER: &str = "x-msp-id";
pub const CERTIFICATE_HEADER: &str = "x-identity-certificate";
pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Serialize)]
struct InvocationBody<'a> {
    transaction: &'a str,
    arguments: &'a [String],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Evaluate,
    Submit,
}

impl Mode {
    fn path(self) -> &'static str {
        match self {
            Self::Evaluate => "evaluate",
            Self::Submit => "submit",
        }
    }

    fn error(self, message: String) -> LedgerError {
        match self {
            Self::Evaluate => LedgerError::Evaluation(message),
            Self::Submit => LedgerError::Submission(message),
        }
    }
}

/// Connects through a ledger gateway at `base_url`.
#[derive(Debug, Clone)]
pub struct HttpLedgerConnector {
    base_url: Url,
    http: Client,
}

impl HttpLedgerConnector {
    pub fn new(
        base_url: Url,
        tls_root_pem: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let mut builder = Client::builder().connect_timeout(timeout);
        if let Some(pem) = tls_root_pem {
            let root = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| LedgerError::Connection(format!("invalid gateway TLS root: {e}")))?;
            builder = builder.add_root_certificate(root);
        }
        let http = builder
            .build()
            .map_err(|e| LedgerError::Connection(format!("failed to build HTTP client: {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(LedgerError::Connection(format!(
                "gateway URL {base_url} cannot carry a path"
            )));
        }

        Ok(Self { base_url, http })
    }
}

#[async_trait]
impl LedgerConnector for HttpLedgerConnector {
    async fn connect(
        &self,
        identity: &Identity,
        channel: &str,
    ) -> Result<Box<dyn LedgerConnection>, LedgerError> {
        let signer = IdentitySigner::from_identity(identity).map_err(|e| {
            LedgerError::Connection(format!("identity {} cannot sign: {e}", identity.label))
        })?;
        debug!(label = %identity.label, channel, url = %self.base_url, "Gateway connection prepared");

        Ok(Box::new(HttpConnection {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            channel: channel.to_string(),
            msp_id: identity.msp_id.clone(),
            certificate: Base64::encode_string(identity.certificate.as_bytes()),
            signer: Some(signer),
        }))
    }
}

struct HttpConnection {
    http: Client,
    base_url: Url,
    channel: String,
    msp_id: String,
    certificate: String,
    /// Dropped on close.
    signer: Option<IdentitySigner>,
}

impl HttpConnection {
    async fn invoke(
        &self,
        mode: Mode,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| LedgerError::Connection("connection is closed".to_string()))?;

        let url = invocation_url(&self.base_url, &self.channel, contract, mode)
            .map_err(LedgerError::Connection)?;
        let body = serde_json::to_vec(&InvocationBody {
            transaction,
            arguments: args,
        })
        .map_err(|e| mode.error(e.to_string()))?;
        let signature = signer
            .sign(&body)
            .map_err(|e| mode.error(e.to_string()))?;

        let response = self
            .http
            .post(url)
            .header(MSP_ID_HEADER, &self.msp_id)
            .header(CERTIFICATE_HEADER, &self.certificate)
            .header(SIGNATURE_HEADER, Base64::encode_string(&signature))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        if status.is_success() {
            return Ok(payload.to_vec());
        }

        let message = serde_json::from_slice::<ErrorBody>(&payload)
            .map(|body| body.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&payload).into_owned());
        Err(mode.error(if message.is_empty() {
            format!("gateway returned {status}")
        } else {
            message
        }))
    }
}

#[async_trait]
impl LedgerConnection for HttpConnection {
    async fn evaluate(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.invoke(Mode::Evaluate, contract, transaction, args).await
    }

    async fn submit(
        &self,
        contract: &str,
        transaction: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        self.invoke(Mode::Submit, contract, transaction, args).await
    }

    fn close(&mut self) {
        self.signer = None;
    }
}

/// `{base}/channels/{channel}/contracts/{contract}/{mode}`.
fn invocation_url(base: &Url, channel: &str, contract: &str, mode: Mode) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| format!("gateway URL {base} cannot carry a path"))?
        .pop_if_empty()
        .extend(["channels", channel, "contracts", contract, mode.path()]);
    Ok(url)
}
