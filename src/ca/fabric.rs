// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fabric CA REST client.
//!
//! ## Endpoints
//!
//! - `POST /api/v1/enroll`: basic auth with the enrollment secret, body
//!   carries a PEM CSR for a P-256 key generated here.
//! - `POST /api/v1/register`: authenticated with a token signed by the
//!   registrar identity:
//!   `base64(cert) "." base64(sign(METHOD "." base64(path) "." base64(body) "." base64(cert)))`.

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::{CaError, CertificateAuthority, Enrollment, RegistrationRequest};
use crate::identity::{Identity, IdentitySigner, PrivateKeyPem, SigningError};

const ENROLL_PATH: &str = "api/v1/enroll";
const REGISTER_PATH: &str = "api/v1/register";

/// Connection settings for one CA, usually taken from the connection profile.
#[derive(Debug, Clone)]
pub struct CaSettings {
    pub url: Url,
    /// CA instance name (`caName` in the profile).
    pub ca_name: Option<String>,
    /// Extra TLS trust root for the CA endpoint.
    pub tls_root_pem: Option<String>,
    /// Skip TLS certificate verification (test networks only).
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CaMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CaEnvelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

#[derive(Debug, Deserialize)]
struct EnrollResult {
    #[serde(rename = "Cert")]
    cert: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    secret: String,
}

#[derive(Serialize)]
struct EnrollBody<'a> {
    certificate_request: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caname: Option<&'a str>,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    role: &'a str,
    affiliation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caname: Option<&'a str>,
}

/// Outcome of a CA call that reached the server.
enum CaReply<T> {
    Accepted(T),
    Rejected { status: StatusCode, message: String },
}

#[derive(Debug, Clone)]
pub struct FabricCaClient {
    base_url: Url,
    ca_name: Option<String>,
    timeout: Duration,
    http: Client,
}

impl FabricCaClient {
    pub fn new(settings: CaSettings) -> Result<Self, CaError> {
        let mut builder = Client::builder().connect_timeout(settings.timeout);

        if let Some(pem) = &settings.tls_root_pem {
            let root = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| CaError::Connection(format!("invalid CA TLS root: {e}")))?;
            builder = builder.add_root_certificate(root);
        }
        if settings.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| CaError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: settings.url,
            ca_name: settings.ca_name,
            timeout: settings.timeout,
            http,
        })
    }

    /// Base URL of the CA.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, CaError> {
        self.base_url
            .join(path)
            .map_err(|e| CaError::Connection(format!("invalid CA URL: {e}")))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<CaReply<T>, CaError> {
        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| CaError::Connection(e.to_string()))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| CaError::Connection(e.to_string()))?;
            Ok::<_, CaError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CaError::Timeout(self.timeout))??;

        let envelope = serde_json::from_slice::<CaEnvelope<T>>(&body);

        if !status.is_success() {
            let message = envelope
                .ok()
                .map(|envelope| join_errors(&envelope.errors))
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Ok(CaReply::Rejected { status, message });
        }

        let envelope = envelope.map_err(|e| CaError::InvalidResponse(e.to_string()))?;
        match envelope.result {
            Some(result) if envelope.success || envelope.errors.is_empty() => {
                Ok(CaReply::Accepted(result))
            }
            _ => Ok(CaReply::Rejected {
                status,
                message: join_errors(&envelope.errors),
            }),
        }
    }
}

#[async_trait]
impl CertificateAuthority for FabricCaClient {
    async fn enroll(&self, enrollment_id: &str, secret: &str) -> Result<Enrollment, CaError> {
        let key_pair = KeyPair::generate()
            .map_err(|e| CaError::Enrollment(format!("key generation failed: {e}")))?;
        let csr = certificate_request(enrollment_id, &key_pair)?;

        let url = self.endpoint(ENROLL_PATH)?;
        debug!(enrollment_id, url = %url, "Sending enrollment request");

        let request = self
            .http
            .post(url)
            .basic_auth(enrollment_id, Some(secret))
            .json(&EnrollBody {
                certificate_request: &csr,
                caname: self.ca_name.as_deref(),
            });

        let result: EnrollResult = match self.send(request).await? {
            CaReply::Accepted(result) => result,
            CaReply::Rejected { status, message } => {
                return Err(CaError::Enrollment(format!("{status}: {message}")));
            }
        };

        let certificate = Base64::decode_vec(&result.cert)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| CaError::InvalidResponse("certificate is not base64 PEM".to_string()))?;

        info!(enrollment_id, "Enrollment accepted by CA");
        Ok(Enrollment {
            certificate,
            private_key: PrivateKeyPem::new(key_pair.serialize_pem()),
        })
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        acting: &Identity,
    ) -> Result<String, CaError> {
        let signer = IdentitySigner::from_identity(acting).map_err(|e| {
            CaError::Authorization(format!("identity {} cannot sign: {e}", acting.label))
        })?;

        let url = self.endpoint(REGISTER_PATH)?;
        let body = serde_json::to_vec(&RegisterBody {
            id: &request.enrollment_id,
            role: &request.role,
            affiliation: &request.affiliation,
            caname: self.ca_name.as_deref(),
        })
        .map_err(|e| CaError::Registration(e.to_string()))?;

        let token = authorization_token(&signer, &acting.certificate, "POST", url.path(), &body)
            .map_err(|e| CaError::Authorization(e.to_string()))?;

        debug!(
            enrollment_id = %request.enrollment_id,
            registrar = %acting.label,
            "Sending registration request"
        );

        let http_request = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);

        match self.send::<RegisterResult>(http_request).await? {
            CaReply::Accepted(result) => Ok(result.secret),
            CaReply::Rejected { status, message }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                Err(CaError::Authorization(format!("{status}: {message}")))
            }
            CaReply::Rejected { status, message } => {
                Err(CaError::Registration(format!("{status}: {message}")))
            }
        }
    }
}

/// PEM CSR with `CN=<enrollment_id>` for `key_pair`.
fn certificate_request(enrollment_id: &str, key_pair: &KeyPair) -> Result<String, CaError> {
    let mut params = CertificateParams::default();
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, enrollment_id);
    params.distinguished_name = name;

    params
        .serialize_request(key_pair)
        .and_then(|csr| csr.pem())
        .map_err(|e| CaError::Enrollment(format!("failed to build CSR: {e}")))
}

/// Fabric CA authorization token for a request body signed by `signer`.
fn authorization_token(
    signer: &IdentitySigner,
    certificate: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<String, SigningError> {
    let cert = Base64::encode_string(certificate.as_bytes());
    let payload = format!(
        "{method}.{}.{}.{cert}",
        Base64::encode_string(path.as_bytes()),
        Base64::encode_string(body)
    );
    let signature = signer.sign(payload.as_bytes())?;
    Ok(format!("{cert}.{}", Base64::encode_string(&signature)))
}

fn join_errors(errors: &[CaMessage]) -> String {
    errors
        .iter()
        .map(|error| format!("[{}] {}", error.code, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
    use serde_json::{json, Value};

    const CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\nAQID\n-----END CERTIFICATE-----\n";

    fn registrar() -> Identity {
        let key = KeyPair::generate().unwrap();
        Identity::new("admin", CERT_PEM, PrivateKeyPem::new(key.serialize_pem()), "Org1MSP")
    }

    fn settings(url: &str, timeout: Duration) -> CaSettings {
        CaSettings {
            url: Url::parse(url).unwrap(),
            ca_name: Some("ca-org1".to_string()),
            tls_root_pem: None,
            accept_invalid_certs: false,
            timeout,
        }
    }

    async fn enroll_stub(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let expected = format!("Basic {}", Base64::encode_string(b"admin:adminpw"));
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "result": null,
                    "errors": [{ "code": 20, "message": "Authentication failure" }],
                    "messages": []
                })),
            );
        }
        assert!(body["certificate_request"]
            .as_str()
            .unwrap()
            .contains("BEGIN CERTIFICATE REQUEST"));
        assert_eq!(body["caname"], "ca-org1");

        (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "result": { "Cert": Base64::encode_string(CERT_PEM.as_bytes()) },
                "errors": [],
                "messages": []
            })),
        )
    }

    async fn register_stub(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if token.split('.').count() != 2 || body["id"] == "rejected" {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "success": false,
                    "result": null,
                    "errors": [{ "code": 71, "message": "Authorization failure" }],
                    "messages": []
                })),
            );
        }
        (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "result": { "secret": "s3cret" },
                "errors": [],
                "messages": []
            })),
        )
    }

    async fn spawn_stub_ca() -> String {
        let app = Router::new()
            .route("/api/v1/enroll", post(enroll_stub))
            .route("/api/v1/register", post(register_stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn enroll_returns_certificate_and_generated_key() {
        let url = spawn_stub_ca().await;
        let client = FabricCaClient::new(settings(&url, Duration::from_secs(5))).unwrap();

        let enrollment = client.enroll("admin", "adminpw").await.unwrap();
        assert_eq!(enrollment.certificate, CERT_PEM);
        assert!(enrollment.private_key.expose().contains("BEGIN PRIVATE KEY"));
    }

    #[tokio::test]
    async fn enroll_with_wrong_secret_is_enrollment_error() {
        let url = spawn_stub_ca().await;
        let client = FabricCaClient::new(settings(&url, Duration::from_secs(5))).unwrap();

        let err = client.enroll("admin", "wrong").await.unwrap_err();
        match err {
            CaError::Enrollment(message) => assert!(message.contains("Authentication failure")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_returns_secret() {
        let url = spawn_stub_ca().await;
        let client = FabricCaClient::new(settings(&url, Duration::from_secs(5))).unwrap();
        let request = RegistrationRequest {
            enrollment_id: "appUser".to_string(),
            affiliation: "org1.department1".to_string(),
            role: "client".to_string(),
        };

        let secret = client.register(&request, &registrar()).await.unwrap();
        assert_eq!(secret, "s3cret");
    }

    #[tokio::test]
    async fn register_rejected_by_ca_is_authorization_error() {
        let url = spawn_stub_ca().await;
        let client = FabricCaClient::new(settings(&url, Duration::from_secs(5))).unwrap();
        let request = RegistrationRequest {
            enrollment_id: "rejected".to_string(),
            affiliation: "org1.department1".to_string(),
            role: "client".to_string(),
        };

        let err = client.register(&request, &registrar()).await.unwrap_err();
        assert!(matches!(err, CaError::Authorization(_)));
    }

    #[tokio::test]
    async fn register_without_signing_key_fails_before_network() {
        // Nothing listens on the discard port; the call must fail locally.
        let client = FabricCaClient::new(settings("http://127.0.0.1:9", Duration::from_secs(5))).unwrap();
        let mut acting = registrar();
        acting.private_key = PrivateKeyPem::new("not a key");
        let request = RegistrationRequest {
            enrollment_id: "appUser".to_string(),
            affiliation: "org1.department1".to_string(),
            role: "client".to_string(),
        };

        let err = client.register(&request, &acting).await.unwrap_err();
        assert!(matches!(err, CaError::Authorization(_)));
    }

    #[tokio::test]
    async fn unresponsive_ca_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = FabricCaClient::new(settings(
            &format!("http://{addr}"),
            Duration::from_millis(100),
        ))
        .unwrap();
        let err = client.enroll("admin", "adminpw").await.unwrap_err();
        assert!(matches!(err, CaError::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn authorization_token_signs_method_path_body_and_cert() {
        let identity = registrar();
        let signer = IdentitySigner::from_identity(&identity).unwrap();
        let body = br#"{"id":"appUser"}"#;

        let token = authorization_token(&signer, CERT_PEM, "POST", "/api/v1/register", body).unwrap();
        let (cert_b64, signature_b64) = token.split_once('.').unwrap();
        assert_eq!(cert_b64, Base64::encode_string(CERT_PEM.as_bytes()));

        let payload = format!(
            "POST.{}.{}.{cert_b64}",
            Base64::encode_string(b"/api/v1/register"),
            Base64::encode_string(body)
        );
        let signature = Base64::decode_vec(signature_b64).unwrap();
        let signature = Signature::from_der(&signature).unwrap();
        VerifyingKey::from_sec1_bytes(signer.public_key())
            .unwrap()
            .verify(payload.as_bytes(), &signature)
            .expect("token signature verifies");
    }

    #[test]
    fn csr_carries_common_name() {
        let key = KeyPair::generate().unwrap();
        let csr = certificate_request("appUser", &key).unwrap();
        assert!(csr.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }
}
