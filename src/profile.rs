// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Network connection profile (`connection-org1.json`).
//!
//! Only the parts the gateway needs are modelled: the client organization
//! and its MSP, certificate authorities with their TLS roots, and peer
//! endpoints. Unknown fields are ignored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::ca::CaSettings;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Cannot read connection profile {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed connection profile: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Connection profile has no {0}")]
    Missing(String),

    #[error("Invalid URL {url:?} in connection profile: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// PEM text, either one string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PemList {
    One(String),
    Many(Vec<String>),
}

impl PemList {
    pub fn joined(&self) -> String {
        match self {
            Self::One(pem) => pem.clone(),
            Self::Many(pems) => pems.join("\n"),
        }
    }
}

/// TLS roots given inline (`pem`) or as a file (`path`). Inline wins.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsCaCerts {
    pub pem: Option<PemList>,
    /// Relative paths resolve against the profile's directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSection {
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub mspid: String,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default, rename = "certificateAuthorities")]
    pub certificate_authorities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthorityEntry {
    pub url: String,
    pub ca_name: Option<String>,
    #[serde(rename = "tlsCACerts")]
    pub tls_ca_certs: Option<TlsCaCerts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerEntry {
    pub url: String,
    #[serde(rename = "tlsCACerts")]
    pub tls_ca_certs: Option<TlsCaCerts>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub organizations: HashMap<String, Organization>,
    #[serde(default, rename = "certificateAuthorities")]
    pub certificate_authorities: HashMap<String, CertificateAuthorityEntry>,
    #[serde(default)]
    pub peers: HashMap<String, PeerEntry>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl ConnectionProfile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut profile = Self::parse(&text)?;
        profile.base_dir = path.parent().map(Path::to_path_buf);
        Ok(profile)
    }

    pub fn parse(text: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Organization named by `client.organization`, or the only one.
    pub fn client_organization(&self) -> Result<&Organization, ProfileError> {
        if let Some(name) = &self.client.organization {
            return self
                .organizations
                .get(name)
                .ok_or_else(|| ProfileError::Missing(format!("organization {name}")));
        }

        let mut organizations = self.organizations.values();
        match (organizations.next(), organizations.next()) {
            (Some(organization), None) => Ok(organization),
            _ => Err(ProfileError::Missing("client organization".to_string())),
        }
    }

    pub fn msp_id(&self) -> Result<&str, ProfileError> {
        Ok(&self.client_organization()?.mspid)
    }

    /// CA client settings for the CA entry `name`.
    pub fn ca_settings(
        &self,
        name: &str,
        accept_invalid_certs: bool,
        timeout: Duration,
    ) -> Result<CaSettings, ProfileError> {
        let entry = self
            .certificate_authorities
            .get(name)
            .ok_or_else(|| ProfileError::Missing(format!("certificate authority {name}")))?;

        Ok(CaSettings {
            url: parse_url(&entry.url)?,
            ca_name: entry.ca_name.clone(),
            tls_root_pem: self.tls_root(entry.tls_ca_certs.as_ref())?,
            accept_invalid_certs,
            timeout,
        })
    }

    /// PEM text of `certs`, reading `path` when no inline PEM is given.
    pub fn tls_root(&self, certs: Option<&TlsCaCerts>) -> Result<Option<String>, ProfileError> {
        let Some(certs) = certs else {
            return Ok(None);
        };
        if let Some(pem) = &certs.pem {
            return Ok(Some(pem.joined()));
        }
        let Some(path) = &certs.path else {
            return Ok(None);
        };

        let path = match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.clone(),
        };
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| ProfileError::Read { path, source })
    }

    /// First peer of the client organization.
    pub fn first_peer(&self) -> Result<(&str, &PeerEntry), ProfileError> {
        let organization = self.client_organization()?;
        organization
            .peers
            .iter()
            .find_map(|name| self.peers.get(name).map(|peer| (name.as_str(), peer)))
            .ok_or_else(|| ProfileError::Missing("peer for the client organization".to_string()))
    }
}

fn parse_url(url: &str) -> Result<Url, ProfileError> {
    Url::parse(url).map_err(|e| ProfileError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "name": "test-network-org1",
        "version": "1.0.0",
        "client": { "organization": "Org1", "connection": { "timeout": { "peer": { "endorser": "300" } } } },
        "organizations": {
            "Org1": {
                "mspid": "Org1MSP",
                "peers": ["peer0.org1.example.com"],
                "certificateAuthorities": ["ca.org1.example.com"]
            }
        },
        "peers": {
            "peer0.org1.example.com": {
                "url": "grpcs://localhost:7051",
                "tlsCACerts": { "pem": "-----BEGIN CERTIFICATE-----\npeer\n-----END CERTIFICATE-----\n" }
            }
        },
        "certificateAuthorities": {
            "ca.org1.example.com": {
                "url": "https://localhost:7054",
                "caName": "ca-org1",
                "tlsCACerts": { "pem": ["-----BEGIN CERTIFICATE-----\nca\n-----END CERTIFICATE-----\n"] },
                "httpOptions": { "verify": false }
            }
        }
    }"#;

    #[test]
    fn parses_test_network_profile() {
        let profile = ConnectionProfile::parse(PROFILE).unwrap();
        assert_eq!(profile.msp_id().unwrap(), "Org1MSP");

        let (name, peer) = profile.first_peer().unwrap();
        assert_eq!(name, "peer0.org1.example.com");
        assert_eq!(peer.url, "grpcs://localhost:7051");
    }

    #[test]
    fn ca_settings_come_from_named_entry() {
        let profile = ConnectionProfile::parse(PROFILE).unwrap();
        let settings = profile
            .ca_settings("ca.org1.example.com", true, Duration::from_secs(10))
            .unwrap();

        assert_eq!(settings.url.as_str(), "https://localhost:7054/");
        assert_eq!(settings.ca_name.as_deref(), Some("ca-org1"));
        assert!(settings.tls_root_pem.unwrap().contains("BEGIN CERTIFICATE"));
        assert!(settings.accept_invalid_certs);
    }

    #[test]
    fn unknown_ca_is_reported() {
        let profile = ConnectionProfile::parse(PROFILE).unwrap();
        let err = profile
            .ca_settings("ca.org2.example.com", false, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ProfileError::Missing(_)));
    }

    const PATH_PROFILE: &str = r#"{
        "client": { "organization": "Org1" },
        "organizations": { "Org1": { "mspid": "Org1MSP", "peers": ["peer0"] } },
        "peers": { "peer0": { "url": "https://localhost:7051", "tlsCACerts": { "path": "tls/peer.pem" } } },
        "certificateAuthorities": {
            "ca.org1.example.com": { "url": "https://localhost:7054", "tlsCACerts": { "path": "tls/ca.pem" } }
        }
    }"#;

    #[test]
    fn tls_roots_load_from_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tls")).unwrap();
        std::fs::write(dir.path().join("tls/ca.pem"), "-----BEGIN CERTIFICATE-----\nca\n").unwrap();
        std::fs::write(dir.path().join("tls/peer.pem"), "-----BEGIN CERTIFICATE-----\npeer\n").unwrap();
        let path = dir.path().join("connection.json");
        std::fs::write(&path, PATH_PROFILE).unwrap();

        let profile = ConnectionProfile::load(&path).unwrap();
        let settings = profile
            .ca_settings("ca.org1.example.com", false, Duration::from_secs(1))
            .unwrap();
        assert!(settings.tls_root_pem.unwrap().contains("ca"));

        let (_, peer) = profile.first_peer().unwrap();
        let peer_root = profile.tls_root(peer.tls_ca_certs.as_ref()).unwrap().unwrap();
        assert!(peer_root.contains("peer"));
    }

    #[test]
    fn missing_tls_root_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connection.json");
        std::fs::write(&path, PATH_PROFILE).unwrap();

        let profile = ConnectionProfile::load(&path).unwrap();
        let err = profile
            .ca_settings("ca.org1.example.com", false, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ProfileError::Read { path, .. } if path.ends_with("tls/ca.pem")));
    }

    #[test]
    fn unreadable_profile_is_an_error() {
        let err = ConnectionProfile::load(Path::new("/nonexistent/connection.json")).unwrap_err();
        assert!(matches!(err, ProfileError::Read { .. }));
        assert!(matches!(
            ConnectionProfile::parse("{not json"),
            Err(ProfileError::Parse(_))
        ));
    }
}
