// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into [`GatewayConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `WALLET_DIR` | Identity store directory | `wallet` |
//! | `CONNECTION_PROFILE` | Network connection profile (JSON) | `connection-org1.json` |
//! | `CA_NAME` | CA entry of the profile to use | `ca.org1.example.com` |
//! | `CA_TLS_INSECURE` | Skip CA TLS verification | `false` |
//! | `CHANNEL_NAME` | Channel hosting the contract | `mychannel` |
//! | `CONTRACT_NAME` | Transaction contract name | `fabcar` |
//! | `MSP_ID` | Override the MSP of the profile's client organization | - |
//! | `ADMIN_ID` / `ADMIN_SECRET` | Bootstrap registrar credentials | `admin` / `adminpw` |
//! | `APP_USER_ID` | Application user label and enrollment id | `appUser` |
//! | `USER_AFFILIATION` | Affiliation of the application user | `org1.department1` |
//! | `LEDGER_TIMEOUT_SECS` | Bound on every CA and ledger call | `30` |
//! | `CACHE_REFRESH_SECS` | Background cache refresh interval, `0` disables | `60` |
//! | `ENROLLMENT_RETRY_SECS` | Retry interval after a failed startup enrollment, `0` disables | `30` |
//! | `LEDGER_BACKEND` | `gateway` or `memory` | `gateway` |
//! | `LEDGER_GATEWAY_URL` | Ledger gateway REST endpoint | first peer of the profile |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | Serve HTTPS with this PEM pair | - |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::enrollment::EnrollmentSettings;
use crate::identity::APP_USER_LABEL;
use crate::storage::paths::DEFAULT_WALLET_DIR;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const WALLET_DIR_ENV: &str = "WALLET_DIR";
pub const CONNECTION_PROFILE_ENV: &str = "CONNECTION_PROFILE";
pub const CA_NAME_ENV: &str = "CA_NAME";
pub const CA_TLS_INSECURE_ENV: &str = "CA_TLS_INSECURE";
pub const CHANNEL_NAME_ENV: &str = "CHANNEL_NAME";
pub const CONTRACT_NAME_ENV: &str = "CONTRACT_NAME";
pub const MSP_ID_ENV: &str = "MSP_ID";
pub const ADMIN_ID_ENV: &str = "ADMIN_ID";
pub const ADMIN_SECRET_ENV: &str = "ADMIN_SECRET";
pub const APP_USER_ID_ENV: &str = "APP_USER_ID";
pub const USER_AFFILIATION_ENV: &str = "USER_AFFILIATION";
pub const LEDGER_TIMEOUT_ENV: &str = "LEDGER_TIMEOUT_SECS";
pub const CACHE_REFRESH_ENV: &str = "CACHE_REFRESH_SECS";
pub const ENROLLMENT_RETRY_ENV: &str = "ENROLLMENT_RETRY_SECS";
pub const LEDGER_BACKEND_ENV: &str = "LEDGER_BACKEND";
pub const LEDGER_GATEWAY_URL_ENV: &str = "LEDGER_GATEWAY_URL";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONNECTION_PROFILE: &str = "connection-org1.json";
pub const DEFAULT_CA_NAME: &str = "ca.org1.example.com";
pub const DEFAULT_CHANNEL: &str = "mychannel";
pub const DEFAULT_CONTRACT: &str = "fabcar";
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CACHE_REFRESH: Duration = Duration::from_secs(60);
pub const DEFAULT_ENROLLMENT_RETRY: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    /// Ledger gateway REST endpoint and Fabric CA.
    Gateway,
    /// In-process ledger and CA.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Paths of the PEM pair used to serve HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub wallet_dir: PathBuf,
    pub connection_profile: PathBuf,
    pub ca_name: String,
    pub ca_tls_insecure: bool,
    pub channel: String,
    pub contract: String,
    pub msp_id: Option<String>,
    pub admin_id: String,
    pub admin_secret: String,
    pub app_user_id: String,
    pub affiliation: String,
    pub ledger_timeout: Duration,
    /// `None` disables the background refresher.
    pub cache_refresh: Option<Duration>,
    /// `None` leaves a failed startup enrollment unretried.
    pub enrollment_retry: Option<Duration>,
    pub backend: LedgerBackend,
    pub gateway_url: Option<Url>,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and empty values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        let text = |var: &str, default: &str| get(var).unwrap_or_else(|| default.to_string());

        let defaults = EnrollmentSettings::default();

        let port = match get(PORT_ENV) {
            Some(value) => value.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var: PORT_ENV,
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let ledger_timeout = parse_secs(LEDGER_TIMEOUT_ENV, get(LEDGER_TIMEOUT_ENV))?
            .unwrap_or(DEFAULT_LEDGER_TIMEOUT);
        if ledger_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: LEDGER_TIMEOUT_ENV,
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }
        let cache_refresh = match parse_secs(CACHE_REFRESH_ENV, get(CACHE_REFRESH_ENV))? {
            Some(interval) if interval.is_zero() => None,
            Some(interval) => Some(interval),
            None => Some(DEFAULT_CACHE_REFRESH),
        };
        let enrollment_retry = match parse_secs(ENROLLMENT_RETRY_ENV, get(ENROLLMENT_RETRY_ENV))? {
            Some(interval) if interval.is_zero() => None,
            Some(interval) => Some(interval),
            None => Some(DEFAULT_ENROLLMENT_RETRY),
        };

        let backend = match get(LEDGER_BACKEND_ENV).as_deref().map(str::to_ascii_lowercase) {
            None => LedgerBackend::Gateway,
            Some(value) if value == "gateway" => LedgerBackend::Gateway,
            Some(value) if value == "memory" => LedgerBackend::Memory,
            Some(value) => {
                return Err(ConfigError::Invalid {
                    var: LEDGER_BACKEND_ENV,
                    value,
                    reason: "expected `gateway` or `memory`".to_string(),
                })
            }
        };

        let gateway_url = match get(LEDGER_GATEWAY_URL_ENV) {
            Some(value) => Some(Url::parse(&value).map_err(|e| ConfigError::Invalid {
                var: LEDGER_GATEWAY_URL_ENV,
                value: value.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: text(HOST_ENV, DEFAULT_HOST),
            port,
            wallet_dir: PathBuf::from(text(WALLET_DIR_ENV, DEFAULT_WALLET_DIR)),
            connection_profile: PathBuf::from(text(CONNECTION_PROFILE_ENV, DEFAULT_CONNECTION_PROFILE)),
            ca_name: text(CA_NAME_ENV, DEFAULT_CA_NAME),
            ca_tls_insecure: parse_bool(get(CA_TLS_INSECURE_ENV).as_deref()),
            channel: text(CHANNEL_NAME_ENV, DEFAULT_CHANNEL),
            contract: text(CONTRACT_NAME_ENV, DEFAULT_CONTRACT),
            msp_id: get(MSP_ID_ENV),
            admin_id: text(ADMIN_ID_ENV, &defaults.admin_id),
            admin_secret: text(ADMIN_SECRET_ENV, &defaults.admin_secret),
            app_user_id: text(APP_USER_ID_ENV, APP_USER_LABEL),
            affiliation: text(USER_AFFILIATION_ENV, &defaults.affiliation),
            ledger_timeout,
            cache_refresh,
            enrollment_retry,
            backend,
            gateway_url,
            tls,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Enrollment parameters for the MSP resolved from the profile.
    pub fn enrollment_settings(&self, msp_id: &str) -> EnrollmentSettings {
        EnrollmentSettings {
            admin_id: self.admin_id.clone(),
            admin_secret: self.admin_secret.clone(),
            app_user_id: self.app_user_id.clone(),
            affiliation: self.affiliation.clone(),
            role: EnrollmentSettings::default().role,
            msp_id: msp_id.to_string(),
        }
    }
}

fn parse_secs(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::Invalid {
                    var,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_match_reference_network() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.wallet_dir, PathBuf::from("wallet"));
        assert_eq!(config.channel, "mychannel");
        assert_eq!(config.contract, "fabcar");
        assert_eq!(config.ca_name, "ca.org1.example.com");
        assert_eq!(config.app_user_id, "appUser");
        assert_eq!(config.affiliation, "org1.department1");
        assert_eq!(config.ledger_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_refresh, Some(Duration::from_secs(60)));
        assert_eq!(config.enrollment_retry, Some(Duration::from_secs(30)));
        assert_eq!(config.backend, LedgerBackend::Gateway);
        assert!(config.tls.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("PORT", "9090"),
            ("LEDGER_BACKEND", "Memory"),
            ("CACHE_REFRESH_SECS", "0"),
            ("ENROLLMENT_RETRY_SECS", "0"),
            ("LEDGER_TIMEOUT_SECS", "5"),
            ("CA_TLS_INSECURE", "true"),
            ("LOG_FORMAT", "json"),
            ("LEDGER_GATEWAY_URL", "https://gateway.example.com/api"),
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.backend, LedgerBackend::Memory);
        assert_eq!(config.cache_refresh, None);
        assert_eq!(config.enrollment_retry, None);
        assert_eq!(config.ledger_timeout, Duration::from_secs(5));
        assert!(config.ca_tls_insecure);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.gateway_url.unwrap().as_str(),
            "https://gateway.example.com/api"
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("LEDGER_BACKEND", "fabric")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("LEDGER_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("TLS_CERT_PATH", "cert.pem")]),
            Err(ConfigError::Incomplete(_, _))
        ));
    }

    #[test]
    fn enrollment_settings_carry_msp() {
        let settings = config(&[("ADMIN_SECRET", "s3cret")])
            .unwrap()
            .enrollment_settings("Org2MSP");
        assert_eq!(settings.admin_secret, "s3cret");
        assert_eq!(settings.msp_id, "Org2MSP");
        assert_eq!(settings.role, "client");
    }
}
