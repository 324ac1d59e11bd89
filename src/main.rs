// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use ledger_gateway::{
    api::router,
    ca::{CaError, CertificateAuthority, DevCertificateAuthority, FabricCaClient},
    config::{GatewayConfig, LedgerBackend},
    enrollment::{EnrollmentManager, EnrollmentSettings},
    error::GatewayError,
    ledger::{HttpLedgerConnector, InMemoryLedger, LedgerConnector, LedgerError, LedgerGateway, SessionSettings},
    profile::{ConnectionProfile, ProfileError},
    state::AppState,
    storage::{IdentityStore, StorageError, WalletStorage},
    telemetry,
    transactions::{CacheRefresher, TransactionService},
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Wallet storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("Certificate authority: {0}")]
    Ca(#[from] CaError),

    #[error("Ledger connector: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Enrollment failed: {0}")]
    Enrollment(#[from] GatewayError),

    #[error("Invalid bind address {addr}: {reason}")]
    BindAddress { addr: String, reason: String },

    #[error("Peer URL {0} is not an HTTP endpoint; set LEDGER_GATEWAY_URL")]
    UnsupportedPeerUrl(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// CA, ledger connector and MSP selected by `LEDGER_BACKEND`.
struct Backend {
    ca: Arc<dyn CertificateAuthority>,
    connector: Arc<dyn LedgerConnector>,
    msp_id: String,
}

#[tokio::main]
async fn main() {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    telemetry::init(config.log_format).expect("Failed to initialize logging");

    if let Err(e) = run(config).await {
        error!(error = %e, "Ledger gateway terminated");
        std::process::exit(1);
    }
}

async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let storage = WalletStorage::open(&config.wallet_dir)?;
    storage.health_check()?;
    info!(wallet = %config.wallet_dir.display(), "Wallet opened");

    let backend = build_backend(&config).await?;
    let identities = Arc::new(IdentityStore::new(storage.clone()));

    let enrollment = Arc::new(EnrollmentManager::new(
        Arc::clone(&identities),
        backend.ca,
        config.enrollment_settings(&backend.msp_id),
    ));
    let shutdown = CancellationToken::new();
    match enrollment.bootstrap_at_startup().await? {
        Some(report) => {
            info!(admin = ?report.admin, app_user = ?report.app_user, "Identities ready");
        }
        None => match config.enrollment_retry {
            Some(interval) => {
                tokio::spawn(Arc::clone(&enrollment).retry_until_enrolled(interval, shutdown.clone()));
            }
            None => warn!("Enrollment retry disabled; ledger requests fail until identities exist"),
        },
    }

    let gateway = LedgerGateway::new(
        Arc::clone(&identities),
        backend.connector,
        SessionSettings {
            identity_label: config.app_user_id.clone(),
            channel: config.channel.clone(),
            contract: config.contract.clone(),
            timeout: config.ledger_timeout,
        },
    );
    let transactions = Arc::new(TransactionService::new(gateway, storage));

    match transactions.refresh().await {
        Ok(cache) => info!(count = cache.count(), "Transaction cache loaded"),
        Err(e) => warn!(error = %e, "Initial transaction refresh failed; continuing"),
    }

    if let Some(interval) = config.cache_refresh {
        let refresher = CacheRefresher::new(Arc::clone(&transactions), interval);
        tokio::spawn(refresher.run(shutdown.clone()));
    }

    let app = router(AppState::new(identities, transactions));

    let bind_addr = config.bind_addr();
    let addr: SocketAddr = bind_addr.parse().map_err(|e: std::net::AddrParseError| {
        StartupError::BindAddress {
            addr: bind_addr.clone(),
            reason: e.to_string(),
        }
    })?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), shutdown.clone()));

    match &config.tls {
        Some(paths) => {
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
            info!(%addr, "Ledger gateway listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "Ledger gateway listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    shutdown.cancel();
    info!("Ledger gateway stopped");
    Ok(())
}

async fn build_backend(config: &GatewayConfig) -> Result<Backend, StartupError> {
    match config.backend {
        LedgerBackend::Memory => {
            warn!("Using the in-memory ledger and development CA; state is lost on exit");
            let ca = DevCertificateAuthority::new(&config.admin_id, &config.admin_secret)?;
            let ledger = InMemoryLedger::seeded(&config.channel, &config.contract).await;
            Ok(Backend {
                ca: Arc::new(ca),
                connector: Arc::new(ledger),
                msp_id: config
                    .msp_id
                    .clone()
                    .unwrap_or_else(|| EnrollmentSettings::default().msp_id),
            })
        }
        LedgerBackend::Gateway => {
            let profile = ConnectionProfile::load(&config.connection_profile)?;
            let msp_id = match &config.msp_id {
                Some(msp_id) => msp_id.clone(),
                None => profile.msp_id()?.to_string(),
            };

            let ca_settings =
                profile.ca_settings(&config.ca_name, config.ca_tls_insecure, config.ledger_timeout)?;
            let ca = FabricCaClient::new(ca_settings)?;
            info!(ca = %ca.url(), %msp_id, "Using Fabric CA");

            let (gateway_url, tls_root) = match &config.gateway_url {
                Some(url) => (url.clone(), None),
                None => {
                    let (name, peer) = profile.first_peer()?;
                    let url = peer_gateway_url(&peer.url)?;
                    info!(peer = name, %url, "No LEDGER_GATEWAY_URL; using the first peer");
                    let tls_root = profile.tls_root(peer.tls_ca_certs.as_ref())?;
                    (url, tls_root)
                }
            };
            let connector =
                HttpLedgerConnector::new(gateway_url, tls_root.as_deref(), config.ledger_timeout)?;

            Ok(Backend {
                ca: Arc::new(ca),
                connector: Arc::new(connector),
                msp_id,
            })
        }
    }
}

fn peer_gateway_url(raw: &str) -> Result<Url, StartupError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(StartupError::UnsupportedPeerUrl(raw.to_string())),
    }
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for shutdown signal");
            return;
        }
    }
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
