// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{error::Error, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use confidential_settlement::{
    api::router,
    attestation::{
        AttestationPolicy, AttestationSource, MockAttestationSource, RootOfTrust,
        StaticAttestationSource, WorkerSigner,
    },
    clock::SystemClock,
    config::{
        AppConfig, AttestationMode, DecryptionMode, LogFormat, VenueMode, DEFAULT_LOG_FILTER,
    },
    decryption::{LocalThresholdService, RemoteThresholdService, ThresholdDecryption},
    ledger::{Ledger, LedgerConfig},
    state::{AppState, AuthConfig},
    storage::StoragePaths,
    venue::{ConstantProductVenue, RemoteSwapVenue, SwapVenue},
    worker::{ConfidentialWorker, RetryPolicy, WorkerConfig},
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    let paths = StoragePaths::new(&config.data_dir);
    paths.ensure_layout(config.worker_replicas)?;

    let (root, source): (RootOfTrust, Box<dyn AttestationSource>) = match &config.attestation {
        AttestationMode::Mock => {
            tracing::warn!("ATTESTATION_ROOT_PUBKEY not set; attesting workers with a mock root");
            let source = MockAttestationSource::new();
            (source.root_of_trust(), Box::new(source))
        }
        AttestationMode::Static {
            root_public_key,
            proof_path,
        } => (
            RootOfTrust::from_hex(root_public_key)?,
            Box::new(StaticAttestationSource::from_file(proof_path)?),
        ),
    };
    let policy = AttestationPolicy::new(root, config.allowed_measurements.clone())?;

    let ledger = Arc::new(Ledger::open(
        &paths.ledger_db(),
        LedgerConfig {
            namespace: config.namespace.clone(),
            attestation: policy,
        },
        Arc::new(SystemClock),
    )?);

    let decryption: Arc<dyn ThresholdDecryption> = match &config.decryption {
        DecryptionMode::Local {
            master_key,
            custodians,
            threshold,
        } => {
            tracing::info!(custodians, threshold, "Using in-process threshold committee");
            Arc::new(LocalThresholdService::new(
                Arc::clone(&ledger),
                master_key,
                *custodians,
                *threshold,
            )?)
        }
        DecryptionMode::Remote { url } => {
            tracing::info!(%url, "Using remote threshold decryption service");
            Arc::new(RemoteThresholdService::new(url.clone())?)
        }
    };

    let venue: Arc<dyn SwapVenue> = match &config.venue {
        VenueMode::Local { pools } => Arc::new(ConstantProductVenue::from_spec(pools)?),
        VenueMode::Remote { url } => {
            tracing::info!(%url, "Using remote swap venue");
            Arc::new(RemoteSwapVenue::new(url.clone())?)
        }
    };

    let shutdown = CancellationToken::new();
    let workers = spawn_workers(
        &config,
        &paths,
        &ledger,
        &decryption,
        &venue,
        source.as_ref(),
        &shutdown,
    )
    .await?;

    if config.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET not set; bearer-authenticated endpoints will reject requests");
    }
    let state = AppState::new(
        Arc::clone(&ledger),
        Arc::clone(&decryption),
        AuthConfig {
            secret: config.jwt_secret.clone(),
            issuer: config.jwt_issuer.clone(),
        },
    );
    let app = router(state);

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), shutdown.clone()));

    let addr = config.bind_addr;
    match &config.tls {
        Some(tls) => {
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "failed to install rustls crypto provider")?;
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            tracing::info!(%addr, "Confidential settlement listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::warn!(%addr, "TLS_CERT_PATH not set; serving plain http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    shutdown.cancel();
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Attest and start one worker per configured replica.
async fn spawn_workers(
    config: &AppConfig,
    paths: &StoragePaths,
    ledger: &Arc<Ledger>,
    decryption: &Arc<dyn ThresholdDecryption>,
    venue: &Arc<dyn SwapVenue>,
    source: &dyn AttestationSource,
    shutdown: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, Box<dyn Error>> {
    let mut handles = Vec::with_capacity(config.worker_replicas);
    for replica in 0..config.worker_replicas {
        let key_path = match (&config.worker_key_path, replica) {
            (Some(path), 0) => path.clone(),
            _ => paths.worker_key(replica),
        };
        let signer = WorkerSigner::load_or_generate(&key_path)?;
        let worker = Arc::new(ConfidentialWorker::new(
            replica,
            Arc::clone(ledger),
            Arc::clone(decryption),
            Arc::clone(venue),
            signer,
            WorkerConfig {
                poll_interval: config.poll_interval,
                max_concurrency: config.max_concurrency,
                retry: RetryPolicy::default(),
            },
        ));
        let record = worker.ensure_registered(source).await?;
        tracing::info!(
            replica,
            record_id = record.record_id,
            public_key = %worker.public_key(),
            "Worker replica attested"
        );
        handles.push(tokio::spawn(worker.run(shutdown.clone())));
    }
    Ok(handles)
}

async fn shutdown_signal(handle: Handle<std::net::SocketAddr>, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received; draining");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
