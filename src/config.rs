// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and their parsed form. Configuration
//! is loaded once from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger and worker keys | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; both or neither | plain HTTP |
//! | `JWT_SECRET` | HS256 secret for bearer tokens | Required for production |
//! | `JWT_ISSUER` | Expected `iss` claim | Optional |
//! | `DEPLOYMENT_NAMESPACE` | Namespace bound into every ciphertext scope | `local` |
//! | `ATTESTATION_ROOT_PUBKEY` | Root-of-trust public key (SEC1 hex) | Mock root generated at boot |
//! | `ALLOWED_MEASUREMENTS` | Comma-separated measurement allowlist | Empty (any) |
//! | `ATTESTATION_PROOF_PATH` | Pre-issued attestation proof (JSON) | Required with a real root |
//! | `WORKER_KEY_PATH` | Worker signing key PEM for replica 0 | `$DATA_DIR/workers/replica-N/key.pem` |
//! | `WORKER_REPLICAS` | Number of in-process worker replicas | `2` |
//! | `WORKER_POLL_INTERVAL_SECS` | Fallback poll interval | `5` |
//! | `WORKER_MAX_CONCURRENCY` | Concurrent intents per replica | `8` |
//! | `DECRYPTION_URL` | Remote threshold decryption service | In-process custodians |
//! | `SEAL_MASTER_KEY` | Hex master secret (>= 32 bytes) for in-process custodians | Required without `DECRYPTION_URL` |
//! | `CUSTODIAN_COUNT` / `CUSTODIAN_THRESHOLD` | In-process committee size and quorum | `3` / `2` |
//! | `VENUE_URL` | Remote swap venue | In-process pools |
//! | `VENUE_POOLS` | `BASE:QUOTE:reserve_base:reserve_quote:fee_bps`, comma-separated | Empty |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const DEPLOYMENT_NAMESPACE_ENV: &str = "DEPLOYMENT_NAMESPACE";
pub const ATTESTATION_ROOT_PUBKEY_ENV: &str = "ATTESTATION_ROOT_PUBKEY";
pub const ALLOWED_MEASUREMENTS_ENV: &str = "ALLOWED_MEASUREMENTS";
pub const ATTESTATION_PROOF_PATH_ENV: &str = "ATTESTATION_PROOF_PATH";
pub const WORKER_KEY_PATH_ENV: &str = "WORKER_KEY_PATH";
pub const WORKER_REPLICAS_ENV: &str = "WORKER_REPLICAS";
pub const WORKER_POLL_INTERVAL_SECS_ENV: &str = "WORKER_POLL_INTERVAL_SECS";
pub const WORKER_MAX_CONCURRENCY_ENV: &str = "WORKER_MAX_CONCURRENCY";
pub const DECRYPTION_URL_ENV: &str = "DECRYPTION_URL";
pub const SEAL_MASTER_KEY_ENV: &str = "SEAL_MASTER_KEY";
pub const CUSTODIAN_COUNT_ENV: &str = "CUSTODIAN_COUNT";
pub const CUSTODIAN_THRESHOLD_ENV: &str = "CUSTODIAN_THRESHOLD";
pub const VENUE_URL_ENV: &str = "VENUE_URL";
pub const VENUE_POOLS_ENV: &str = "VENUE_POOLS";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Where the attestation root and worker proofs come from.
#[derive(Debug, Clone)]
pub enum AttestationMode {
    /// Dev root generated at boot; every replica is attested by it.
    Mock,
    /// Real root of trust; replica 0 presents a pre-issued proof.
    Static {
        root_public_key: String,
        proof_path: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub enum DecryptionMode {
    Local {
        master_key: Vec<u8>,
        custodians: usize,
        threshold: usize,
    },
    Remote {
        url: String,
    },
}

#[derive(Debug, Clone)]
pub enum VenueMode {
    Local { pools: String },
    Remote { url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub tls: Option<TlsPaths>,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub namespace: String,
    pub attestation: AttestationMode,
    pub allowed_measurements: Vec<String>,
    pub worker_key_path: Option<PathBuf>,
    pub worker_replicas: usize,
    pub poll_interval: Duration,
    pub max_concurrency: usize,
    pub decryption: DecryptionMode,
    pub venue: VenueMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&get, PORT_ENV, 8080)?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid(HOST_ENV, &host, e))?;

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid(LOG_FORMAT_ENV, other, "expected json or pretty")),
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Inconsistent(format!(
                    "{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together"
                )))
            }
        };

        let attestation = match get(ATTESTATION_ROOT_PUBKEY_ENV) {
            None => AttestationMode::Mock,
            Some(root_public_key) => AttestationMode::Static {
                root_public_key,
                proof_path: get(ATTESTATION_PROOF_PATH_ENV)
                    .ok_or(ConfigError::Missing(ATTESTATION_PROOF_PATH_ENV))?
                    .into(),
            },
        };

        let worker_replicas: usize = parse_or(&get, WORKER_REPLICAS_ENV, 2)?;
        if matches!(attestation, AttestationMode::Static { .. }) && worker_replicas > 1 {
            return Err(ConfigError::Inconsistent(format!(
                "{ATTESTATION_PROOF_PATH_ENV} attests one key; set {WORKER_REPLICAS_ENV}=1"
            )));
        }

        let decryption = match get(DECRYPTION_URL_ENV) {
            Some(url) => DecryptionMode::Remote { url },
            None => {
                let raw = get(SEAL_MASTER_KEY_ENV).ok_or(ConfigError::Missing(SEAL_MASTER_KEY_ENV))?;
                let master_key = hex::decode(raw.trim()).map_err(|e| invalid(SEAL_MASTER_KEY_ENV, "<redacted>", e))?;
                if master_key.len() < 32 {
                    return Err(invalid(SEAL_MASTER_KEY_ENV, "<redacted>", "must be at least 32 bytes"));
                }
                let custodians: usize = parse_or(&get, CUSTODIAN_COUNT_ENV, 3)?;
                let threshold: usize = parse_or(&get, CUSTODIAN_THRESHOLD_ENV, 2)?;
                if threshold == 0 || threshold > custodians {
                    return Err(ConfigError::Inconsistent(format!(
                        "{CUSTODIAN_THRESHOLD_ENV} must be within 1..={custodians}"
                    )));
                }
                DecryptionMode::Local {
                    master_key,
                    custodians,
                    threshold,
                }
            }
        };

        let venue = match get(VENUE_URL_ENV) {
            Some(url) => VenueMode::Remote { url },
            None => VenueMode::Local {
                pools: get(VENUE_POOLS_ENV).unwrap_or_default(),
            },
        };

        Ok(Self {
            data_dir: get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()).into(),
            bind_addr,
            log_format,
            tls,
            jwt_secret: get(JWT_SECRET_ENV),
            jwt_issuer: get(JWT_ISSUER_ENV),
            namespace: get(DEPLOYMENT_NAMESPACE_ENV).unwrap_or_else(|| "local".to_string()),
            attestation,
            allowed_measurements: get(ALLOWED_MEASUREMENTS_ENV)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            worker_key_path: get(WORKER_KEY_PATH_ENV).map(PathBuf::from),
            worker_replicas,
            poll_interval: Duration::from_secs(parse_or(&get, WORKER_POLL_INTERVAL_SECS_ENV, 5)?),
            max_concurrency: parse_or(&get, WORKER_MAX_CONCURRENCY_ENV, 8)?,
            decryption,
            venue,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(name, &raw, e)),
        None => Ok(default),
    }
}

fn invalid(name: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
