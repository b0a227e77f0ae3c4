//! Server and validator configuration, read from the environment.

use crate::chain::cache::DEFAULT_BLOCK_CACHE_CAPACITY;
use crate::chain::types::InstanceId;
use crate::ticket::{ChallengeHasher, TicketEncoding};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("Failed to read service accounts from {path}: {reason}")]
    ServiceAccounts { path: String, reason: String },
}

/// Settings the validator core depends on.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Size in bytes of the challenge at the front of a ticket.
    pub challenge_size: usize,

    /// Maximum age of the latest block.
    pub tx_validity: Duration,

    /// Argument of the return transfer carrying the hashed challenge.
    pub tx_argument_name: String,

    pub ticket_encoding: TicketEncoding,

    pub challenge_hasher: ChallengeHasher,

    /// Coin instance of each relying service, keyed by host (and port when not default).
    pub service_accounts: HashMap<String, InstanceId>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            challenge_size: 16,
            tx_validity: Duration::from_secs(3600),
            tx_argument_name: "challenge".to_string(),
            ticket_encoding: TicketEncoding::Base64Url,
            challenge_hasher: ChallengeHasher::Sha256,
            service_accounts: HashMap::new(),
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub ledger_rpc_url: String,
    pub ledger_rpc_timeout: Duration,
    /// Blocks kept in memory; 0 disables the cache.
    pub block_cache_capacity: u64,
    /// Send the detailed failure reason to relying services instead of a generic message.
    pub expose_failure_reason: bool,
    pub validator: ValidatorConfig,
}

/// Load settings from environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(|name| env::var(name).ok())
}

/// Load settings through `lookup`, reading the service account file it names.
pub fn load_config_from<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ValidatorConfig::default();
    let services_path =
        lookup("SERVICE_ACCOUNTS_PATH").unwrap_or_else(|| "./services.json".to_string());

    Ok(Settings {
        port: parse_var(&lookup, "PORT", 8080)?,
        ledger_rpc_url: lookup("LEDGER_RPC_URL")
            .unwrap_or_else(|| "http://localhost:7771".to_string()),
        ledger_rpc_timeout: Duration::from_secs(parse_var(
            &lookup,
            "LEDGER_RPC_TIMEOUT_SECS",
            10,
        )?),
        block_cache_capacity: parse_var(
            &lookup,
            "BLOCK_CACHE_CAPACITY",
            DEFAULT_BLOCK_CACHE_CAPACITY,
        )?,
        expose_failure_reason: parse_var(&lookup, "EXPOSE_FAILURE_REASON", false)?,
        validator: ValidatorConfig {
            challenge_size: parse_var(&lookup, "CHALLENGE_SIZE", defaults.challenge_size)?,
            tx_validity: Duration::from_secs(parse_var(
                &lookup,
                "TX_VALIDITY_SECS",
                defaults.tx_validity.as_secs(),
            )?),
            tx_argument_name: lookup("TX_ARGUMENT_NAME").unwrap_or(defaults.tx_argument_name),
            ticket_encoding: parse_var(&lookup, "TICKET_ENCODING", defaults.ticket_encoding)?,
            challenge_hasher: parse_var(&lookup, "CHALLENGE_HASH", defaults.challenge_hasher)?,
            service_accounts: load_service_accounts(Path::new(&services_path))?,
        },
    })
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Read the `{ "host": "<hex coin id>" }` service map from a JSON file.
pub fn load_service_accounts(path: &Path) -> Result<HashMap<String, InstanceId>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ServiceAccounts {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_service_accounts(&content).map_err(|reason| ConfigError::ServiceAccounts {
        path: path.display().to_string(),
        reason,
    })
}

pub fn parse_service_accounts(json: &str) -> Result<HashMap<String, InstanceId>, String> {
    let raw: HashMap<String, String> = serde_json::from_str(json).map_err(|e| e.to_string())?;

    raw.into_iter()
        .map(|(host, id)| {
            let coin = InstanceId::from_hex(id.trim())
                .ok_or_else(|| format!("coin id for {} is not 32 hex-encoded bytes", host))?;
            Ok((host.to_ascii_lowercase(), coin))
        })
        .collect()
}
