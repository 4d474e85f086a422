//! Ledger configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use contrasign_crypto::{KdfParams, SignatureAlgorithm};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_HASH_TIMEOUT_SECS: u64 = 30;

/// Runtime settings for the ledger and signing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// PostgreSQL connection string; the in-memory store is used when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Argon2id cost for key encryption and credential hashing.
    #[serde(default)]
    pub kdf: KdfParams,

    #[serde(default)]
    pub default_algorithm: SignatureAlgorithm,

    /// Overall limit for streaming an artifact through the hasher.
    #[serde(default = "default_hash_timeout_secs")]
    pub hash_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_hash_timeout_secs() -> u64 {
    DEFAULT_HASH_TIMEOUT_SECS
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            kdf: KdfParams::default(),
            default_algorithm: SignatureAlgorithm::default(),
            hash_timeout_secs: DEFAULT_HASH_TIMEOUT_SECS,
        }
    }
}

impl LedgerConfig {
    /// Reads `DATABASE_URL` and the `CONTRASIGN_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_var(&lookup, "CONTRASIGN_DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            kdf: KdfParams {
                memory_kib: parse_var(&lookup, "CONTRASIGN_KDF_MEMORY_KIB")?
                    .unwrap_or(defaults.kdf.memory_kib),
                iterations: parse_var(&lookup, "CONTRASIGN_KDF_ITERATIONS")?
                    .unwrap_or(defaults.kdf.iterations),
                parallelism: parse_var(&lookup, "CONTRASIGN_KDF_PARALLELISM")?
                    .unwrap_or(defaults.kdf.parallelism),
            },
            default_algorithm: parse_var(&lookup, "CONTRASIGN_DEFAULT_ALGORITHM")?
                .unwrap_or(defaults.default_algorithm),
            hash_timeout_secs: parse_var(&lookup, "CONTRASIGN_HASH_TIMEOUT_SECS")?
                .unwrap_or(defaults.hash_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(LedgerError::BadRequest(
                "CONTRASIGN_DB_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }
        if self.hash_timeout_secs == 0 {
            return Err(LedgerError::BadRequest(
                "CONTRASIGN_HASH_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        self.kdf
            .validate()
            .map_err(|e| LedgerError::BadRequest(format!("CONTRASIGN_KDF_*: {}", e)))
    }

    pub fn hash_timeout(&self) -> Duration {
        Duration::from_secs(self.hash_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| LedgerError::BadRequest(format!("invalid {}='{}': {}", name, raw, e))),
    }
}
