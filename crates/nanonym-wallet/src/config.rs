//! Manager configuration.
//!
//! Provides [`ManagerConfig`] with defaults for the data directory, node RPC
//! endpoint, collaborator timeouts and background open retries. Values can
//! be layered from an optional TOML file and `NANONYM_*` environment
//! variables (nested keys use `__`, e.g. `NANONYM_RETRY__MAX_ATTEMPTS`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::retry::RetryPolicy;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "NANONYM";

/// Configuration for a [`StealthAccountManager`](crate::StealthAccountManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Root directory for the pseudonym store.
    pub data_dir: PathBuf,
    /// Node JSON RPC endpoint.
    pub rpc_url: String,
    /// Upper bound for any single ledger, channel or store call.
    pub ledger_timeout_ms: u64,
    /// Interval between background open retry ticks.
    pub retry_tick_ms: u64,
    pub retry: RetryPolicy,
    /// Capacity of the inbound notification queue.
    pub inbound_buffer: usize,
    /// Capacity of the manager event channel.
    pub event_buffer: usize,
    /// Skip the multi-account privacy acknowledgement.
    pub suppress_privacy_warning: bool,
    /// Log level filter string (e.g. "info", "nanonym_wallet=debug").
    pub log_level: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nanonym");

        Self {
            data_dir,
            rpc_url: "http://127.0.0.1:7076".to_string(),
            ledger_timeout_ms: 10_000,
            retry_tick_ms: 1_000,
            retry: RetryPolicy::default(),
            inbound_buffer: 256,
            event_buffer: 64,
            suppress_privacy_warning: false,
            log_level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        Self::load_from(path, None)
    }

    /// Like [`load`](Self::load) with an explicit environment map instead
    /// of the process environment.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, WalletError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);
        let cfg: Self = builder
            .add_source(environment)
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| WalletError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.ledger_timeout_ms == 0 {
            return Err(WalletError::Config("ledger_timeout_ms must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(WalletError::Config("retry.max_attempts must be positive".into()));
        }
        if self.retry_tick_ms == 0 {
            return Err(WalletError::Config("retry_tick_ms must be positive".into()));
        }
        if self.inbound_buffer == 0 || self.event_buffer == 0 {
            return Err(WalletError::Config("channel buffers must be positive".into()));
        }
        Ok(())
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn retry_tick(&self) -> Duration {
        Duration::from_millis(self.retry_tick_ms)
    }

    /// Path of the encrypted pseudonym store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("pseudonyms.nnym")
    }
}
