//! Configuration for the stockroom binary, read from `stockroom.toml`.
//!
//! Values are layered file → environment → CLI flags. A missing file yields
//! the defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8086
//!
//! [storage]
//! db_path = ".stockroom/ledger.db"
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! history_cap = 100000
//! return_requires_eligibility = true
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::ledger::models::DEFAULT_HISTORY_CAP;
use crate::ledger::protocol::Policy;
use crate::ledger::service::LedgerSettings;
use crate::telemetry::LogFormat;

/// File name looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "stockroom.toml";

pub const ENV_DB_PATH: &str = "STOCKROOM_DB_PATH";
pub const ENV_PORT: &str = "STOCKROOM_PORT";
pub const ENV_HOST: &str = "STOCKROOM_HOST";
pub const ENV_LOG_LEVEL: &str = "STOCKROOM_LOG_LEVEL";
pub const ENV_HISTORY_CAP: &str = "STOCKROOM_HISTORY_CAP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8086
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".stockroom/ledger.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Maximum history records kept per ledger entry; oldest are evicted.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_return_requires_eligibility")]
    pub return_requires_eligibility: bool,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            return_requires_eligibility: default_return_requires_eligibility(),
        }
    }
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

fn default_return_requires_eligibility() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root of `stockroom.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockroomToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub ledger: LedgerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl StockroomToml {
    /// Load configuration from a specific file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse stockroom.toml")
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize stockroom.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("{} is not a valid port: {:?}", ENV_PORT, port))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(cap) = lookup(ENV_HISTORY_CAP) {
            self.ledger.history_cap = cap.trim().parse().with_context(|| {
                format!("{} is not a valid history cap: {:?}", ENV_HISTORY_CAP, cap)
            })?;
        }
        Ok(())
    }

    /// Reject settings the ledger cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.history_cap == 0 {
            bail!("ledger.history_cap must be at least 1");
        }
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.server.host.trim().is_empty() {
            bail!("server.host must not be empty");
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.busy_timeout_ms)
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            history_cap: self.ledger.history_cap,
            policy: Policy {
                return_requires_eligibility: self.ledger.return_requires_eligibility,
            },
        }
    }
}
