//! Configuration management for beamdrop
//!
//! Values come from built-in defaults, then an optional `config.toml`, then
//! `BEAMDROP_*` environment variables. A positional argument on the command
//! line overrides the shared directory last.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::stats::BroadcastSettings;

/// Ports tried in order when no explicit port is configured.
pub const DEFAULT_PORTS: [u16; 10] = [7777, 8080, 8888, 9000, 9999, 3000, 4000, 5000, 6000, 8000];

const STATS_FILE: &str = "beamdrop.json";
const DATA_DIR_NAME: &str = ".beamdrop";

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Interface the HTTP listener binds to
    pub bind_address: String,

    /// 0 picks the first free port from [`DEFAULT_PORTS`]
    pub port: u16,

    /// Directory exposed to clients
    pub shared_dir: String,

    /// Where the stats document lives; empty means `~/.beamdrop`
    pub data_dir: String,

    /// Accepted and reported at startup; requests are not checked against it
    pub password: String,

    pub stats_refresh_secs: u64,
    pub ping_interval_secs: u64,
    pub read_deadline_secs: u64,

    /// 0 disables the request body limit
    pub max_upload_size_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 0,
            shared_dir: ".".into(),
            data_dir: String::new(),
            password: String::new(),
            stats_refresh_secs: 60,
            ping_interval_secs: 30,
            read_deadline_secs: 60,
            max_upload_size_mb: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("port", defaults.port as i64)?
            .set_default("shared_dir", defaults.shared_dir)?
            .set_default("data_dir", defaults.data_dir)?
            .set_default("password", defaults.password)?
            .set_default("stats_refresh_secs", defaults.stats_refresh_secs as i64)?
            .set_default("ping_interval_secs", defaults.ping_interval_secs as i64)?
            .set_default("read_deadline_secs", defaults.read_deadline_secs as i64)?
            .set_default("max_upload_size_mb", defaults.max_upload_size_mb as i64)?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("beamdrop/config").required(false))
            .add_source(Environment::with_prefix("BEAMDROP").try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the shared directory, e.g. from the command line.
    pub fn with_shared_dir(mut self, dir: impl Into<String>) -> Result<Self, ConfigError> {
        self.shared_dir = dir.into();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_dir.trim().is_empty() {
            return Err(ConfigError::Message("shared_dir cannot be empty".into()));
        }

        if self.stats_refresh_secs == 0 {
            return Err(ConfigError::Message(
                "stats_refresh_secs must be greater than 0".into(),
            ));
        }

        if self.ping_interval_secs == 0 || self.read_deadline_secs == 0 {
            return Err(ConfigError::Message(
                "ping_interval_secs and read_deadline_secs must be greater than 0".into(),
            ));
        }

        // A client answering every ping must always beat the deadline.
        if self.ping_interval_secs >= self.read_deadline_secs {
            return Err(ConfigError::Message(
                "ping_interval_secs must be shorter than read_deadline_secs".into(),
            ));
        }

        Ok(())
    }

    pub fn shared_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.shared_dir)
    }

    /// Location of the stats document. Falls back to the working directory
    /// when no home directory can be determined.
    pub fn stats_path(&self) -> PathBuf {
        let dir = if self.data_dir.trim().is_empty() {
            dirs::home_dir()
                .map(|home| home.join(DATA_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
        } else {
            PathBuf::from(&self.data_dir)
        };
        dir.join(STATS_FILE)
    }

    /// Ports to try, in order.
    pub fn candidate_ports(&self) -> Vec<u16> {
        if self.port == 0 {
            DEFAULT_PORTS.to_vec()
        } else {
            vec![self.port]
        }
    }

    /// `None` means no limit.
    pub fn max_upload_bytes(&self) -> Option<usize> {
        (self.max_upload_size_mb > 0).then(|| {
            self.max_upload_size_mb
                .checked_mul(1024 * 1024)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .unwrap_or(usize::MAX)
        })
    }

    pub fn password_enabled(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            refresh_interval: Duration::from_secs(self.stats_refresh_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            read_deadline: Duration::from_secs(self.read_deadline_secs),
        }
    }
}
