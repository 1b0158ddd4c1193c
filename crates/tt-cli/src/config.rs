//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default TCP port of the daemon.
pub const DEFAULT_DAEMON_PORT: u16 = 59122;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Host the daemon listens on and clients connect to.
    pub daemon_host: String,

    pub daemon_port: u16,

    /// Send commands to the daemon instead of opening the database directly.
    pub remote: bool,

    /// Per-subscriber event buffer of the daemon's event buses.
    pub bus_capacity: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("daemon", &self.daemon_addr())
            .field("remote", &self.remote)
            .field("bus_capacity", &self.bus_capacity)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tt.db"),
            daemon_host: "localhost".to_string(),
            daemon_port: DEFAULT_DAEMON_PORT,
            remote: false,
            bus_capacity: tt_core::bus::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TT_*)
        figment = figment.merge(Env::prefixed("TT_"));

        let mut config: Self = figment.extract()?;
        config.bus_capacity = config.bus_capacity.max(1);
        Ok(config)
    }

    /// `host:port` of the daemon.
    pub fn daemon_addr(&self) -> String {
        format!("{}:{}", self.daemon_host, self.daemon_port)
    }
}

/// Returns the platform-specific config directory for tt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tt"))
}

/// Returns the platform-specific data directory for tt.
///
/// On Linux: `~/.local/share/tt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tt"))
}
