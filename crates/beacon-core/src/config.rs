//! Configuration system for beacon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BEACON_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/beacon/config.toml
//!   3. ~/.config/beacon/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub network: NetworkConfig,
    pub registry: RegistryConfig,
    pub probe: ProbeConfig,
    pub bans: BanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the HTTP API binds to.
    pub bind_address: String,
    /// Port the HTTP API listens on.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seconds without an update before an online record is marked offline.
    /// Servers announce roughly every 5 minutes, so keep this above 300.
    pub purge_time_secs: u64,
    /// Interval between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// Interval between re-probes of every online server. 0 = disabled.
    pub reping_interval_secs: u64,
    /// Weight of past client counts in the smoothed popularity, in [0, 1).
    /// Higher = slower to follow the current count.
    pub popularity_factor: f64,
    /// Treat an update for an unknown server as an implicit start.
    /// Start-only fields (mods, mapgen, privileges) are then backfilled
    /// from the update payload. Meant for repopulating an emptied list.
    pub allow_update_without_old: bool,
    /// Reject announces claiming private, loopback, or reserved addresses.
    pub reject_private_addresses: bool,
    /// Hard cap on the announce JSON payload, in bytes.
    pub max_announce_bytes: usize,
    /// Where the published list document is written.
    pub list_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum number of probes in flight at once.
    pub max_concurrent: usize,
    /// Queued announces waiting for a probe slot before new ones are refused.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanConfig {
    /// Announcing IPs that are refused outright.
    pub ips: Vec<String>,
    /// Banned servers: "host", or "host/port" for a single port.
    /// Hostnames lowercase, no trailing dot.
    pub servers: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            registry: RegistryConfig::default(),
            probe: ProbeConfig::default(),
            bans: BanConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            purge_time_secs: 360,
            sweep_interval_secs: 60,
            reping_interval_secs: 300,
            popularity_factor: 0.9,
            allow_update_without_old: false,
            reject_private_addresses: true,
            max_announce_bytes: 8192,
            list_path: data_dir().join("list.json"),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            queue_depth: 64,
        }
    }
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            ips: Vec::new(),
            servers: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn purge_time(&self) -> Duration {
        Duration::from_secs(self.purge_time_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn reping_interval(&self) -> Duration {
        Duration::from_secs(self.reping_interval_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("beacon")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("beacon")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BeaconConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BEACON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BeaconConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply BEACON_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BEACON_NETWORK__BIND_ADDRESS") {
            self.network.bind_address = v;
        }
        if let Ok(v) = std::env::var("BEACON_NETWORK__PORT") {
            if let Ok(p) = v.parse() {
                self.network.port = p;
            }
        }
        if let Ok(v) = std::env::var("BEACON_REGISTRY__LIST_PATH") {
            self.registry.list_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("BEACON_REGISTRY__ALLOW_UPDATE_WITHOUT_OLD") {
            self.registry.allow_update_without_old = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("BEACON_REGISTRY__REJECT_PRIVATE_ADDRESSES") {
            self.registry.reject_private_addresses = v == "true" || v == "1";
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.registry.popularity_factor) {
            return Err(ConfigError::InvalidValue(
                "popularity_factor must be in [0, 1)".into(),
            ));
        }
        if self.registry.purge_time_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "purge_time_secs cannot be 0".into(),
            ));
        }
        if self.probe.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "probe.max_concurrent cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
