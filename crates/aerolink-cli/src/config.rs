//! Configuration vault – reads/writes `~/.aerolink/config.toml`.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use aerolink_net::{EndpointResolver, SIM_PORT};
use serde::{Deserialize, Serialize};

/// Persisted user configuration stored in `~/.aerolink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Explicit simulator host. Empty string means "autodetect".
    #[serde(default)]
    pub sim_host: String,

    /// TCP port of the simulator's RPC service.
    #[serde(default = "default_sim_port")]
    pub sim_port: u16,

    /// Per-candidate TCP probe budget during endpoint resolution, seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Static fallback gateway addresses probed when autodetection finds
    /// nothing. The last entry doubles as the best-guess address when every
    /// probe fails.
    #[serde(default = "default_fallback_gateways")]
    pub fallback_gateways: Vec<String>,

    /// HTTP port of the control API.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_sim_port() -> u16 {
    SIM_PORT
}
fn default_probe_timeout_secs() -> u64 {
    3
}
fn default_fallback_gateways() -> Vec<String> {
    vec!["192.168.1.1".to_string(), "192.168.0.1".to_string()]
}
fn default_server_port() -> u16 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sim_host: String::new(),
            sim_port: default_sim_port(),
            probe_timeout_secs: default_probe_timeout_secs(),
            fallback_gateways: default_fallback_gateways(),
            server_port: default_server_port(),
        }
    }
}

impl Config {
    /// Build the endpoint resolver described by this config.
    pub fn resolver(&self) -> EndpointResolver {
        let override_host = if self.sim_host.trim().is_empty() {
            None
        } else {
            Some(self.sim_host.clone())
        };
        EndpointResolver::new(
            override_host,
            Duration::from_secs(self.probe_timeout_secs),
            self.fallback_gateways.clone(),
            self.sim_port,
        )
    }
}

/// Return the path to `~/.aerolink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".aerolink").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `AEROLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `AEROLINK_SIM_HOST` | `sim_host` |
/// | `AEROLINK_SIM_PORT` | `sim_port` |
/// | `AEROLINK_SERVER_PORT` | `server_port` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("AEROLINK_SIM_HOST") {
        cfg.sim_host = v;
    }
    if let Ok(v) = std::env::var("AEROLINK_SIM_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.sim_port = port;
    }
    if let Ok(v) = std::env::var("AEROLINK_SERVER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.server_port = port;
    }
}

/// Save the config to disk, creating `~/.aerolink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create config directory: {}", e))?;
        // Keep the vault private to the owner on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
