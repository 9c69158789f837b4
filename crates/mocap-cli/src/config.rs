//! Bridge configuration – reads/writes `~/.mocap/config.toml`.

use mocap_tracker::{TimePolicy, TrackerHandlerOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tracking service endpoint identifier.  Part of every session key.
    #[serde(default = "default_host")]
    pub host: String,

    /// Parent frame of ENU output.
    #[serde(default = "default_frame")]
    pub frame: String,

    /// Parent frame of NED output.
    #[serde(default = "default_ned_frame")]
    pub ned_frame: String,

    /// Names of the tracked bodies to republish.
    #[serde(default)]
    pub trackers: Vec<String>,

    /// UDP address the tracker reports arrive on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port of the WebSocket bridge.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    #[serde(default)]
    pub time_policy: TimePolicy,

    #[serde(default)]
    pub normalize_orientation: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_frame() -> String {
    "world".to_string()
}
fn default_ned_frame() -> String {
    "world_ned".to_string()
}
fn default_listen_addr() -> String {
    "0.0.0.0:3883".to_string()
}
fn default_ws_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            frame: default_frame(),
            ned_frame: default_ned_frame(),
            trackers: Vec::new(),
            listen_addr: default_listen_addr(),
            ws_port: default_ws_port(),
            time_policy: TimePolicy::default(),
            normalize_orientation: false,
        }
    }
}

impl Config {
    /// Options shared by every tracker handler.
    pub fn handler_options(&self) -> TrackerHandlerOptions {
        TrackerHandlerOptions {
            host: self.host.clone(),
            frame: self.frame.clone(),
            ned_frame: self.ned_frame.clone(),
            normalize_orientation: self.normalize_orientation,
        }
    }
}

/// Return the path to `~/.mocap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mocap").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MOCAP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOCAP_HOST` | `host` |
/// | `MOCAP_FRAME` | `frame` |
/// | `MOCAP_NED_FRAME` | `ned_frame` |
/// | `MOCAP_LISTEN_ADDR` | `listen_addr` |
/// | `MOCAP_WS_PORT` | `ws_port` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MOCAP_HOST") {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("MOCAP_FRAME") {
        cfg.frame = v;
    }
    if let Ok(v) = std::env::var("MOCAP_NED_FRAME") {
        cfg.ned_frame = v;
    }
    if let Ok(v) = std::env::var("MOCAP_LISTEN_ADDR") {
        cfg.listen_addr = v;
    }
    if let Ok(v) = std::env::var("MOCAP_WS_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.ws_port = port;
    }
}

/// Save the config to `path`, creating its directory if necessary.
///
/// A directory created here is restricted to the owner; an existing one is
/// left as it is.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
