use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub endpoints: EndpointsConfig,
  pub cache: CacheConfig,
  #[serde(default)]
  pub alerts: AlertsConfig,
  #[serde(default)]
  pub push: Option<PushConfig>,
  /// Listen address for the intercepting front.
  #[serde(default = "default_listen")]
  pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
  /// Base URL requests are forwarded to.
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
  /// Side-effect-free probe used to test session validity.
  #[serde(default = "default_session_probe")]
  pub session_probe: String,
  /// Endpoint returning the full local-record dataset as a JSON array.
  #[serde(default = "default_dataset")]
  pub dataset: String,
  /// Login entry point clients are sent to after an alert click.
  #[serde(default = "default_login")]
  pub login: String,
}

impl Default for EndpointsConfig {
  fn default() -> Self {
    Self {
      session_probe: default_session_probe(),
      dataset: default_dataset(),
      login: default_login(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// URLs eligible for persistent caching, fixed at configuration time.
  pub manifest: Vec<String>,
  /// Directory for the SQLite databases (default: XDG data dir).
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
  /// Whether login alerts may be raised at all.
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for AlertsConfig {
  fn default() -> Self {
    Self { enabled: true }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
  /// Long-poll events endpoint; each completed poll triggers a refresh.
  pub poll_url: String,
}

fn default_listen() -> String {
  "127.0.0.1:8080".to_string()
}

fn default_session_probe() -> String {
  "/api/session".to_string()
}

fn default_dataset() -> String {
  "/api/records".to_string()
}

fn default_login() -> String {
  "/login".to_string()
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cachefront.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cachefront/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cachefront/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("cachefront.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cachefront").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Directory holding the durable caches.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.cache.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|p| p.join("cachefront"))
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}
