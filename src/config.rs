//! Optional config file loading. Search order: ./annadl.toml, then
//! $XDG_CONFIG_HOME/annadl/config.toml (or ~/.config/annadl/config.toml).
//! Environment variables override file values; CLI flags override both.

use serde::Deserialize;
use std::path::PathBuf;

pub const ENV_SECRET_KEY: &str = "ANNAS_SECRET_KEY";
pub const ENV_DOWNLOAD_PATH: &str = "ANNAS_DOWNLOAD_PATH";
pub const ENV_BASE_URL: &str = "ANNAS_BASE_URL";

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Fast-download API key.
    pub secret_key: Option<String>,
    /// Folder downloads are written to when -o is not set. Paths are relative to CWD.
    pub download_dir: Option<PathBuf>,
    /// Archive origin, e.g. a mirror.
    pub base_url: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Overall request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Dial IPv6 before IPv4.
    pub prefer_ipv6: Option<bool>,
}

impl Config {
    /// Apply environment overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_SECRET_KEY) {
            self.secret_key = Some(key);
        }
        if let Some(dir) = non_empty(ENV_DOWNLOAD_PATH) {
            self.download_dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = Some(url);
        }
    }
}

/// Search order: (1) ./annadl.toml, (2) $XDG_CONFIG_HOME/annadl/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("annadl.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("annadl").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// File config (or defaults) with environment overrides applied.
pub fn load_effective_config() -> Result<Config, String> {
    let mut config = load_config()?.unwrap_or_default();
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}
