//! Process-wide engine configuration, loaded once and bounds-checked.

use crate::error::Error;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// User agent used when the configured one is empty.
pub const DEFAULT_USER_AGENT: &str = "IDM/1.0";

/// Global configuration for the download engine.
///
/// Loaded from `~/.config/idm/config.toml` by the CLI (`load_or_init`), or
/// constructed directly by embedders. Out-of-range values are rejected by
/// `validate` with a descriptive message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of simultaneously live downloads (1..=20).
    pub max_concurrent_downloads: usize,
    /// Minimum total size, in bytes, before a download is split into
    /// parallel ranges (>= 1024).
    pub chunk_size_threshold: u64,
    /// Bandwidth ceiling in bytes/sec shared by a download's chunks.
    /// 0 means unlimited.
    pub max_speed: u64,
    /// Per-chunk retry budget for network errors (0..=10).
    pub retry_attempts: u32,
    /// User-Agent header sent on every request. Empty falls back to
    /// `DEFAULT_USER_AGENT`.
    pub user_agent: String,
    /// Timeout in seconds for HEAD requests and GET establishment (5..=300).
    /// Does not bound total transfer time.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            chunk_size_threshold: 1024 * 1024,
            max_speed: 0,
            retry_attempts: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Checks every bound from the configuration surface. Returns the first
    /// violation as a `Validation` error.
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=20).contains(&self.max_concurrent_downloads) {
            return Err(Error::Validation(format!(
                "max_concurrent_downloads must be in 1..=20, got {}",
                self.max_concurrent_downloads
            )));
        }
        if self.chunk_size_threshold < 1024 {
            return Err(Error::Validation(format!(
                "chunk_size_threshold must be at least 1024 bytes, got {}",
                self.chunk_size_threshold
            )));
        }
        if self.retry_attempts > 10 {
            return Err(Error::Validation(format!(
                "retry_attempts must be in 0..=10, got {}",
                self.retry_attempts
            )));
        }
        if !(5..=300).contains(&self.timeout_secs) {
            return Err(Error::Validation(format!(
                "timeout_secs must be in 5..=300, got {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }

    /// The configured User-Agent, or the fallback when empty.
    pub fn effective_user_agent(&self) -> &str {
        let ua = self.user_agent.trim();
        if ua.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            ua
        }
    }

    /// HEAD / GET-establishment timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Path of the config file under the XDG config home.
pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("idm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// Loaded values are bounds-checked before being returned.
pub fn load_or_init() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = Config::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_concurrent_downloads, 3);
        assert_eq!(cfg.chunk_size_threshold, 1024 * 1024);
        assert_eq!(cfg.max_speed, 0);
        assert_eq!(cfg.retry_attempts, 3);
        assert_eq!(cfg.timeout_secs, 30);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.max_concurrent_downloads = 0;
        assert!(cfg.validate().is_err());
        cfg.max_concurrent_downloads = 21;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.chunk_size_threshold = 1023;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.retry_attempts = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.timeout_secs = 4;
        assert!(cfg.validate().is_err());
        cfg.timeout_secs = 301;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_user_agent_falls_back() {
        let mut cfg = Config::default();
        cfg.user_agent = "  ".to_string();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.effective_user_agent(), DEFAULT_USER_AGENT);

        cfg.user_agent = "custom/2.0".to_string();
        assert_eq!(cfg.effective_user_agent(), "custom/2.0");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = Config::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.max_concurrent_downloads, cfg.max_concurrent_downloads);
        assert_eq!(parsed.chunk_size_threshold, cfg.chunk_size_threshold);
        assert_eq!(parsed.timeout_secs, cfg.timeout_secs);
        assert_eq!(parsed.user_agent, cfg.user_agent);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("max_concurrent_downloads = 5").unwrap();
        assert_eq!(cfg.max_concurrent_downloads, 5);
        assert_eq!(cfg.retry_attempts, 3);
        assert!(cfg.validate().is_ok());
    }
}
