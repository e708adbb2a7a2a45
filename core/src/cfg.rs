use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifier used to compute per-app configuration directories.
#[derive(Clone, Copy)]
pub struct AppId {
    /// Reverse-DNS style qualifier, e.g. `"com"`.
    pub qualifier: &'static str,
    /// Organization or vendor name, e.g. `"local"`.
    pub organization: &'static str,
    /// Application name, e.g. `"dispatch"`.
    pub application: &'static str,
}

/// Client configuration persisted to `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tracing level to use if `RUST_LOG` is not set (e.g. `"info"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the job backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Period between status fetches of a tracked job (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Period between full job-list refreshes (ms).
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// How many posts to request from the feed.
    #[serde(default = "default_posts_limit")]
    pub posts_limit: u32,
    /// How many trailing log lines a job view shows.
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,
    /// Transport-level timeout for a single request (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_log_level() -> String { "info".to_string() }
fn default_backend_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_poll_interval_ms() -> u64 { 1_500 }
fn default_sync_interval_ms() -> u64 { 5_000 }
fn default_posts_limit() -> u32 { 100 }
fn default_log_tail() -> usize { 30 }
fn default_request_timeout_ms() -> u64 { 15_000 }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend_url: default_backend_url(),
            poll_interval_ms: default_poll_interval_ms(),
            sync_interval_ms: default_sync_interval_ms(),
            posts_limit: default_posts_limit(),
            log_tail: default_log_tail(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Config {
    /// Poll period as a [`Duration`].
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms.max(1)) }
    /// Job-list refresh period as a [`Duration`].
    pub fn sync_interval(&self) -> Duration { Duration::from_millis(self.sync_interval_ms.max(1)) }
    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }
}

/// Return the configuration directory for this app, creating it if needed.
pub fn config_dir(app: &AppId) -> Result<PathBuf> {
    let pd = ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))?;
    let dir = pd.config_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

/// Return the data directory (local state store) for this app, creating it if needed.
pub fn data_dir(app: &AppId) -> Result<PathBuf> {
    let pd = ProjectDirs::from(app.qualifier, app.organization, app.application)
        .ok_or_else(|| anyhow::anyhow!("failed to resolve ProjectDirs"))?;
    let dir = pd.data_dir().to_path_buf();
    fs::create_dir_all(&dir).with_context(|| format!("create data dir {}", dir.display()))?;
    Ok(dir)
}

/// Load `config.toml` from the app config dir or create a default one.
pub fn load_or_init(app: &AppId) -> Result<Config> {
    load_or_init_in(config_dir(app)?)
}

/// Same as [`load_or_init`] but rooted at an explicit directory.
pub fn load_or_init_in<P: AsRef<Path>>(dir: P) -> Result<Config> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("create config dir {}", dir.display()))?;
    let path = dir.join("config.toml");
    if path.exists() {
        let txt = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&txt)
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    } else {
        let cfg = Config::default();
        save_config(&path, &cfg)?;
        Ok(cfg)
    }
}

fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = toml::to_string_pretty(cfg)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_or_init_in(dir.path()).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(dir.path().join("config.toml").exists());
        assert_eq!(cfg.poll_interval(), Duration::from_millis(1_500));
        assert_eq!(cfg.sync_interval(), Duration::from_millis(5_000));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "backend_url = \"http://example:9000\"\n").unwrap();
        let cfg = load_or_init_in(dir.path()).unwrap();
        assert_eq!(cfg.backend_url, "http://example:9000");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_tail, 30);
    }
}
