//! Daemon configuration.
//!
//! Values are layered: built-in defaults, then the TOML config file, then
//! `CLIPNEST__SECTION__KEY` environment variables. The resolved
//! [`ClipnestConfig`] is passed to constructors explicitly.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use config::{Config, Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};

use crate::history::CapacityPolicy;

pub const APP_NAME: &str = "clipnest";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipnestConfig {
    pub history: HistoryConfig,
    pub paths: PathsConfig,
    pub ipc: IpcConfig,
    pub clipboard: ClipboardConfig,
}

impl ClipnestConfig {
    /// Reject values the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.history.max_entries == 0 {
            bail!("history.max_entries must be at least 1");
        }
        if self.history.poll_interval_ms == 0 {
            bail!("history.poll_interval_ms must be positive");
        }
        if self.ipc.max_frame_bytes == 0 {
            bail!("ipc.max_frame_bytes must be positive");
        }
        if self.ipc.outbound_queue == 0 {
            bail!("ipc.outbound_queue must be positive");
        }
        if self.ipc.write_timeout_ms == 0 {
            bail!("ipc.write_timeout_ms must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Capacity of the in-memory history.
    pub max_entries: usize,
    /// Whether pinned clips count toward `max_entries`.
    pub pinned_counts_toward_capacity: bool,
    /// Clipboard polling period.
    pub poll_interval_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            pinned_counts_toward_capacity: true,
            poll_interval_ms: 500,
        }
    }
}

impl HistoryConfig {
    pub fn capacity_policy(&self) -> CapacityPolicy {
        if self.pinned_counts_toward_capacity {
            CapacityPolicy::CountAll
        } else {
            CapacityPolicy::UnpinnedOnly
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Optional path overrides. Unset paths use platform defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub socket: Option<String>,
    pub ledger: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Deadline for writing one frame to a client.
    pub write_timeout_ms: u64,
    /// Close connections that send nothing for this long. 0 disables it.
    pub idle_timeout_secs: u64,
    /// Longest accepted request line.
    pub max_frame_bytes: usize,
    /// Frames queued per connection before it is considered dead.
    pub outbound_queue: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 2000,
            idle_timeout_secs: 0,
            max_frame_bytes: 1024 * 1024,
            outbound_queue: 64,
        }
    }
}

impl IpcConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub backend: ClipboardBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardBackend {
    /// The operating system clipboard.
    #[default]
    System,
    /// A process-local clipboard, for headless runs.
    Memory,
}

/// Resolved filesystem locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub socket: PathBuf,
    pub ledger: PathBuf,
}

impl AppPaths {
    /// Locate the config file and default directories.
    pub fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        let data_dir = default_data_dir()?;
        Ok(Self {
            config_file,
            ledger: data_dir.join("clipnest.db"),
            data_dir,
            socket: default_socket_path(),
        })
    }

    pub fn apply_overrides(mut self, cfg: &ClipnestConfig) -> Result<Self> {
        if let Some(ref socket) = cfg.paths.socket {
            self.socket = expand_str_path(socket)?;
        }
        if let Some(ref ledger) = cfg.paths.ledger {
            self.ledger = expand_str_path(ledger)?;
        }
        Ok(self)
    }
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config: {}, socket: {}, ledger: {}",
            self.config_file.display(),
            self.socket.display(),
            self.ledger.display()
        )
    }
}

/// Load the config file at `path`, writing the defaults first if it does not
/// exist and `create_missing` is set.
pub fn load_or_init_config(path: &Path, create_missing: bool) -> Result<ClipnestConfig> {
    if create_missing && !path.exists() {
        write_default_config(path)?;
    }
    load_config(path, None)
}

/// Build the layered config. `env_source` replaces the process environment,
/// which tests use to exercise overrides.
pub fn load_config(path: &Path, env_source: Option<Map<String, String>>) -> Result<ClipnestConfig> {
    let defaults = HistoryConfig::default();
    let ipc = IpcConfig::default();

    let built = Config::builder()
        .set_default("history.max_entries", defaults.max_entries as i64)?
        .set_default(
            "history.pinned_counts_toward_capacity",
            defaults.pinned_counts_toward_capacity,
        )?
        .set_default("history.poll_interval_ms", defaults.poll_interval_ms as i64)?
        .set_default("ipc.write_timeout_ms", ipc.write_timeout_ms as i64)?
        .set_default("ipc.idle_timeout_secs", ipc.idle_timeout_secs as i64)?
        .set_default("ipc.max_frame_bytes", ipc.max_frame_bytes as i64)?
        .set_default("ipc.outbound_queue", ipc.outbound_queue as i64)?
        .set_default("clipboard.backend", "system")?
        .add_source(File::from(path).format(FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix(env_prefix().as_str())
                .separator("__")
                .try_parsing(true)
                .source(env_source),
        )
        .build()
        .with_context(|| format!("loading config from {}", path.display()))?;

    let config: ClipnestConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = ClipnestConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Unset [paths] entries fall back to platform defaults.\n");
    buffer.push('\n');
    buffer
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// `$XDG_RUNTIME_DIR/clipnest.sock`, else a per-user path under `/tmp`.
pub fn default_socket_path() -> PathBuf {
    if let Some(dir) = env::var_os("XDG_RUNTIME_DIR").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join(format!("{APP_NAME}.sock"));
    }
    let user = env::var("USER").unwrap_or_else(|_| "user".to_string());
    env::temp_dir().join(format!("{APP_NAME}-{user}.sock"))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ClipnestConfig::default();
        assert_eq!(config.history.max_entries, 50);
        assert_eq!(config.history.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.history.capacity_policy(), CapacityPolicy::CountAll);
        assert_eq!(config.ipc.idle_timeout(), None);
        assert_eq!(config.ipc.write_timeout(), Duration::from_secs(2));
        assert_eq!(config.clipboard.backend, ClipboardBackend::System);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_written_default_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_init_config(&path, true).unwrap();
        assert!(path.exists());
        assert_eq!(config.history.max_entries, 50);

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Configuration for clipnest"));
        assert!(body.contains("[history]"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[history]
max_entries = 3
pinned_counts_toward_capacity = false

[paths]
socket = "/run/test/clipnest.sock"

[clipboard]
backend = "memory"
"#,
        )
        .unwrap();

        let config = load_config(&path, Some(Map::new())).unwrap();
        assert_eq!(config.history.max_entries, 3);
        assert_eq!(config.history.poll_interval_ms, 500);
        assert_eq!(
            config.history.capacity_policy(),
            CapacityPolicy::UnpinnedOnly
        );
        assert_eq!(config.clipboard.backend, ClipboardBackend::Memory);
        assert_eq!(
            config.paths.socket.as_deref(),
            Some("/run/test/clipnest.sock")
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[history]\nmax_entries = 3\n").unwrap();

        let mut env = Map::new();
        env.insert("CLIPNEST__HISTORY__MAX_ENTRIES".to_string(), "7".to_string());
        env.insert("CLIPNEST__IPC__IDLE_TIMEOUT_SECS".to_string(), "30".to_string());

        let config = load_config(&path, Some(env)).unwrap();
        assert_eq!(config.history.max_entries, 7);
        assert_eq!(config.ipc.idle_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[history]\nmax_entries = 0\n").unwrap();

        let err = load_config(&path, Some(Map::new())).unwrap_err();
        assert!(err.to_string().contains("max_entries"));
    }

    #[test]
    fn test_path_overrides_are_expanded() {
        let config = ClipnestConfig {
            paths: PathsConfig {
                socket: Some("/tmp/custom.sock".to_string()),
                ledger: Some("/var/lib/clipnest/pins.db".to_string()),
            },
            ..Default::default()
        };
        let paths = AppPaths::discover(Some(PathBuf::from("/etc/clipnest/config.toml")))
            .unwrap()
            .apply_overrides(&config)
            .unwrap();
        assert_eq!(paths.socket, PathBuf::from("/tmp/custom.sock"));
        assert_eq!(paths.ledger, PathBuf::from("/var/lib/clipnest/pins.db"));
        assert_eq!(paths.config_file, PathBuf::from("/etc/clipnest/config.toml"));
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(env_prefix(), "CLIPNEST");
    }
}
