//! Bot configuration: TOML file + CLI overrides.

use advent_core::{AdventError, AdventResult, SessionConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub bot: BotSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// `[bot]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BotSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// `[session]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_save_path")]
    pub save_path: String,
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 0 waits for the save dialog forever.
    #[serde(default = "default_save_timeout_secs")]
    pub save_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            save_path: default_save_path(),
            executable: default_executable(),
            args: Vec::new(),
            save_timeout_secs: default_save_timeout_secs(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:4480".to_string()
}
fn default_timeout_secs() -> u64 {
    1800
}
fn default_save_path() -> String {
    "~/.advent/saves".to_string()
}
fn default_executable() -> String {
    "/usr/bin/advent".to_string()
}
fn default_save_timeout_secs() -> u64 {
    30
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub executable: Option<String>,
    pub save_path: Option<String>,
    pub timeout_secs: Option<u64>,
    pub save_timeout_secs: Option<u64>,
    pub console: bool,
}

/// Resolved bot configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub listen: SocketAddr,
    pub console: bool,
    pub session: SessionConfig,
}

impl BotConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> AdventResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, overrides)
    }

    fn resolve(file_config: ConfigFile, overrides: Overrides) -> AdventResult<Self> {
        let session = file_config.session;

        let listen_str = overrides.listen.unwrap_or(file_config.bot.listen);
        let listen = listen_str
            .parse::<SocketAddr>()
            .map_err(|e| {
                AdventError::Config(format!("invalid listen address {listen_str:?}: {e}"))
            })?;

        let timeout_secs = overrides.timeout_secs.unwrap_or(session.timeout_secs);
        if timeout_secs == 0 {
            return Err(AdventError::Config("session timeout must be positive".into()));
        }
        let save_timeout_secs = overrides
            .save_timeout_secs
            .unwrap_or(session.save_timeout_secs);
        let save_path = overrides.save_path.unwrap_or(session.save_path);
        let executable = overrides.executable.unwrap_or(session.executable);

        Ok(Self {
            listen,
            console: overrides.console,
            session: SessionConfig {
                session_timeout: Duration::from_secs(timeout_secs),
                save_path: expand_tilde_str(&save_path),
                executable: expand_tilde_str(&executable),
                args: session.args,
                save_timeout: (save_timeout_secs > 0)
                    .then(|| Duration::from_secs(save_timeout_secs)),
            },
        })
    }
}

fn parse(content: &str) -> AdventResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| AdventError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
