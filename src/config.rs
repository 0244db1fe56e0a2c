//! Configuration handling for vipconnect

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "vipconnect.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Config file already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// Everything the wrapper needs to know about its environment.
///
/// Loaded once at startup and passed down explicitly; nothing else reads
/// ambient paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External VPN client executable
    pub client_path: PathBuf,
    /// TOTP generator, either a path or a name looked up on PATH
    pub totp_tool: String,
    /// Arguments placed before the secret when invoking the generator
    pub totp_args: Vec<String>,
    /// Shared-secret file (as written by `vipaccess provision`)
    pub secret_file: PathBuf,
    /// 1-based line holding the secret
    pub secret_line: usize,
    /// 1-based whitespace-delimited field on that line
    pub secret_field: usize,
    /// Menu selection sent at the group prompt
    pub group: String,
    /// Substring of `status` output that means the tunnel is up
    pub connected_marker: String,
    pub prompt_timeout_secs: u64,
    pub lock_file: PathBuf,
    pub notifications: bool,
    pub prompts: PromptConfig,
}

/// Prompts the client prints during a scripted connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub group: String,
    pub username: String,
    pub password: String,
    pub second_password: String,
    pub accept: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            group: "Group:".to_string(),
            username: "Username:".to_string(),
            password: "Password:".to_string(),
            second_password: "Second Password:".to_string(),
            accept: "accept?".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_path: PathBuf::from("/opt/cisco/anyconnect/bin/vpn"),
            totp_tool: "oathtool".to_string(),
            totp_args: vec!["--totp".to_string(), "-b".to_string()],
            secret_file: PathBuf::from("~/.vipaccess"),
            secret_line: 2,
            secret_field: 2,
            group: "1".to_string(),
            connected_marker: "state: Connected".to_string(),
            prompt_timeout_secs: 30,
            lock_file: default_lock_file(),
            notifications: true,
            prompts: PromptConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.expanded())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write defaults to `path`, refusing to clobber an existing file
    pub fn init(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Load config from an explicit path, or from the default locations
    ///
    /// Lookup order: `./vipconnect.toml`, then
    /// `<config dir>/vipconnect/config.toml`, then built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            debug!("Loading config from {}", local_config.display());
            return Self::load(&local_config);
        }

        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("vipconnect").join("config.toml");
            if user_config.exists() {
                debug!("Loading config from {}", user_config.display());
                return Self::load(&user_config);
            }
        }

        info!("No config file found, using defaults");
        Ok(Config::default().expanded())
    }

    /// Resolve `~/` prefixes in path-valued fields
    pub fn expanded(mut self) -> Self {
        self.client_path = expand_home(&self.client_path);
        self.secret_file = expand_home(&self.secret_file);
        self.lock_file = expand_home(&self.lock_file);
        self
    }
}

fn default_lock_file() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vipconnect.lock")
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
