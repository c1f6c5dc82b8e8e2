use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::state::builtin::Language;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Command prefix; blank falls back to "/"
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Default reply language when nobody has set `lang`
    #[serde(default = "default_language")]
    pub language: Language,
    #[serde(default)]
    pub lanes: LanesConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LanesConfig {
    /// Number of per-chat lanes, rounded up to a power of two
    #[serde(default = "default_lane_count")]
    pub count: usize,
    /// Capacity of the queue between platform receivers and the router
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Sqlite,
    /// Nothing survives a restart
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// Only used by the sqlite backend
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommandsConfig {
    /// Names of built-in commands to leave out
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServicesConfig {
    /// Names of services that cannot be enabled in any chat
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_prefix() -> String {
    "/".to_string()
}

fn default_language() -> Language {
    Language::EnUs
}

fn default_lane_count() -> usize {
    32
}

fn default_inbound_capacity() -> usize {
    1024
}

fn default_db_path() -> PathBuf {
    PathBuf::from("relaybot.db")
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            count: default_lane_count(),
            inbound_capacity: default_inbound_capacity(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            database_path: default_db_path(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;

        if config.prefix.trim().is_empty() {
            config.prefix = default_prefix();
        }
        if config.telegram.enabled && config.telegram.bot_token.trim().is_empty() {
            bail!("[telegram] is enabled but bot_token is empty");
        }

        Ok(config)
    }

    pub fn command_enabled(&self, name: &str) -> bool {
        !self.commands.disabled.iter().any(|d| d == name)
    }

    pub fn any_platform_enabled(&self) -> bool {
        self.telegram.enabled
    }
}
