//! Services: features that see every message in a chat, not just commands.
//!
//! A service is switched on or off per chat. Its state lives in the state
//! store under the `service` namespace: CHAT rows hold a chat's own state,
//! GLOBAL rows hold the default for chats that never touched it.

pub mod manager;
pub mod repeat;

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::command::CommandSource;
use crate::message::InboundMessage;

pub use manager::{ServiceManager, SERVICE_NAMESPACE};
pub use repeat::RepeatService;

/// Per-chat string settings of one service.
pub type ServiceConfig = BTreeMap<String, String>;

/// Parse `key` from `config`, falling back to `default` when it is missing
/// or malformed.
pub fn config_value<T: FromStr>(config: &ServiceConfig, key: &str, default: T) -> T {
    config
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub enabled: bool,
    #[serde(default)]
    pub config: ServiceConfig,
}

pub trait BotService: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Settings a chat starts with.
    fn default_config(&self) -> ServiceConfig {
        ServiceConfig::new()
    }

    /// Called for every message in a chat where the service is enabled,
    /// before command handling. Replies go through `source`.
    fn on_message(
        &self,
        source: &CommandSource,
        config: &ServiceConfig,
        message: &InboundMessage,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_value_fallbacks() {
        let mut config = ServiceConfig::new();
        config.insert("threshold".into(), " 4 ".into());
        config.insert("broken".into(), "four".into());

        assert_eq!(config_value(&config, "threshold", 3u32), 4);
        assert_eq!(config_value(&config, "broken", 3u32), 3);
        assert_eq!(config_value(&config, "missing", 3u32), 3);
    }

    #[test]
    fn test_state_decodes_without_config() {
        let state: ServiceState = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert!(state.enabled);
        assert!(state.config.is_empty());
    }
}
