pub mod coin;
pub mod dice;
pub mod echo;
pub mod help;
pub mod pref;
pub mod service;

use std::sync::Arc;

use tracing::info;

use crate::command::{BotCommand, CommandInfo};
use crate::config::Config;
use crate::service::ServiceManager;
use crate::state::{StateRegistry, StateService};

pub use coin::CoinCommand;
pub use dice::DiceCommand;
pub use echo::EchoCommand;
pub use help::HelpCommand;
pub use pref::PrefCommand;
pub use service::ServiceCommand;

/// The built-in command set, minus anything disabled in `[commands]`.
/// `help` comes first and lists the others.
pub fn builtin(
    config: &Config,
    states: Arc<StateService>,
    registry: Arc<StateRegistry>,
    services: Arc<ServiceManager>,
) -> Vec<Arc<dyn BotCommand>> {
    let mut commands: Vec<Arc<dyn BotCommand>> = vec![
        Arc::new(EchoCommand),
        Arc::new(DiceCommand),
        Arc::new(CoinCommand),
        Arc::new(PrefCommand::new(registry, states)),
        Arc::new(ServiceCommand::new(services)),
    ];
    commands.retain(|command| {
        let enabled = config.command_enabled(command.name());
        if !enabled {
            info!("Command disabled by config: {}", command.name());
        }
        enabled
    });

    if config.command_enabled("help") {
        let infos: Vec<CommandInfo> = commands.iter().map(|c| c.info()).collect();
        commands.insert(0, Arc::new(HelpCommand::new(&config.prefix, infos)));
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryStateStore, StateStore};

    fn build(config: &Config) -> Vec<Arc<dyn BotCommand>> {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let states = Arc::new(StateService::new(Arc::clone(&store)));
        let services = Arc::new(ServiceManager::new(store, Vec::new()));
        builtin(config, states, Arc::new(StateRegistry::new()), services)
    }

    #[test]
    fn test_builtin_respects_disabled_list() {
        let config = Config::parse("[commands]\ndisabled = [\"coin\", \"help\"]\n").unwrap();
        let commands = build(&config);

        let names: Vec<&str> = commands.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["echo", "dice", "pref", "service"]);
    }

    #[test]
    fn test_help_listed_first() {
        let config = Config::parse("").unwrap();
        let commands = build(&config);

        let names: Vec<&str> = commands.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["help", "echo", "dice", "coin", "pref", "service"]);
    }
}
