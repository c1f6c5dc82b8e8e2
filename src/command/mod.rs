pub mod dispatcher;
pub mod error;
pub mod source;

use std::sync::Arc;

use tracing::{info, warn};

pub use dispatcher::{
    ArgValue, ArgumentType, CommandContext, CommandDispatcher, CommandNode, ACTION_FAILED_NOTICE,
};
pub use error::{RegisterError, SyntaxError};
pub use source::CommandSource;

/// A chat command. Each one contributes a single root literal to the
/// shared dispatcher.
pub trait BotCommand: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Usage lines without the prefix, e.g. `dice [count]`.
    fn usage(&self) -> &str;

    /// Hidden commands still run but are left out of `help`.
    fn visible(&self) -> bool {
        true
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError>;

    fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            usage: self.usage().to_string(),
            visible: self.visible(),
        }
    }
}

/// Static description of a command, used for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub usage: String,
    pub visible: bool,
}

/// Register every command in order. A command that fails to register is
/// logged and skipped; the rest still load.
pub fn build_dispatcher(commands: &[Arc<dyn BotCommand>]) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::new();
    for command in commands {
        let name = command.name().to_string();
        match Arc::clone(command).register(&mut dispatcher) {
            Ok(()) => info!("Registered command: {}", name),
            Err(e) => warn!("Failed to register command {}: {}", name, e),
        }
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, Platform};

    struct Fixed {
        name: &'static str,
        reply: &'static str,
    }

    impl BotCommand for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed reply"
        }

        fn usage(&self) -> &str {
            self.name
        }

        fn register(
            self: Arc<Self>,
            dispatcher: &mut CommandDispatcher,
        ) -> Result<(), RegisterError> {
            let reply = self.reply;
            dispatcher.register(CommandNode::literal(self.name).executes(move |ctx| {
                ctx.source().reply_text(reply);
                Ok(())
            }))
        }
    }

    #[test]
    fn test_duplicate_command_is_skipped() {
        let commands: Vec<Arc<dyn BotCommand>> = vec![
            Arc::new(Fixed { name: "ping", reply: "pong" }),
            Arc::new(Fixed { name: "ping", reply: "second" }),
            Arc::new(Fixed { name: "hi", reply: "hello" }),
        ];
        let dispatcher = build_dispatcher(&commands);
        assert_eq!(dispatcher.root_names(), vec!["ping", "hi"]);

        let source = CommandSource::for_address(Address::new(Platform::Telegram, 1, false));
        let replies = dispatcher.dispatch("ping", source);
        assert_eq!(replies[0].text_content(), "pong");
    }
}
