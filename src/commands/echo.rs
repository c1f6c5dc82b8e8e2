use std::sync::Arc;

use crate::command::{ArgumentType, BotCommand, CommandDispatcher, CommandNode, RegisterError};

pub struct EchoCommand;

impl BotCommand for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Repeat the given text"
    }

    fn usage(&self) -> &str {
        "echo <text>"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        let usage = format!("Usage: {}", self.usage());
        dispatcher.register(
            CommandNode::literal("echo")
                .executes(move |ctx| {
                    ctx.source().reply_text(usage.as_str());
                    Ok(())
                })
                .then(
                    CommandNode::argument("text", ArgumentType::GreedyString).executes(|ctx| {
                        ctx.source().reply_text(ctx.string("text")?);
                        Ok(())
                    }),
                ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandSource;
    use crate::message::{Address, Platform};

    #[test]
    fn test_echo_verbatim() {
        let mut dispatcher = CommandDispatcher::new();
        Arc::new(EchoCommand).register(&mut dispatcher).unwrap();
        let source = || CommandSource::for_address(Address::new(Platform::OneBot, 2, true));

        let replies = dispatcher.dispatch("echo  spaced   out ", source());
        assert_eq!(replies[0].text_content(), "spaced   out ");

        let replies = dispatcher.dispatch("echo", source());
        assert_eq!(replies[0].text_content(), "Usage: echo <text>");
    }
}
