use std::sync::Arc;

use crate::command::{
    ArgumentType, BotCommand, CommandDispatcher, CommandInfo, CommandNode, CommandSource,
    RegisterError,
};

/// Lists visible commands, or shows the usage of one.
pub struct HelpCommand {
    prefix: String,
    commands: Vec<CommandInfo>,
}

impl HelpCommand {
    /// `others` are the commands to list; help adds itself in front.
    pub fn new(prefix: &str, others: Vec<CommandInfo>) -> Self {
        let mut help = Self {
            prefix: prefix.to_string(),
            commands: Vec::new(),
        };
        let own = help.info();
        help.commands = std::iter::once(own).chain(others).collect();
        help
    }

    fn render_list(&self) -> String {
        let mut out = String::from("Available commands:\n");
        for command in self.commands.iter().filter(|c| c.visible) {
            out.push_str(&format!(
                "{}{} - {}\n",
                self.prefix, command.name, command.description
            ));
        }
        out.push_str(&format!(
            "\nUse `{}help <command>` to see how to use a command.",
            self.prefix
        ));
        out
    }

    fn render_usage(&self, name: &str) -> String {
        let Some(command) = self.commands.iter().find(|c| c.visible && c.name == name) else {
            return format!(
                "Unknown command: {}\nUse `{}help` to list available commands.",
                name, self.prefix
            );
        };
        let mut out = format!(
            "{}{} - {}\nUsage:\n",
            self.prefix, command.name, command.description
        );
        for line in command.usage.lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("  {}{}\n", self.prefix, line.trim()));
        }
        out.trim_end().to_string()
    }

    fn show_usage(&self, source: &CommandSource, name: &str) {
        source.reply_text(self.render_usage(name));
    }
}

impl BotCommand for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "List commands or show how to use one"
    }

    fn usage(&self) -> &str {
        "help               # list commands\nhelp <command>     # usage of one command"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        let list = Arc::clone(&self);
        let usage = self;
        dispatcher.register(
            CommandNode::literal("help")
                .executes(move |ctx| {
                    ctx.source().reply_text(list.render_list());
                    Ok(())
                })
                .then(
                    CommandNode::argument("command", ArgumentType::Word).executes(move |ctx| {
                        usage.show_usage(ctx.source(), ctx.string("command")?);
                        Ok(())
                    }),
                ),
        )
    }
}
