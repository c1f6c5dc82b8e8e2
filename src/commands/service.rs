use std::sync::Arc;

use anyhow::Result;

use crate::command::{
    ArgumentType, BotCommand, CommandDispatcher, CommandNode, CommandSource, RegisterError,
};
use crate::service::ServiceManager;
use crate::state::StateError;

/// Switch services on and off for the current chat.
pub struct ServiceCommand {
    services: Arc<ServiceManager>,
}

impl ServiceCommand {
    pub fn new(services: Arc<ServiceManager>) -> Self {
        Self { services }
    }

    fn render_list(&self, source: &CommandSource) -> String {
        let services = self.services.list();
        if services.is_empty() {
            return "Services in this chat:\n(none)".to_string();
        }
        let mut out = String::from("Services in this chat:");
        for service in services {
            let enabled = self
                .services
                .state_of(source.addr(), service.name())
                .map(|state| state.enabled)
                .unwrap_or(false);
            out.push_str(&format!(
                "\n- {} [{}] ({})",
                service.name(),
                if enabled { "ENABLED" } else { "DISABLED" },
                service.description()
            ));
        }
        out
    }

    /// Replies for unknown names. `true` when the service exists.
    fn known(&self, source: &CommandSource, name: &str) -> bool {
        if self.services.get(name).is_some() {
            return true;
        }
        source.reply_text(format!("Unknown service: {}\n{}", name, self.render_list(source)));
        false
    }

    fn toggle(&self, source: &CommandSource, name: &str, enabled: bool) -> Result<()> {
        if !self.known(source, name) {
            return Ok(());
        }
        match self.services.set_enabled(source.addr(), name, enabled) {
            Ok(_) => {
                source.reply_text(format!(
                    "Service {} is now {} in this chat.",
                    name,
                    if enabled { "ENABLED" } else { "DISABLED" }
                ));
                Ok(())
            }
            Err(e) => self.report(source, name, e),
        }
    }

    fn show_config(&self, source: &CommandSource, name: &str, key: &str) -> Result<()> {
        if !self.known(source, name) {
            return Ok(());
        }
        match self.services.state_of(source.addr(), name) {
            Ok(state) => {
                let value = state.config.get(key).map_or("(unset)", String::as_str);
                source.reply_text(format!("{}.{} = {}", name, key, value));
                Ok(())
            }
            Err(e) => self.report(source, name, e),
        }
    }

    fn set_config(&self, source: &CommandSource, name: &str, key: &str, value: &str) -> Result<()> {
        if !self.known(source, name) {
            return Ok(());
        }
        let value = value.trim();
        let update = if value == "reset" { None } else { Some(value) };
        match self.services.set_config(source.addr(), name, key, update) {
            Ok(_) => {
                source.reply_text(match update {
                    Some(value) => format!("Updated {}.{} = {} in this chat.", name, key, value),
                    None => format!("Removed {}.{} in this chat.", name, key),
                });
                Ok(())
            }
            Err(e) => self.report(source, name, e),
        }
    }

    fn report(&self, source: &CommandSource, name: &str, e: StateError) -> Result<()> {
        match e {
            StateError::Validation(e) => {
                source.reply_text(format!("Failed to update {}: {}", name, e));
                Ok(())
            }
            other => Err(other.into()),
        }
    }
}

impl BotCommand for ServiceCommand {
    fn name(&self) -> &str {
        "service"
    }

    fn description(&self) -> &str {
        "Manage services for this chat"
    }

    fn usage(&self) -> &str {
        "service list                          # services and their state here\n\
         service enable <service>              # turn a service on here\n\
         service disable <service>             # turn a service off here\n\
         service config <service> <key>        # show a setting\n\
         service config <service> <key> <value> # change a setting (reset removes it)"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        let list = Arc::clone(&self);
        let listing = Arc::clone(&self);
        let enable = Arc::clone(&self);
        let disable = Arc::clone(&self);
        let show = Arc::clone(&self);
        let set = self;
        dispatcher.register(
            CommandNode::literal("service")
                .executes(move |ctx| {
                    ctx.source().reply_text(list.render_list(ctx.source()));
                    Ok(())
                })
                .then(CommandNode::literal("list").executes(move |ctx| {
                    ctx.source().reply_text(listing.render_list(ctx.source()));
                    Ok(())
                }))
                .then(CommandNode::literal("enable").then(
                    CommandNode::argument("service", ArgumentType::Word).executes(move |ctx| {
                        enable.toggle(ctx.source(), ctx.string("service")?, true)
                    }),
                ))
                .then(CommandNode::literal("disable").then(
                    CommandNode::argument("service", ArgumentType::Word).executes(move |ctx| {
                        disable.toggle(ctx.source(), ctx.string("service")?, false)
                    }),
                ))
                .then(
                    CommandNode::literal("config").then(
                        CommandNode::argument("service", ArgumentType::Word).then(
                            CommandNode::argument("key", ArgumentType::Word)
                                .executes(move |ctx| {
                                    show.show_config(
                                        ctx.source(),
                                        ctx.string("service")?,
                                        ctx.string("key")?,
                                    )
                                })
                                .then(
                                    CommandNode::argument("value", ArgumentType::GreedyString)
                                        .executes(move |ctx| {
                                            set.set_config(
                                                ctx.source(),
                                                ctx.string("service")?,
                                                ctx.string("key")?,
                                                ctx.string("value")?,
                                            )
                                        }),
                                ),
                        ),
                    ),
                ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, Platform};
    use crate::service::RepeatService;
    use crate::state::MemoryStateStore;

    fn dispatcher() -> CommandDispatcher {
        let mut services = ServiceManager::new(Arc::new(MemoryStateStore::new()), Vec::new());
        services.register(Arc::new(RepeatService::new()));
        let mut dispatcher = CommandDispatcher::new();
        Arc::new(ServiceCommand::new(Arc::new(services)))
            .register(&mut dispatcher)
            .unwrap();
        dispatcher
    }

    fn run(dispatcher: &CommandDispatcher, chat: i64, line: &str) -> String {
        let source = CommandSource::for_address(Address::new(Platform::Telegram, chat, true));
        dispatcher.dispatch(line, source)[0].text_content()
    }

    #[test]
    fn test_enable_and_disable_per_chat() {
        let dispatcher = dispatcher();
        assert!(run(&dispatcher, 1, "service list").contains("- repeat [DISABLED]"));

        assert_eq!(
            run(&dispatcher, 1, "service enable repeat"),
            "Service repeat is now ENABLED in this chat."
        );
        assert!(run(&dispatcher, 1, "service").contains("- repeat [ENABLED]"));
        assert!(run(&dispatcher, 2, "service list").contains("- repeat [DISABLED]"));

        run(&dispatcher, 1, "service disable repeat");
        assert!(run(&dispatcher, 1, "service list").contains("- repeat [DISABLED]"));
    }

    #[test]
    fn test_config_get_set_reset() {
        let dispatcher = dispatcher();
        assert_eq!(run(&dispatcher, 1, "service config repeat threshold"), "repeat.threshold = 3");
        run(&dispatcher, 1, "service config repeat threshold 5");
        assert_eq!(run(&dispatcher, 1, "service config repeat threshold"), "repeat.threshold = 5");
        assert_eq!(
            run(&dispatcher, 1, "service config repeat threshold reset"),
            "Removed repeat.threshold in this chat."
        );
        assert_eq!(
            run(&dispatcher, 1, "service config repeat threshold"),
            "repeat.threshold = (unset)"
        );
    }

    #[test]
    fn test_unknown_service() {
        let dispatcher = dispatcher();
        let out = run(&dispatcher, 1, "service enable weather");
        assert!(out.starts_with("Unknown service: weather\nServices in this chat:"));
    }
}
