use std::sync::Arc;

use anyhow::Result;

use crate::command::{
    ArgumentType, BotCommand, CommandDispatcher, CommandNode, CommandSource, RegisterError,
};
use crate::state::{AnyStateDefinition, ScopeType, StateError, StateRegistry, StateService};

/// View and change scoped preferences.
pub struct PrefCommand {
    registry: Arc<StateRegistry>,
    states: Arc<StateService>,
}

impl PrefCommand {
    pub fn new(registry: Arc<StateRegistry>, states: Arc<StateService>) -> Self {
        Self { registry, states }
    }

    fn render_list(&self) -> String {
        if self.registry.is_empty() {
            return "Available preferences:\n(none)".to_string();
        }
        let mut out = String::from("Available preferences:");
        for def in self.registry.list() {
            let info = def.describe();
            out.push_str(&format!("\n- {} ({})", info.name, info.description));
            if !info.suggestions.is_empty() {
                out.push_str(&format!("  values: {}", info.suggestions.join(", ")));
            }
        }
        out
    }

    fn lookup(&self, source: &CommandSource, name: &str) -> Option<&Arc<dyn AnyStateDefinition>> {
        let def = self.registry.get(name);
        if def.is_none() {
            source.reply_text(format!("Unknown state: {}\n{}", name, self.render_list()));
        }
        def
    }

    fn show(&self, source: &CommandSource, name: &str) {
        let Some(def) = self.lookup(source, name) else {
            return;
        };
        let (value, scope) = def.resolve_display(&self.states, source.addr(), source.user_id());
        let origin = match scope {
            Some(scope) => format!("from {}", scope.scope_type),
            None => "default".to_string(),
        };
        source.reply_text(format!("{} = {} ({})", name, value, origin));
    }

    fn set(&self, source: &CommandSource, name: &str, raw: &str) -> Result<()> {
        let Some(def) = self.lookup(source, name) else {
            return Ok(());
        };
        match def.write_raw(&self.states, source.addr(), source.user_id(), raw) {
            Ok((scope, value)) => {
                let mut reply = format!("Set {} = {} (scope={})", name, value, scope.scope_type);
                if let Some(hint) = fallback_hint(def.as_ref(), source, scope.scope_type) {
                    reply.push('\n');
                    reply.push_str(&hint);
                }
                source.reply_text(reply);
                Ok(())
            }
            Err(StateError::Validation(e)) => {
                source.reply_text(format!("Failed to set {}: {}", name, e));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reset(&self, source: &CommandSource, name: &str) -> Result<()> {
        let Some(def) = self.lookup(source, name) else {
            return Ok(());
        };
        match def.clear_at_preferred(&self.states, source.addr(), source.user_id()) {
            Ok((scope, true)) => {
                source.reply_text(format!("Reset {} (scope={})", name, scope.scope_type));
                Ok(())
            }
            Ok((scope, false)) => {
                source.reply_text(format!("{} has no value at scope={}", name, scope.scope_type));
                Ok(())
            }
            Err(StateError::Validation(e)) => {
                source.reply_text(format!("Failed to reset {}: {}", name, e));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Explains why a user-scoped value landed somewhere else.
fn fallback_hint(
    def: &dyn AnyStateDefinition,
    source: &CommandSource,
    written: ScopeType,
) -> Option<String> {
    let preferred = def.describe().preferred_scope;
    if preferred == ScopeType::User && written != ScopeType::User && source.user_id().is_none() {
        Some(format!(
            "Note: no user id on this message, so the value was stored at {} instead of USER.",
            written
        ))
    } else {
        None
    }
}

impl BotCommand for PrefCommand {
    fn name(&self) -> &str {
        "pref"
    }

    fn description(&self) -> &str {
        "View or change preferences"
    }

    fn usage(&self) -> &str {
        "pref                      # list preferences\n\
         pref <state>              # show the current value\n\
         pref <state> <value>      # set a value\n\
         pref <state> reset        # clear your value"
    }

    fn register(self: Arc<Self>, dispatcher: &mut CommandDispatcher) -> Result<(), RegisterError> {
        let list = Arc::clone(&self);
        let show = Arc::clone(&self);
        let reset = Arc::clone(&self);
        let set = self;
        dispatcher.register(
            CommandNode::literal("pref")
                .executes(move |ctx| {
                    ctx.source().reply_text(list.render_list());
                    Ok(())
                })
                .then(
                    CommandNode::argument("state", ArgumentType::Word)
                        .executes(move |ctx| {
                            show.show(ctx.source(), ctx.string("state")?);
                            Ok(())
                        })
                        .then(CommandNode::literal("reset").executes(move |ctx| {
                            reset.reset(ctx.source(), ctx.string("state")?)
                        }))
                        .then(
                            CommandNode::argument("value", ArgumentType::GreedyString).executes(
                                move |ctx| {
                                    let state = ctx.string("state")?;
                                    set.set(ctx.source(), state, ctx.string("value")?)
                                },
                            ),
                        ),
                ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, InboundMessage, Platform, Sender};
    use crate::state::builtin::{Language, LanguagePref, StatusPref};
    use crate::state::MemoryStateStore;

    struct Fixture {
        dispatcher: CommandDispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = StateRegistry::new();
            registry.register(Arc::new(LanguagePref::new(Language::EnUs)));
            registry.register(Arc::new(StatusPref));
            let states = Arc::new(StateService::new(Arc::new(MemoryStateStore::new())));

            let mut dispatcher = CommandDispatcher::new();
            Arc::new(PrefCommand::new(Arc::new(registry), states))
                .register(&mut dispatcher)
                .unwrap();
            Self { dispatcher }
        }

        fn run(&self, line: &str, user: Option<i64>) -> String {
            let addr = Address::new(Platform::Telegram, -100, true);
            let mut builder = InboundMessage::builder(addr);
            if let Some(id) = user {
                builder = builder.sender(Sender::new(Some(id), None, None, false));
            }
            let source = CommandSource::for_inbound(Arc::new(builder.build()));
            self.dispatcher.dispatch(line, source)[0].text_content()
        }
    }

    #[test]
    fn test_list_and_unknown() {
        let fx = Fixture::new();
        let list = fx.run("pref", Some(1));
        assert!(list.contains("- lang ("));
        assert!(list.contains("- status ("));

        let unknown = fx.run("pref volume", Some(1));
        assert!(unknown.starts_with("Unknown state: volume\nAvailable preferences:"));
    }

    #[test]
    fn test_set_show_reset() {
        let fx = Fixture::new();
        assert_eq!(fx.run("pref lang", Some(1)), "lang = en_us (English (US)) (default)");

        assert_eq!(
            fx.run("pref lang zh-CN", Some(1)),
            "Set lang = zh_cn (简体中文（中国大陆）) (scope=USER)"
        );
        assert_eq!(
            fx.run("pref lang", Some(1)),
            "lang = zh_cn (简体中文（中国大陆）) (from USER)"
        );
        // another user in the same chat is unaffected
        assert!(fx.run("pref lang", Some(2)).ends_with("(default)"));

        assert_eq!(fx.run("pref lang reset", Some(1)), "Reset lang (scope=USER)");
        assert!(fx.run("pref lang reset", Some(1)).starts_with("lang has no value"));
    }

    #[test]
    fn test_validation_failure_is_reported() {
        let fx = Fixture::new();
        let out = fx.run("pref lang klingon", Some(1));
        assert!(out.starts_with("Failed to set lang: "), "{}", out);
    }

    #[test]
    fn test_fallback_without_user_id() {
        let fx = Fixture::new();
        let out = fx.run("pref lang zh_tw", None);
        assert!(out.starts_with("Set lang = zh_tw"));
        assert!(out.contains("(scope=CHAT)"));
        assert!(out.contains("no user id"));

        // status is USER only, so it cannot be written at all
        let out = fx.run("pref status busy", None);
        assert!(out.starts_with("Failed to set status: "), "{}", out);
    }
}
