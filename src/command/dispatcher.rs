use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, error};

use super::error::{RegisterError, SyntaxError};
use super::source::CommandSource;
use crate::message::OutboundMessage;

/// Reply sent when an action fails. Details only go to the log.
pub const ACTION_FAILED_NOTICE: &str = "Command failed. Please try again later.";

pub type Action = Arc<dyn Fn(&CommandContext<'_>) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentType {
    /// One whitespace-delimited token.
    Word,
    /// Everything left on the line, verbatim. Must be a leaf.
    GreedyString,
    /// One token parsed as a signed 64-bit integer.
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
}

enum NodeKind {
    Literal(String),
    Argument { name: String, kind: ArgumentType },
}

/// One element of a command tree.
pub struct CommandNode {
    kind: NodeKind,
    action: Option<Action>,
    children: Vec<CommandNode>,
}

impl CommandNode {
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Literal(name.into()),
            action: None,
            children: Vec::new(),
        }
    }

    pub fn argument(name: impl Into<String>, kind: ArgumentType) -> Self {
        Self {
            kind: NodeKind::Argument {
                name: name.into(),
                kind,
            },
            action: None,
            children: Vec::new(),
        }
    }

    pub fn executes<F>(mut self, action: F) -> Self
    where
        F: Fn(&CommandContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn then(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Literal(name) => name,
            NodeKind::Argument { name, .. } => name,
        }
    }

    fn check_greedy_leaves(&self) -> Result<(), RegisterError> {
        if let NodeKind::Argument {
            name,
            kind: ArgumentType::GreedyString,
        } = &self.kind
        {
            if !self.children.is_empty() {
                return Err(RegisterError::GreedyNotLeaf(name.clone()));
            }
        }
        self.children.iter().try_for_each(CommandNode::check_greedy_leaves)
    }
}

/// What an action sees: bound argument values and the reply source.
pub struct CommandContext<'a> {
    source: &'a CommandSource,
    input: &'a str,
    args: HashMap<String, ArgValue>,
}

impl<'a> CommandContext<'a> {
    pub fn source(&self) -> &'a CommandSource {
        self.source
    }

    /// The full command line, prefix already stripped.
    pub fn input(&self) -> &str {
        self.input
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    pub fn string(&self, name: &str) -> Result<&str> {
        match self.args.get(name) {
            Some(ArgValue::Text(text)) => Ok(text),
            Some(ArgValue::Integer(_)) => Err(anyhow!("argument <{}> is not a string", name)),
            None => Err(anyhow!("missing argument <{}>", name)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        match self.args.get(name) {
            Some(ArgValue::Integer(value)) => Ok(*value),
            Some(ArgValue::Text(_)) => Err(anyhow!("argument <{}> is not an integer", name)),
            None => Err(anyhow!("missing argument <{}>", name)),
        }
    }
}

/// The matched action plus its bound arguments.
pub struct ParsedCommand<'a> {
    action: &'a Action,
    args: HashMap<String, ArgValue>,
}

impl ParsedCommand<'_> {
    pub fn args(&self) -> &HashMap<String, ArgValue> {
        &self.args
    }
}

/// Forest of command trees. Built at startup, read-only afterwards.
#[derive(Default)]
pub struct CommandDispatcher {
    roots: Vec<CommandNode>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command tree. The root must be a literal with a fresh name.
    pub fn register(&mut self, root: CommandNode) -> Result<(), RegisterError> {
        let name = match &root.kind {
            NodeKind::Literal(name) => name,
            NodeKind::Argument { name, .. } => {
                return Err(RegisterError::NotLiteral(name.clone()));
            }
        };
        if self.contains(name) {
            return Err(RegisterError::Duplicate(name.clone()));
        }
        root.check_greedy_leaves()?;
        self.roots.push(root);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roots.iter().any(|r| r.name() == name)
    }

    pub fn root_names(&self) -> Vec<&str> {
        self.roots.iter().map(CommandNode::name).collect()
    }

    /// Walk the forest along `line`. Literal children win over arguments;
    /// both are tried in registration order and the first match is kept.
    pub fn parse<'a>(&'a self, line: &str) -> Result<ParsedCommand<'a>, SyntaxError> {
        let mut args = HashMap::new();
        let mut children: &'a [CommandNode] = &self.roots;
        let mut current: Option<&'a CommandNode> = None;
        let mut pos = skip_whitespace(line, 0);

        loop {
            if pos >= line.len() {
                return match current.and_then(|node| node.action.as_ref()) {
                    Some(action) => Ok(ParsedCommand { action, args }),
                    None if current.is_none() => Err(SyntaxError::at(line, pos, "Unknown command")),
                    None => Err(SyntaxError::at(line, pos, "Incomplete command")),
                };
            }

            let token_end = line[pos..]
                .find(char::is_whitespace)
                .map_or(line.len(), |i| pos + i);
            let token = &line[pos..token_end];

            let literal = children
                .iter()
                .find(|child| matches!(&child.kind, NodeKind::Literal(name) if name == token));

            let (node, end) = match literal {
                Some(node) => (node, token_end),
                None => match match_argument(children, line, pos, token_end, &mut args) {
                    Ok(found) => found,
                    Err(reason) => {
                        let message = reason.unwrap_or_else(|| {
                            if current.is_none() {
                                "Unknown command".to_string()
                            } else {
                                "Incorrect argument for command".to_string()
                            }
                        });
                        return Err(SyntaxError::at(line, pos, message));
                    }
                },
            };

            current = Some(node);
            children = &node.children;
            pos = skip_whitespace(line, end);
        }
    }

    /// Parse and run `line`, returning every reply the action produced.
    /// Syntax errors become a caret-annotated reply; action failures and
    /// panics are logged and become a generic notice.
    pub fn dispatch(&self, line: &str, source: CommandSource) -> Vec<OutboundMessage> {
        match self.parse(line) {
            Err(err) => {
                debug!("Syntax error from {}: {}", source.addr(), err);
                source.reply_text(err.render());
            }
            Ok(parsed) => {
                let ctx = CommandContext {
                    source: &source,
                    input: line,
                    args: parsed.args,
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| (parsed.action)(&ctx)));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("{:?}", e)),
                    Err(payload) => Some(format!("panic: {}", panic_message(payload.as_ref()))),
                };
                if let Some(detail) = failure {
                    error!("Command '{}' from {} failed: {}", line, source.addr(), detail);
                    source.reply_text(ACTION_FAILED_NOTICE);
                }
            }
        }
        source.into_replies()
    }
}

/// Try argument children in order. `Err(Some(_))` carries the first
/// type-specific failure, `Err(None)` means no argument child exists.
fn match_argument<'a>(
    children: &'a [CommandNode],
    line: &str,
    pos: usize,
    token_end: usize,
    args: &mut HashMap<String, ArgValue>,
) -> Result<(&'a CommandNode, usize), Option<String>> {
    let token = &line[pos..token_end];
    let mut failure = None;

    for child in children {
        let NodeKind::Argument { name, kind } = &child.kind else {
            continue;
        };
        match kind {
            ArgumentType::Word => {
                args.insert(name.clone(), ArgValue::Text(token.to_string()));
                return Ok((child, token_end));
            }
            ArgumentType::GreedyString => {
                args.insert(name.clone(), ArgValue::Text(line[pos..].to_string()));
                return Ok((child, line.len()));
            }
            ArgumentType::Integer => match token.parse::<i64>() {
                Ok(value) => {
                    args.insert(name.clone(), ArgValue::Integer(value));
                    return Ok((child, token_end));
                }
                Err(_) => {
                    failure.get_or_insert_with(|| format!("Invalid integer '{}'", token));
                }
            },
        }
    }
    Err(failure)
}

fn skip_whitespace(line: &str, from: usize) -> usize {
    line[from..]
        .find(|c: char| !c.is_whitespace())
        .map_or(line.len(), |i| from + i)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
