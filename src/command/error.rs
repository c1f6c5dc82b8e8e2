use thiserror::Error;

/// No path through the command tree matches the input.
/// `cursor` is a character offset into `input`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {cursor}: {}<--[HERE]", consumed(.input, .cursor))]
pub struct SyntaxError {
    pub input: String,
    pub cursor: usize,
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn at(input: &str, byte_offset: usize, message: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            cursor: input[..byte_offset].chars().count(),
            message: message.into(),
        }
    }

    /// User-facing reply: the input, a caret under the failing character, and
    /// the description.
    pub fn render(&self) -> String {
        let width = self.cursor.min(self.input.chars().count());
        format!(
            "Command syntax error:\n{}\n{}^\n{}",
            self.input,
            " ".repeat(width),
            self
        )
    }
}

fn consumed(input: &str, cursor: &usize) -> String {
    input.chars().take(*cursor).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("command root must be a literal, got argument <{0}>")]
    NotLiteral(String),
    #[error("command '{0}' is already registered")]
    Duplicate(String),
    #[error("greedy argument <{0}> cannot have children")]
    GreedyNotLeaf(String),
}
