//! Chat command parsing.

/// Prefix that marks a message as a bot command.
pub const COMMAND_CHAR: char = '!';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start,
    Save,
    Unknown(String),
}

impl Command {
    /// Parse trimmed message text. `None` means it is game input.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.starts_with(COMMAND_CHAR) {
            return None;
        }
        let name = text.split_whitespace().next().unwrap_or(text);
        let command = match name {
            "!help" => Command::Help,
            "!start" => Command::Start,
            "!save" => Command::Save,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}
