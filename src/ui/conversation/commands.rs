use std::str::FromStr;

use crate::events::ChatModel;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Switch to a different model
    Model,
    /// Set the sampling temperature
    Temp,
    /// Replace the system prompt
    System,
    /// Toggle the settings panel
    Settings,
    /// Clear the conversation
    Clear,
    /// Load the server conversation list
    History,
    /// Open a conversation from the server
    Open,
    /// Start a new server conversation
    New,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn model_target(&self) -> Option<ChatModel> {
        if self.command != SlashCommand::Model {
            return None;
        }

        ChatModel::from_str(self.argument()?.trim()).ok()
    }

    /// Temperature argument, clamped to [0, 1] like the settings slider
    pub fn temperature_target(&self) -> Option<f32> {
        if self.command != SlashCommand::Temp {
            return None;
        }

        let value: f32 = self.argument()?.trim().parse().ok()?;
        if value.is_nan() {
            return None;
        }
        Some(value.clamp(0.0, 1.0))
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Model => "switch model (gpt-4o, gpt-4o-mini, o1-mini, o1-preview)",
            SlashCommand::Temp => "set temperature between 0 and 1",
            SlashCommand::System => "replace the system prompt",
            SlashCommand::Settings => "toggle the settings panel",
            SlashCommand::Clear => "clear the conversation",
            SlashCommand::History => "list saved conversations",
            SlashCommand::Open => "open a saved conversation by id or list number",
            SlashCommand::New => "start a new conversation",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is pending.
    pub fn available_while_waiting(self) -> bool {
        !matches!(self, SlashCommand::Open | SlashCommand::New)
    }
}

/// Return all built-in commands in a Vec paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter().map(|c| (c.command(), c)).collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim_start();
    if !input.starts_with('/') {
        return None;
    }

    let body = &input[1..];
    let (head, rest) = match body.find(char::is_whitespace) {
        Some(split) => body.split_at(split),
        None => (body, ""),
    };

    let command = SlashCommand::from_str(head).ok().or_else(|| match head.to_lowercase().as_str() {
        "q" | "exit" | "bye" => Some(SlashCommand::Quit),
        "temperature" | "t" => Some(SlashCommand::Temp),
        "models" | "m" => Some(SlashCommand::Model),
        "prompt" => Some(SlashCommand::System),
        "conversations" | "ls" => Some(SlashCommand::History),
        "h" | "?" => Some(SlashCommand::Help),
        _ => None,
    })?;

    // The argument is kept verbatim apart from the outer whitespace, so a
    // multi-line `/system` prompt survives.
    let rest = rest.trim();
    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    help.push_str("\nAliases: /q for /quit, /t for /temp, /m for /model, /ls for /history");
    help.push_str("\nKeys: Enter send, Shift+Enter newline, F2 settings, F3 conversations, Ctrl+L clear, Ctrl+C quit");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("hello /model"), None);
        assert_eq!(parse_slash_command("/nonsense"), None);
    }

    #[test]
    fn parses_model_with_argument() {
        let parsed = parse_slash_command("/model o1-mini").unwrap();
        assert_eq!(parsed.command, SlashCommand::Model);
        assert_eq!(parsed.model_target(), Some(ChatModel::O1Mini));

        let unknown = parse_slash_command("/model gpt-2").unwrap();
        assert_eq!(unknown.model_target(), None);
    }

    #[test]
    fn temperature_is_clamped() {
        let parsed = parse_slash_command("/t 1.7").unwrap();
        assert_eq!(parsed.command, SlashCommand::Temp);
        assert_eq!(parsed.temperature_target(), Some(1.0));

        assert_eq!(parse_slash_command("/temp -2").unwrap().temperature_target(), Some(0.0));
        assert_eq!(parse_slash_command("/temp warm").unwrap().temperature_target(), None);
    }

    #[test]
    fn arguments_keep_their_spacing() {
        let parsed = parse_slash_command("/system You are   a pirate.").unwrap();
        assert_eq!(parsed.command, SlashCommand::System);
        assert_eq!(parsed.argument(), Some("You are   a pirate."));

        let multiline = parse_slash_command("/system  Line one.\n\n  - indented rule\n").unwrap();
        assert_eq!(multiline.argument(), Some("Line one.\n\n  - indented rule"));

        assert_eq!(parse_slash_command("/clear   ").unwrap().argument(), None);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(parse_slash_command("/q").unwrap().command, SlashCommand::Quit);
        assert_eq!(parse_slash_command("/ls").unwrap().command, SlashCommand::History);
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for (keyword, _) in built_in_slash_commands() {
            assert!(help.contains(&format!("/{} ", keyword)));
        }
    }
}
