//! Slash commands understood by the interactive prompt.

use std::collections::BTreeMap;
use strum::{Display, EnumIter, IntoEnumIterator};
use tiller_tools::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommandType {
    Help,
    Clear,
    Exit,
    Quit,
    Version,
    Tools,
    Mode,
}

impl SlashCommandType {
    pub fn command_name(&self) -> String {
        self.to_string()
    }

    pub fn description(&self) -> &'static str {
        match self {
            SlashCommandType::Help => "Show available commands",
            SlashCommandType::Clear => "Clear the terminal screen",
            SlashCommandType::Exit | SlashCommandType::Quit => "Exit the application",
            SlashCommandType::Version => "Show version information",
            SlashCommandType::Tools => "List the tools the agent can use",
            SlashCommandType::Mode => "Show the current mode and model",
        }
    }
}

/// What the prompt loop should do after a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashAction {
    Print(String),
    ClearScreen,
    Exit,
}

/// Session facts some commands report on.
#[derive(Debug, Clone, Copy)]
pub struct SlashContext<'a> {
    pub tool_names: &'a [String],
    pub mode: Mode,
    pub model: &'a str,
}

/// Commands known to one prompt loop.
pub struct SlashCommandRegistry {
    commands: BTreeMap<String, SlashCommandType>,
}

impl Default for SlashCommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlashCommandRegistry {
    pub fn new() -> Self {
        let commands = SlashCommandType::iter()
            .map(|cmd| (cmd.command_name(), cmd))
            .collect();
        Self { commands }
    }

    pub fn is_command(input: &str) -> bool {
        input.trim_start().starts_with('/')
    }

    pub fn get(&self, name: &str) -> Option<SlashCommandType> {
        self.commands.get(name).copied()
    }

    /// Command names in help order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Resolve `input` (with its leading `/`) to an action.
    pub fn dispatch(&self, input: &str, ctx: &SlashContext<'_>) -> SlashAction {
        let body = input.trim().trim_start_matches('/');
        let name = body
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let Some(command) = self.get(&name) else {
            return SlashAction::Print(format!(
                "Unknown command: /{name}\nType /help to see available commands."
            ));
        };

        match command {
            SlashCommandType::Help => SlashAction::Print(self.help_text()),
            SlashCommandType::Clear => SlashAction::ClearScreen,
            SlashCommandType::Exit | SlashCommandType::Quit => SlashAction::Exit,
            SlashCommandType::Version => {
                SlashAction::Print(format!("tiller {}", env!("CARGO_PKG_VERSION")))
            }
            SlashCommandType::Tools => {
                if ctx.tool_names.is_empty() {
                    SlashAction::Print("No tools available.".to_string())
                } else {
                    SlashAction::Print(format!(
                        "Available tools ({}):\n{}",
                        ctx.tool_names.len(),
                        ctx.tool_names
                            .iter()
                            .map(|name| format!("  {name}"))
                            .collect::<Vec<_>>()
                            .join("\n")
                    ))
                }
            }
            SlashCommandType::Mode => {
                SlashAction::Print(format!("Mode: {}\nModel: {}", ctx.mode, ctx.model))
            }
        }
    }

    fn help_text(&self) -> String {
        let mut text = String::from("Available Commands:\n");
        for (name, command) in &self.commands {
            text.push_str(&format!("\n/{name} - {}", command.description()));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(tools: &[String]) -> SlashContext<'_> {
        SlashContext {
            tool_names: tools,
            mode: Mode::Plan,
            model: "o3",
        }
    }

    #[test]
    fn test_help_lists_every_command() {
        let registry = SlashCommandRegistry::new();
        let SlashAction::Print(help) = registry.dispatch("/help", &ctx(&[])) else {
            panic!("help should print");
        };
        for name in ["help", "clear", "exit", "quit", "version", "tools", "mode"] {
            assert!(help.contains(&format!("/{name} - ")), "missing {name}");
        }
    }

    #[test]
    fn test_exit_aliases_and_case() {
        let registry = SlashCommandRegistry::new();
        assert_eq!(registry.dispatch("/exit", &ctx(&[])), SlashAction::Exit);
        assert_eq!(registry.dispatch("  /QUIT now", &ctx(&[])), SlashAction::Exit);
        assert_eq!(registry.dispatch("/clear", &ctx(&[])), SlashAction::ClearScreen);
    }

    #[test]
    fn test_unknown_command_hint() {
        let registry = SlashCommandRegistry::new();
        assert_eq!(
            registry.dispatch("/frobnicate", &ctx(&[])),
            SlashAction::Print(
                "Unknown command: /frobnicate\nType /help to see available commands.".to_string()
            )
        );
    }

    #[test]
    fn test_tools_and_mode_report_session() {
        let registry = SlashCommandRegistry::new();
        let tools = vec!["read_file".to_string(), "git_status".to_string()];

        let SlashAction::Print(text) = registry.dispatch("/tools", &ctx(&tools)) else {
            panic!("tools should print");
        };
        assert!(text.starts_with("Available tools (2):"));
        assert!(text.contains("  git_status"));

        assert_eq!(
            registry.dispatch("/mode", &ctx(&tools)),
            SlashAction::Print("Mode: plan\nModel: o3".to_string())
        );
    }

    #[test]
    fn test_is_command() {
        assert!(SlashCommandRegistry::is_command(" /help"));
        assert!(!SlashCommandRegistry::is_command("list files in /tmp"));
    }
}
