//! Console commands read from standard input.

/// Commands and their descriptions, as listed by `help`.
pub const COMMANDS: &[(&str, &str)] = &[
    ("exit", "Stop the server and quit"),
    ("help", "List available commands"),
];

/// One line typed on the server console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Help,
    /// A blank line.
    Empty,
    Invalid(String),
}

impl Command {
    /// Parses a console line, ignoring surrounding whitespace.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Empty,
            "exit" => Self::Exit,
            "help" => Self::Help,
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// The text printed for `help`.
pub fn help_text() -> String {
    let mut text = String::from("Available commands:");
    for (name, description) in COMMANDS {
        text.push_str(&format!("\n  {name:<6} {description}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("exit"), Command::Exit);
        assert_eq!(Command::parse("  help\n"), Command::Help);
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(Command::parse("EXIT"), Command::Invalid("EXIT".to_string()));
        assert_eq!(
            Command::parse("say hi"),
            Command::Invalid("say hi".to_string())
        );
    }

    #[test]
    fn test_help_lists_every_command() {
        let text = help_text();
        for (name, _) in COMMANDS {
            assert!(text.contains(name));
        }
    }
}
