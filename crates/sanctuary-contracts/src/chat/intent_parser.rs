use super::command_registry::{find_spec, ArgShape};

/// One line of REPL input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Noop,
    /// Plain text for the chat model.
    Chat(String),
    Scan { path: String },
    Room { room: String },
    Show,
    Ledger { limit: Option<usize> },
    Sign { entry_id: String },
    Clear,
    Objective { text: String },
    TextModel { model: String },
    VisionModel { model: String },
    Help,
    /// A known command used without its required argument.
    MissingArg { command: String, usage: &'static str },
    Unknown { command: String, arg: String },
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return Intent::Chat(raw_trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return Intent::Chat(raw_trimmed.to_string());
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    let Some(spec) = find_spec(&command) else {
        return Intent::Unknown {
            command,
            arg: arg.to_string(),
        };
    };

    let value = match spec.shape {
        ArgShape::None | ArgShape::Count => String::new(),
        ArgShape::Path => parse_single_path_arg(arg),
        ArgShape::Raw => arg.to_string(),
    };
    let needs_value = matches!(spec.shape, ArgShape::Path | ArgShape::Raw);
    if needs_value && value.is_empty() {
        return Intent::MissingArg {
            command,
            usage: spec.usage,
        };
    }

    match command.as_str() {
        "scan" => Intent::Scan { path: value },
        "room" => Intent::Room { room: value },
        "show" => Intent::Show,
        "ledger" => Intent::Ledger {
            limit: arg.parse::<usize>().ok().filter(|limit| *limit > 0),
        },
        "sign" => Intent::Sign { entry_id: value },
        "clear" => Intent::Clear,
        "objective" => Intent::Objective { text: value },
        "text_model" => Intent::TextModel { model: value },
        "vision_model" => Intent::VisionModel { model: value },
        "help" => Intent::Help,
        _ => Intent::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_intent, Intent};

    #[test]
    fn plain_text_is_chat() {
        assert_eq!(
            parse_intent("  what is on the wall?  "),
            Intent::Chat("what is on the wall?".to_string())
        );
        assert_eq!(parse_intent("   "), Intent::Noop);
        assert_eq!(parse_intent("/ not a command"), Intent::Chat("/ not a command".to_string()));
    }

    #[test]
    fn scan_accepts_quoted_paths() {
        assert_eq!(
            parse_intent("/scan \"/tmp/harbour receipt.png\""),
            Intent::Scan {
                path: "/tmp/harbour receipt.png".to_string()
            }
        );
        assert_eq!(
            parse_intent("/SCAN a.png"),
            Intent::Scan {
                path: "a.png".to_string()
            }
        );
    }

    #[test]
    fn ledger_limit_is_optional() {
        assert_eq!(parse_intent("/ledger"), Intent::Ledger { limit: None });
        assert_eq!(parse_intent("/ledger 3"), Intent::Ledger { limit: Some(3) });
        assert_eq!(parse_intent("/ledger lots"), Intent::Ledger { limit: None });
    }

    #[test]
    fn raw_args_keep_spacing() {
        assert_eq!(
            parse_intent("/objective  REPAIR THE  LAMP "),
            Intent::Objective {
                text: "REPAIR THE  LAMP".to_string()
            }
        );
        assert_eq!(
            parse_intent("/room the_deck"),
            Intent::Room {
                room: "the_deck".to_string()
            }
        );
    }

    #[test]
    fn missing_arguments_report_usage() {
        assert_eq!(
            parse_intent("/sign"),
            Intent::MissingArg {
                command: "sign".to_string(),
                usage: "/sign <entry_id>"
            }
        );
    }

    #[test]
    fn unknown_command_keeps_its_argument() {
        assert_eq!(
            parse_intent("/magic foo bar"),
            Intent::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string()
            }
        );
    }
}
