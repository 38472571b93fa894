#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    None,
    /// One filesystem path, shell-quoted if it has spaces.
    Path,
    /// Everything after the command, trimmed.
    Raw,
    /// An optional positive count.
    Count,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub shape: ArgShape,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "scan",
        shape: ArgShape::Path,
        usage: "/scan <image>",
        summary: "run the visual intake pipeline on an image",
    },
    CommandSpec {
        command: "room",
        shape: ArgShape::Raw,
        usage: "/room <room_id>",
        summary: "walk into another room and rehydrate its wall",
    },
    CommandSpec {
        command: "show",
        shape: ArgShape::None,
        usage: "/show",
        summary: "render what the current room is showing",
    },
    CommandSpec {
        command: "ledger",
        shape: ArgShape::Count,
        usage: "/ledger [n]",
        summary: "summarise the most recent ledger entries",
    },
    CommandSpec {
        command: "sign",
        shape: ArgShape::Raw,
        usage: "/sign <entry_id>",
        summary: "sign a ledger entry",
    },
    CommandSpec {
        command: "clear",
        shape: ArgShape::None,
        usage: "/clear",
        summary: "clear your state for the current room",
    },
    CommandSpec {
        command: "objective",
        shape: ArgShape::Raw,
        usage: "/objective <text>",
        summary: "set the room's HUD objective",
    },
    CommandSpec {
        command: "text_model",
        shape: ArgShape::Raw,
        usage: "/text_model <model>",
        summary: "switch the chat model",
    },
    CommandSpec {
        command: "vision_model",
        shape: ArgShape::Raw,
        usage: "/vision_model <model>",
        summary: "switch the scan model",
    },
    CommandSpec {
        command: "help",
        shape: ArgShape::None,
        usage: "/help",
        summary: "list commands",
    },
];

pub(crate) fn find_spec(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}

/// `usage  summary` lines for the REPL's `/help`.
pub fn help_lines() -> Vec<String> {
    COMMANDS
        .iter()
        .map(|spec| format!("{:<22} {}", spec.usage, spec.summary))
        .collect()
}
