use super::{CommandContext, CommandResult};

pub type CommandHandler = fn(&CommandContext<'_>, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new [profile]",
        help: "Start a new session with the default or named profile.",
        handler: super::handle_new,
    },
    Command {
        name: "sessions",
        usage: "/sessions",
        help: "List sessions, most recent first.",
        handler: super::handle_sessions,
    },
    Command {
        name: "switch",
        usage: "/switch <n>",
        help: "Focus session number n from /sessions.",
        handler: super::handle_switch,
    },
    Command {
        name: "delete",
        usage: "/delete <n>",
        help: "Delete session number n after confirmation.",
        handler: super::handle_delete,
    },
    Command {
        name: "retry",
        usage: "/retry",
        help: "Resend the conversation after an error or stop.",
        handler: super::handle_retry,
    },
    Command {
        name: "stop",
        usage: "/stop",
        help: "Cancel the request in flight.",
        handler: super::handle_stop,
    },
    Command {
        name: "models",
        usage: "/models",
        help: "Refresh and list the models the server reports.",
        handler: super::handle_models,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Save and exit.",
        handler: super::handle_quit,
    },
];
