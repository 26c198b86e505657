//! Slash commands for the line-oriented chat driver.
//!
//! Handlers never mutate the coordinator directly. They read the current
//! state and return a [`CommandResult`] that the driver prints or feeds back
//! through the action queue.

mod registry;

pub use registry::{all_commands, find_command, CommandInvocation};

use chrono::{DateTime, Local, Utc};

use crate::core::app::{App, AppAction};
use crate::core::config::Config;
use crate::core::session::{Session, SessionId};

pub enum CommandResult {
    /// Text for the driver to show.
    Print(String),
    Dispatch(AppAction),
    /// Ask for a yes/no answer before dispatching.
    Confirm { prompt: String, action: AppAction },
    ProcessAsMessage(String),
    Quit,
}

pub struct CommandContext<'a> {
    pub app: &'a App,
    pub config: &'a Config,
}

pub fn process_input(context: &CommandContext<'_>, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(body) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = body.splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        let invocation = CommandInvocation {
            input: trimmed,
            args,
        };
        (command.handler)(context, invocation)
    } else {
        CommandResult::ProcessAsMessage(input.to_string())
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// One line of a session listing, numbered from 1.
pub fn describe_session(number: usize, session: &Session, is_active: bool) -> String {
    let marker = if is_active { "*" } else { " " };
    format!(
        "{marker} {number:>2}. {title}  [{profile}, {count} messages, {when}]",
        title = session.display_title(),
        profile = session.profile().profile_name(),
        count = session.messages().len(),
        when = format_timestamp(session.last_activity_at()),
    )
}

pub fn describe_sessions(app: &App) -> String {
    let sessions = app.store().sessions_by_recency();
    if sessions.is_empty() {
        return "No sessions yet.".to_string();
    }
    let active = app.store().active_session_id();
    sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            describe_session(index + 1, session, Some(session.id()) == active)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve a 1-based number from `/sessions` to a session.
fn session_by_number<'a>(app: &'a App, args: &str) -> Result<&'a Session, String> {
    let number: usize = args
        .trim()
        .parse()
        .map_err(|_| format!("Expected a session number, got \"{args}\""))?;
    number
        .checked_sub(1)
        .and_then(|index| app.store().sessions_by_recency().into_iter().nth(index))
        .ok_or_else(|| format!("No session number {number}. Use /sessions to list them."))
}

pub(super) fn handle_help(
    _context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:<16} {}\n", command.usage, command.help));
    }
    help.push_str("Anything else is sent as a message.");
    CommandResult::Print(help)
}

pub(super) fn handle_new(
    context: &CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let name = Some(invocation.args).filter(|args| !args.is_empty());
    match context.config.resolve_profile(name) {
        Ok(profile) => CommandResult::Dispatch(AppAction::BeginSession { profile }),
        Err(err) => CommandResult::Print(err.to_string()),
    }
}

pub(super) fn handle_sessions(
    context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Print(describe_sessions(context.app))
}

pub(super) fn handle_switch(
    context: &CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    match session_by_number(context.app, invocation.args) {
        Ok(session) => CommandResult::Dispatch(AppAction::SelectSession { id: session.id() }),
        Err(message) => CommandResult::Print(message),
    }
}

pub(super) fn handle_delete(
    context: &CommandContext<'_>,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let session = match session_by_number(context.app, invocation.args) {
        Ok(session) => session,
        Err(message) => return CommandResult::Print(message),
    };
    let replacement = match context.config.resolve_profile(None) {
        Ok(profile) => profile,
        Err(err) => return CommandResult::Print(err.to_string()),
    };
    let id: SessionId = session.id();
    CommandResult::Confirm {
        prompt: format!("Delete \"{}\"? This cannot be undone.", session.display_title()),
        action: AppAction::DeleteSession { id, replacement },
    }
}

pub(super) fn handle_retry(
    _context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Dispatch(AppAction::RetryLastMessage)
}

pub(super) fn handle_stop(
    _context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Dispatch(AppAction::StopSending)
}

pub(super) fn handle_models(
    _context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Dispatch(AppAction::RefreshModels)
}

pub(super) fn handle_quit(
    _context: &CommandContext<'_>,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Quit
}
