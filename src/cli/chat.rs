//! Line-oriented chat driver.
//!
//! Reads stdin one line at a time, routes slash commands through
//! [`process_input`], and prints whatever changed in the focused session
//! after each batch of actions. The [`App`] is owned by this loop; background
//! tasks only reach it through the action channel.

use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::commands::{process_input, CommandContext, CommandResult};
use crate::core::app::{apply_actions, App, AppAction, AppActionDispatcher};
use crate::core::config::{path_display, Config};
use crate::core::executor::CommandExecutor;
use crate::core::message::{Message, MessageRole};
use crate::core::persistence::{LoadOutcome, LoadSource, PersistenceGateway};
use crate::core::session::{Session, SessionId};
use crate::core::store::{RequestStatus, SessionStore};
use crate::core::transport::Transport;

/// Tracks what has already been printed so each update only shows news.
#[derive(Debug, Default)]
pub struct ChatView {
    session_id: Option<SessionId>,
    shown_messages: usize,
    title: Option<String>,
    status: RequestStatus,
}

impl ChatView {
    /// Lines to print for everything that changed since the last call.
    pub fn updates(&mut self, app: &App) -> Vec<String> {
        let mut lines = Vec::new();
        let Some(session) = app.active_session() else {
            self.session_id = None;
            return lines;
        };

        // Users see their own input as they type it, except when a whole
        // transcript is being replayed after a switch.
        let mut echo_user = false;
        if self.session_id != Some(session.id()) {
            self.session_id = Some(session.id());
            self.shown_messages = 0;
            self.title = session.title().map(str::to_string);
            self.status = app.status();
            lines.push(session_header(session));
            echo_user = true;
        }

        let messages = session.messages();
        let start = self.shown_messages.min(messages.len());
        for message in &messages[start..] {
            if message.is_user() && !echo_user {
                continue;
            }
            lines.push(format_message(message));
        }
        self.shown_messages = messages.len();

        let title = session.title().map(str::to_string);
        if title != self.title {
            if let Some(title) = &title {
                lines.push(format!("📝 Titled \"{title}\""));
            }
            self.title = title;
        }

        let status = app.status();
        if status != self.status {
            match status {
                RequestStatus::Sending => lines.push(format!(
                    "… {}",
                    app.runtime().status_text.as_deref().unwrap_or("Sending…")
                )),
                RequestStatus::Stopped => lines.push("⏹  Stopped.".to_string()),
                _ => {}
            }
            self.status = status;
        }

        lines
    }
}

fn session_header(session: &Session) -> String {
    format!(
        "── {} [{}] ──",
        session.display_title(),
        session.profile().profile_name()
    )
}

pub fn format_message(message: &Message) -> String {
    match message.role {
        MessageRole::User => format!("you> {}", message.content),
        MessageRole::Assistant => format!("🤖 {}", message.content),
        MessageRole::Error => format!("❌ {}", message.content),
        MessageRole::System => format!("(system) {}", message.content),
    }
}

fn report_load(path: &Path, outcome: &LoadOutcome) {
    match &outcome.source {
        LoadSource::Missing => info!(path = %path.display(), "Starting with no saved sessions"),
        LoadSource::Current => {}
        LoadSource::Upgraded { strategy } => {
            println!("Upgraded {} from the {strategy} format.", path_display(path))
        }
        LoadSource::Quarantined { moved_to } => match moved_to {
            Some(moved_to) => eprintln!(
                "⚠️  {} could not be read; it was moved to {} and a new file will be started.",
                path_display(path),
                path_display(moved_to)
            ),
            None => eprintln!(
                "⚠️  {} could not be read or set aside; starting with no sessions and saving is off for this run.",
                path_display(path)
            ),
        },
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_models(app: &App) {
    if app.available_models().is_empty() {
        println!("The server reports no loaded models.");
        return;
    }
    for id in app.available_models() {
        let marker = if app.model() == Some(id.as_str()) { "*" } else { " " };
        println!("{marker} {id}");
    }
}

/// Describe why a submit or retry would be ignored, if it would be.
fn rejection_reason(app: &App, action: &AppAction) -> Option<&'static str> {
    match action {
        AppAction::SubmitMessage { .. } | AppAction::RetryLastMessage if app.is_sending() => {
            Some("Still waiting for the reply. Use /stop to cancel it.")
        }
        AppAction::RetryLastMessage => {
            let retryable = app
                .active_session()
                .and_then(Session::last_eligible_message)
                .is_some_and(Message::is_user);
            (!retryable).then_some("Nothing to retry.")
        }
        AppAction::StopSending if !app.is_sending() => Some("Nothing is being sent."),
        _ => None,
    }
}

struct ChatLoop {
    app: App,
    config: Config,
    executor: CommandExecutor,
    view: ChatView,
    changes: watch::Receiver<u64>,
    models_requested: bool,
}

impl ChatLoop {
    fn apply(&mut self, actions: Vec<AppAction>) {
        let mut models_error = None;
        let mut models_loaded = false;
        for action in &actions {
            if let AppAction::ModelsLoaded { result } = action {
                models_loaded = true;
                if let Err(err) = result {
                    models_error = Some(err.to_string());
                }
            }
        }

        let commands = apply_actions(&mut self.app, actions);
        self.executor.execute_all(commands);
        if self.changes.has_changed().unwrap_or(true) {
            self.refresh_view();
        }

        if models_loaded && self.models_requested {
            self.models_requested = false;
            match models_error {
                Some(err) => println!("❌ Could not list models: {err}"),
                None => print_models(&self.app),
            }
        }
    }

    fn refresh_view(&mut self) {
        self.changes.borrow_and_update();
        print_lines(self.view.updates(&self.app));
    }

    fn submit(&mut self, action: AppAction) {
        if let Some(reason) = rejection_reason(&self.app, &action) {
            println!("{reason}");
            return;
        }
        if matches!(action, AppAction::RefreshModels) {
            self.models_requested = true;
        }
        self.apply(vec![action]);
    }
}

pub async fn run_chat(config: Config, fresh_session: bool) -> Result<(), Box<dyn Error>> {
    let state_path = config.state_path()?;
    let gateway = PersistenceGateway::new(state_path.clone(), config.save_debounce());
    let (store, outcome) = SessionStore::load(gateway);
    report_load(&state_path, &outcome);

    let mut app = App::new(store, config.model.clone());
    if fresh_session || app.active_session().is_none() {
        app.begin_session(config.resolve_profile(None)?);
    }

    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<AppAction>();
    let dispatcher = AppActionDispatcher::new(action_tx);
    let transport = Transport::new(config.base_url(), config.transport_options());
    let executor = CommandExecutor::new(Arc::new(transport), dispatcher);

    println!(
        "parlor {} · {} · /help for commands",
        env!("CARGO_PKG_VERSION"),
        config.base_url()
    );

    let changes = app.store().subscribe();
    let mut chat = ChatLoop {
        app,
        config,
        executor,
        view: ChatView::default(),
        changes,
        models_requested: false,
    };
    chat.refresh_view();
    chat.apply(vec![AppAction::RefreshModels]);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_confirm: Option<AppAction> = None;
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    println!();
                    break;
                };

                if let Some(action) = pending_confirm.take() {
                    if is_yes(&line) {
                        chat.submit(action);
                    } else {
                        println!("Cancelled.");
                    }
                    prompt();
                    continue;
                }

                let result = {
                    let context = CommandContext {
                        app: &chat.app,
                        config: &chat.config,
                    };
                    process_input(&context, &line)
                };
                match result {
                    CommandResult::Print(text) => println!("{text}"),
                    CommandResult::Dispatch(action) => chat.submit(action),
                    CommandResult::Confirm { prompt: question, action } => {
                        print!("{question} [y/N] ");
                        let _ = std::io::stdout().flush();
                        pending_confirm = Some(action);
                        continue;
                    }
                    CommandResult::ProcessAsMessage(text) => {
                        if !text.trim().is_empty() {
                            chat.submit(AppAction::SubmitMessage { text });
                        }
                    }
                    CommandResult::Quit => break,
                }
                prompt();
            }
            Some(action) = action_rx.recv() => {
                let mut pending = vec![action];
                while let Ok(action) = action_rx.try_recv() {
                    pending.push(action);
                }
                chat.apply(pending);
            }
        }
    }

    chat.app.shutdown().await;
    Ok(())
}
