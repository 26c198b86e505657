mod requests;
mod titles;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::App;
use crate::api::{ChatMessage, ModelsResponse};
use crate::core::session::{ProfileSnapshot, SessionId};
use crate::core::store::RequestFence;
use crate::core::title::TitleRequest;
use crate::core::transport::TransportError;

pub enum AppAction {
    SubmitMessage {
        text: String,
    },
    RetryLastMessage,
    StopSending,
    BeginSession {
        profile: ProfileSnapshot,
    },
    SelectSession {
        id: SessionId,
    },
    /// `replacement` seeds the new session when the deleted one was focused.
    DeleteSession {
        id: SessionId,
        replacement: ProfileSnapshot,
    },
    RefreshModels,
    ModelsLoaded {
        result: Result<ModelsResponse, TransportError>,
    },
    ModelResolved {
        fence: RequestFence,
        result: Result<Option<String>, TransportError>,
    },
    ChatCompleted {
        fence: RequestFence,
        result: Result<String, TransportError>,
    },
    TitleCompleted {
        session_id: SessionId,
        result: Result<String, TransportError>,
    },
}

#[derive(Clone)]
pub struct AppActionDispatcher {
    tx: mpsc::UnboundedSender<AppAction>,
}

impl AppActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<AppAction>) -> Self {
        Self { tx }
    }

    pub fn dispatch(&self, action: AppAction) {
        if self.tx.send(action).is_err() {
            debug!("Action receiver closed; dropping action");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatParams {
    pub fence: RequestFence,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    pub cancel_token: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct TitleParams {
    pub request: TitleRequest,
    /// `None` asks the executor to discover the model first.
    pub model: Option<String>,
}

#[derive(Debug)]
pub enum AppCommand {
    ResolveModel {
        fence: RequestFence,
        cancel_token: CancellationToken,
    },
    SendChat(ChatParams),
    GenerateTitle(TitleParams),
    RefreshModels,
}

pub fn apply_actions(app: &mut App, actions: impl IntoIterator<Item = AppAction>) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for action in actions {
        if let Some(cmd) = apply_action(app, action) {
            commands.push(cmd);
        }
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction) -> Option<AppCommand> {
    match action {
        AppAction::SubmitMessage { text } => requests::submit_message(app, text),
        AppAction::RetryLastMessage => requests::retry_last_message(app),
        AppAction::StopSending => {
            app.stop_sending();
            None
        }
        AppAction::BeginSession { profile } => {
            app.begin_session(profile);
            None
        }
        AppAction::SelectSession { id } => {
            app.select_session(id);
            None
        }
        AppAction::DeleteSession { id, replacement } => {
            if app.delete_session(id) {
                app.begin_session(replacement);
            }
            None
        }
        AppAction::RefreshModels => Some(AppCommand::RefreshModels),
        AppAction::ModelsLoaded { result } => {
            requests::handle_models_loaded(app, result);
            None
        }
        AppAction::ModelResolved { fence, result } => {
            requests::handle_model_resolved(app, fence, result)
        }
        AppAction::ChatCompleted { fence, result } => {
            requests::handle_chat_completed(app, fence, result)
        }
        AppAction::TitleCompleted { session_id, result } => {
            titles::handle_title_completed(app, session_id, result);
            None
        }
    }
}
