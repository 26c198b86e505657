use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AppCommand, ChatParams, TitleParams};
use crate::api::ModelsResponse;
use crate::core::app::request_state::last_error_from;
use crate::core::app::App;
use crate::core::message::Message;
use crate::core::session::SessionId;
use crate::core::store::{RequestFence, RequestStatus};
use crate::core::transport::TransportError;

pub(super) fn submit_message(app: &mut App, text: String) -> Option<AppCommand> {
    let text = text.trim();
    if text.is_empty() {
        debug!("Ignoring empty message");
        return None;
    }
    if app.is_sending() {
        debug!("Ignoring submit while a request is in flight");
        return None;
    }
    let session_id = app.store.active_session_id()?;
    app.store.append_message(session_id, Message::user(text));
    dispatch_request(app, session_id)
}

/// Resend the transcript as it stands. Only valid when the last non-error
/// entry is the user's, so nothing is removed or duplicated.
pub(super) fn retry_last_message(app: &mut App) -> Option<AppCommand> {
    if app.is_sending() {
        debug!("Ignoring retry while a request is in flight");
        return None;
    }
    let session = app.store.active_session()?;
    let session_id = session.id();
    if !session.last_eligible_message().is_some_and(Message::is_user) {
        debug!(session_id = %session_id, "Nothing to retry");
        return None;
    }
    dispatch_request(app, session_id)
}

fn dispatch_request(app: &mut App, session_id: SessionId) -> Option<AppCommand> {
    let (fence, cancel_token) = app.start_request(session_id);
    match app.model().map(str::to_string) {
        Some(model) => chat_command(app, fence, model, cancel_token),
        None => {
            debug!(request_id = fence.request_id, "Resolving model before send");
            Some(AppCommand::ResolveModel {
                fence,
                cancel_token,
            })
        }
    }
}

fn chat_command(
    app: &mut App,
    fence: RequestFence,
    model: String,
    cancel_token: CancellationToken,
) -> Option<AppCommand> {
    let Some(session) = app.store.session(fence.session_id) else {
        app.finish_request(RequestStatus::Idle, None);
        return None;
    };
    Some(AppCommand::SendChat(ChatParams {
        fence,
        model,
        messages: session.api_messages(),
        system_prompt: session.profile().system_prompt().to_string(),
        cancel_token,
    }))
}

pub(super) fn handle_model_resolved(
    app: &mut App,
    fence: RequestFence,
    result: Result<Option<String>, TransportError>,
) -> Option<AppCommand> {
    if let Ok(model) = &result {
        app.set_discovered_model(model.clone());
    }
    if !app.is_current_request(fence) {
        app.discard(fence, "model resolution");
        return None;
    }

    let err = match result {
        Ok(Some(model)) => {
            let cancel_token = app.request_token().unwrap_or_default();
            return chat_command(app, fence, model, cancel_token);
        }
        Ok(None) => TransportError::NoModelLoaded,
        Err(err) if err.is_cancellation() => {
            app.finish_request(RequestStatus::Idle, None);
            return None;
        }
        Err(err @ TransportError::BadUrl(_)) | Err(err @ TransportError::Unreachable(_)) => err,
        Err(other) => TransportError::Unreachable(other.to_string()),
    };
    fail_request(app, fence, err);
    None
}

pub(super) fn handle_chat_completed(
    app: &mut App,
    fence: RequestFence,
    result: Result<String, TransportError>,
) -> Option<AppCommand> {
    if !app.is_current_request(fence) {
        app.discard(fence, "chat reply");
        return None;
    }

    match result {
        Ok(content) => {
            app.store
                .append_message(fence.session_id, Message::assistant(content));
            app.finish_request(RequestStatus::Done, None);
            info!(
                request_id = fence.request_id,
                session_id = %fence.session_id,
                "Reply received"
            );
            title_command(app, fence.session_id)
        }
        Err(err) if err.is_cancellation() => {
            app.finish_request(RequestStatus::Idle, None);
            None
        }
        Err(err) => {
            fail_request(app, fence, err);
            None
        }
    }
}

fn fail_request(app: &mut App, fence: RequestFence, err: TransportError) {
    warn!(
        request_id = fence.request_id,
        session_id = %fence.session_id,
        error = %err,
        "Request failed"
    );
    app.store
        .append_message(fence.session_id, Message::error(err.to_string()));
    app.finish_request(RequestStatus::Error, Some(last_error_from(&err)));
}

/// Title generation follows only the first assistant reply of a session.
fn title_command(app: &mut App, session_id: SessionId) -> Option<AppCommand> {
    let session = app.store.session(session_id)?;
    if session.assistant_reply_count() != 1 {
        return None;
    }
    let request = app.titles.begin(session)?;
    Some(AppCommand::GenerateTitle(TitleParams {
        request,
        model: app.model().map(str::to_string),
    }))
}

pub(super) fn handle_models_loaded(app: &mut App, result: Result<ModelsResponse, TransportError>) {
    match result {
        Ok(response) => {
            let loaded = response.loaded_model().map(str::to_string);
            app.set_available_models(response.data.into_iter().map(|m| m.id).collect());
            app.set_discovered_model(loaded);
        }
        Err(err) => {
            warn!(error = %err, "Model refresh failed");
        }
    }
}
