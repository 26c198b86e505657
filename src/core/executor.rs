//! Runs [`AppCommand`]s off the coordinator.
//!
//! Each command becomes one tokio task. Results come back through the
//! [`AppActionDispatcher`] so only the coordinator mutates state. A task
//! whose token is cancelled reports [`TransportError::Cancelled`] and the
//! coordinator drops it silently.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::app::{AppAction, AppActionDispatcher, AppCommand, ChatParams, TitleParams};
use crate::core::store::RequestFence;
use crate::core::title::{TitleRequest, TITLE_SYSTEM_PROMPT};
use crate::core::transport::{ChatBackend, TransportError};

async fn cancellable<T>(
    token: &CancellationToken,
    work: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::select! {
        result = work => result,
        _ = token.cancelled() => Err(TransportError::Cancelled),
    }
}

#[derive(Clone)]
pub struct CommandExecutor {
    backend: Arc<dyn ChatBackend>,
    dispatcher: AppActionDispatcher,
}

impl CommandExecutor {
    pub fn new(backend: Arc<dyn ChatBackend>, dispatcher: AppActionDispatcher) -> Self {
        Self {
            backend,
            dispatcher,
        }
    }

    pub fn execute(&self, command: AppCommand) -> JoinHandle<()> {
        match command {
            AppCommand::ResolveModel {
                fence,
                cancel_token,
            } => self.spawn_model_resolution(fence, cancel_token),
            AppCommand::SendChat(params) => self.spawn_chat(params),
            AppCommand::GenerateTitle(params) => self.spawn_title(params),
            AppCommand::RefreshModels => self.spawn_model_refresh(),
        }
    }

    pub fn execute_all(&self, commands: impl IntoIterator<Item = AppCommand>) {
        for command in commands {
            self.execute(command);
        }
    }

    fn spawn_model_resolution(
        &self,
        fence: RequestFence,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let result = cancellable(&cancel_token, backend.loaded_model()).await;
            dispatcher.dispatch(AppAction::ModelResolved { fence, result });
        })
    }

    fn spawn_chat(&self, params: ChatParams) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let ChatParams {
                fence,
                model,
                messages,
                system_prompt,
                cancel_token,
            } = params;

            let result = cancellable(
                &cancel_token,
                backend.send_chat(messages, &model, &system_prompt),
            )
            .await;
            debug!(
                request_id = fence.request_id,
                ok = result.is_ok(),
                "Chat task finished"
            );
            dispatcher.dispatch(AppAction::ChatCompleted { fence, result });
        })
    }

    fn spawn_title(&self, params: TitleParams) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let TitleParams { request, model } = params;
            let TitleRequest {
                session_id,
                messages,
                cancel_token,
            } = request;

            let result = cancellable(&cancel_token, async {
                let model = match model {
                    Some(model) => model,
                    None => backend
                        .loaded_model()
                        .await?
                        .ok_or(TransportError::NoModelLoaded)?,
                };
                backend
                    .send_title(messages, &model, TITLE_SYSTEM_PROMPT)
                    .await
            })
            .await;
            dispatcher.dispatch(AppAction::TitleCompleted { session_id, result });
        })
    }

    fn spawn_model_refresh(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let result = backend.list_models().await;
            dispatcher.dispatch(AppAction::ModelsLoaded { result });
        })
    }
}
