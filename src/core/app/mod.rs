//! The request coordinator.
//!
//! [`App`] is the single writer of session state. Background work (chat
//! requests, model discovery, title generation) runs in tasks spawned by the
//! executor, which report back as [`AppAction`]s. Every request carries a
//! [`RequestFence`](crate::core::store::RequestFence); a completion whose
//! fence no longer matches the tracked request and the focused session is
//! dropped without touching anything.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::session::{ProfileSnapshot, Session, SessionId};
use crate::core::store::{RequestStatus, RuntimeState, SessionStore};
use crate::core::title::TitleGenerator;

pub mod actions;
mod request_state;

pub use actions::{
    apply_action, apply_actions, AppAction, AppActionDispatcher, AppCommand, ChatParams,
    TitleParams,
};

pub struct App {
    pub(crate) store: SessionStore,
    pub(crate) titles: TitleGenerator,
    model: Option<String>,
    model_pinned: bool,
    available_models: Vec<String>,
    next_request_id: u64,
    cancel_token: Option<CancellationToken>,
}

impl App {
    /// `configured_model` pins the model; otherwise it is discovered from
    /// the server and may change between requests.
    pub fn new(store: SessionStore, configured_model: Option<String>) -> Self {
        let model_pinned = configured_model.is_some();
        Self {
            store,
            titles: TitleGenerator::new(),
            model: configured_model,
            model_pinned,
            available_models: Vec::new(),
            next_request_id: 0,
            cancel_token: None,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn runtime(&self) -> &RuntimeState {
        self.store.runtime()
    }

    pub fn status(&self) -> RequestStatus {
        self.store.runtime().status
    }

    pub fn is_sending(&self) -> bool {
        self.store.runtime().is_sending
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.store.active_session()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Model ids from the most recent refresh, in server order.
    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub(crate) fn set_available_models(&mut self, models: Vec<String>) {
        self.available_models = models;
    }

    /// Record a discovery result. A pinned model is never replaced.
    pub fn set_discovered_model(&mut self, model: Option<String>) {
        if self.model_pinned {
            return;
        }
        if self.model != model {
            debug!(model = ?model, "Loaded model changed");
        }
        self.model = model;
    }

    pub fn begin_session(&mut self, profile: ProfileSnapshot) -> SessionId {
        self.store.begin_session(profile)
    }

    /// Focus another session. A request still running for the previous one
    /// keeps going but its result will fail the fence.
    pub fn select_session(&mut self, id: SessionId) -> bool {
        self.store.select_session(id)
    }

    /// Delete a session and cancel its title request.
    ///
    /// Returns `true` if it was focused; the caller must then begin a new one.
    pub fn delete_session(&mut self, id: SessionId) -> bool {
        self.titles.cancel(id);
        self.store.delete_session(id)
    }

    /// Stop background work and write the final snapshot.
    pub async fn shutdown(&mut self) {
        self.titles.cancel_all();
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        if let Err(err) = self.store.flush().await {
            tracing::warn!(error = %err, "Final save failed");
        }
    }
}
