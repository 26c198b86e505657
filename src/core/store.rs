//! Authoritative in-memory model: the ordered session list, the active
//! pointer and the runtime request flags.
//!
//! Every mutation of persisted data schedules a save on the attached
//! [`PersistenceGateway`] and bumps a revision on a watch channel so
//! observers can re-read snapshots instead of holding live references.

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::message::Message;
use crate::core::persistence::{
    LoadOutcome, PersistedState, PersistenceError, PersistenceGateway, CURRENT_SCHEMA_VERSION,
};
use crate::core::session::{ProfileSnapshot, Session, SessionId};
use crate::core::transport::TransportErrorKind;

/// Identity of one logical request: which attempt, for which session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestFence {
    pub request_id: u64,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    Sending,
    Done,
    Error,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Request flags that live only in memory and reset on load and on switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    pub status: RequestStatus,
    pub is_sending: bool,
    pub is_typing: bool,
    pub in_flight: Option<RequestFence>,
    pub last_error: Option<LastError>,
    pub status_text: Option<String>,
}

impl RuntimeState {
    pub fn is_idle_baseline(&self) -> bool {
        *self == RuntimeState::default()
    }
}

pub struct SessionStore {
    sessions: Vec<Session>,
    active_session_id: Option<SessionId>,
    runtime: RuntimeState,
    persistence: Option<PersistenceGateway>,
    revision: watch::Sender<u64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            sessions: Vec::new(),
            active_session_id: None,
            runtime: RuntimeState::default(),
            persistence: None,
            revision,
        }
    }

    /// Restore from a loaded snapshot. Runtime flags always start idle.
    pub fn from_state(state: PersistedState) -> Self {
        let mut store = Self::new();
        store.sessions = state.sessions;
        store.active_session_id = state.active_session_id;
        store
    }

    /// Load through `gateway` and keep it attached for later saves.
    ///
    /// A file decoded by a legacy strategy is re-saved right away so it is
    /// upgraded to the current encoding. When an unreadable file could not be
    /// set aside the gateway is dropped and nothing is saved this run.
    pub fn load(gateway: PersistenceGateway) -> (Self, LoadOutcome) {
        let outcome = gateway.load();
        let mut store = Self::from_state(outcome.state.clone());
        if !outcome.saves_allowed() {
            warn!(
                path = %gateway.path().display(),
                "State file left in place; changes will not be saved this run"
            );
            return (store, outcome);
        }
        store.persistence = Some(gateway);
        if outcome.needs_upgrade() {
            info!("Upgrading state file to current encoding");
            store.schedule_save();
        }
        (store, outcome)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Sessions ordered by most recent activity first.
    pub fn sessions_by_recency(&self) -> Vec<&Session> {
        let mut sorted: Vec<&Session> = self.sessions.iter().collect();
        sorted.sort_by(|a, b| b.last_activity_at().cmp(&a.last_activity_at()));
        sorted
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id() == id)
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|session| session.id() == id)
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.active_session_id
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_session_id.and_then(|id| self.session(id))
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// Mutate runtime flags. Not persisted, but observers are notified.
    pub fn update_runtime(&mut self, update: impl FnOnce(&mut RuntimeState)) {
        update(&mut self.runtime);
        self.notify();
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            schema_version: CURRENT_SCHEMA_VERSION,
            active_session_id: self.active_session_id,
            sessions: self.sessions.clone(),
        }
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn schedule_save(&mut self) {
        self.notify();
        let snapshot = self.snapshot();
        if let Some(gateway) = self.persistence.as_mut() {
            gateway.schedule_save(snapshot);
        }
    }

    fn save_now(&mut self) {
        self.notify();
        let snapshot = self.snapshot();
        if let Some(gateway) = self.persistence.as_mut() {
            gateway.save_now(snapshot);
        }
    }

    /// Write the current snapshot and wait for it, e.g. on shutdown.
    pub async fn flush(&mut self) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot();
        match self.persistence.as_mut() {
            Some(gateway) => gateway.flush(snapshot).await,
            None => Ok(()),
        }
    }

    fn reset_runtime(&mut self) {
        self.runtime = RuntimeState::default();
    }

    /// Append a new session and focus it.
    pub fn begin_session(&mut self, profile: ProfileSnapshot) -> SessionId {
        let session = Session::new(profile);
        let id = session.id();
        info!(session_id = %id, profile = session.profile().profile_name(), "Session created");
        self.sessions.push(session);
        self.active_session_id = Some(id);
        self.reset_runtime();
        self.schedule_save();
        id
    }

    /// Focus `id`. Unknown ids are ignored; re-selecting the focused
    /// session keeps its in-flight request.
    pub fn select_session(&mut self, id: SessionId) -> bool {
        if self.session(id).is_none() {
            debug!(session_id = %id, "Ignoring selection of unknown session");
            return false;
        }
        if self.active_session_id == Some(id) {
            return true;
        }
        self.active_session_id = Some(id);
        self.reset_runtime();
        self.schedule_save();
        true
    }

    /// Remove a session and persist immediately.
    ///
    /// Returns whether it was the focused session. In that case the active
    /// pointer is cleared and the caller must begin a replacement.
    pub fn delete_session(&mut self, id: SessionId) -> bool {
        let Some(index) = self.sessions.iter().position(|session| session.id() == id) else {
            return false;
        };
        self.sessions.remove(index);
        let was_active = self.active_session_id == Some(id);
        if was_active {
            self.active_session_id = None;
            self.reset_runtime();
        }
        info!(session_id = %id, was_active, "Session deleted");
        self.save_now();
        was_active
    }

    pub fn touch(&mut self, id: SessionId) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        session.touch();
        self.schedule_save();
        true
    }

    /// Append to a session's transcript, updating its activity timestamp.
    pub fn append_message(&mut self, id: SessionId, message: Message) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        session.push_message(message);
        self.schedule_save();
        true
    }

    /// Set a session's title if it is still untitled.
    pub fn assign_title(&mut self, id: SessionId, title: String) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        if !session.assign_title(title, Utc::now()) {
            return false;
        }
        self.schedule_save();
        true
    }
}
