//! Durable JSON snapshots of the session store.
//!
//! The gateway never touches live sessions: callers hand it an owned
//! [`PersistedState`] snapshot. Writes go through a temp file in the target
//! directory followed by a rename, and run on the blocking pool so a slow
//! disk never stalls state changes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::message::{Message, MessageRole};
use crate::core::session::{ProfileSnapshot, Session, SessionId};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const LEGACY_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(350);

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the epoch used
/// by schema-1 numeric timestamps.
const REFERENCE_EPOCH_UNIX_SECS: i64 = 978_307_200;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Background write failed: {0}")]
    Task(String),
}

/// The on-disk envelope. Runtime-only request state is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub schema_version: u32,
    #[serde(rename = "activeSessionID", default)]
    pub active_session_id: Option<SessionId>,
    pub sessions: Vec<Session>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            active_session_id: None,
            sessions: Vec::new(),
        }
    }
}

impl PersistedState {
    /// Point `active_session_id` at a loaded session.
    ///
    /// A dangling or missing pointer falls back to the most recently active
    /// session, then the first session, then none.
    fn heal_active_session(&mut self) {
        let valid = self
            .active_session_id
            .is_some_and(|id| self.sessions.iter().any(|session| session.id == id));
        if valid {
            return;
        }

        let healed = self
            .sessions
            .iter()
            .fold(None::<&Session>, |best, session| match best {
                Some(current) if current.last_activity_at >= session.last_activity_at => {
                    Some(current)
                }
                _ => Some(session),
            })
            .or_else(|| self.sessions.first())
            .map(|session| session.id);

        if self.active_session_id.is_some() {
            warn!(
                dangling = ?self.active_session_id,
                healed = ?healed,
                "Active session pointer did not match any session"
            );
        }
        self.active_session_id = healed;
    }
}

mod legacy {
    use super::*;
    use serde::de::Error as _;
    use serde::Deserializer;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct LegacyState {
        #[serde(rename = "activeSessionID", default)]
        active_session_id: Option<Uuid>,
        sessions: Vec<LegacySession>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LegacySession {
        id: Uuid,
        #[serde(deserialize_with = "reference_date")]
        created_at: DateTime<Utc>,
        #[serde(deserialize_with = "reference_date")]
        last_activity_at: DateTime<Utc>,
        profile_snapshot: ProfileSnapshot,
        #[serde(default)]
        messages: Vec<LegacyMessage>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default, deserialize_with = "optional_reference_date")]
        title_generated_at: Option<DateTime<Utc>>,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LegacyMessage {
        id: Uuid,
        role: MessageRole,
        content: String,
        #[serde(deserialize_with = "reference_date")]
        created_at: DateTime<Utc>,
    }

    /// Seconds since 2001-01-01, or `None` when not representable.
    pub(super) fn reference_timestamp(seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.floor();
        if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
            return None;
        }
        let nanos = ((seconds - whole) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
        let unix_secs = REFERENCE_EPOCH_UNIX_SECS.checked_add(whole as i64)?;
        DateTime::from_timestamp(unix_secs, nanos)
    }

    fn reference_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        reference_timestamp(seconds)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {seconds}")))
    }

    fn optional_reference_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            Some(seconds) => reference_timestamp(seconds)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {seconds}"))),
            None => Ok(None),
        }
    }

    impl From<LegacyState> for PersistedState {
        fn from(legacy: LegacyState) -> Self {
            PersistedState {
                schema_version: CURRENT_SCHEMA_VERSION,
                active_session_id: legacy.active_session_id,
                sessions: legacy.sessions.into_iter().map(Session::from).collect(),
            }
        }
    }

    impl From<LegacySession> for Session {
        fn from(legacy: LegacySession) -> Self {
            Session {
                id: legacy.id,
                created_at: legacy.created_at,
                last_activity_at: legacy.last_activity_at,
                profile_snapshot: legacy.profile_snapshot,
                messages: legacy
                    .messages
                    .into_iter()
                    .map(|message| Message {
                        id: message.id,
                        role: message.role,
                        content: message.content,
                        created_at: message.created_at,
                    })
                    .collect(),
                title: legacy.title,
                title_generated_at: legacy.title_generated_at,
            }
        }
    }
}

struct DecodeStrategy {
    name: &'static str,
    canonical: bool,
    decode: fn(&str) -> Result<PersistedState, serde_json::Error>,
}

fn decode_current(contents: &str) -> Result<PersistedState, serde_json::Error> {
    serde_json::from_str(contents)
}

fn decode_legacy(contents: &str) -> Result<PersistedState, serde_json::Error> {
    serde_json::from_str::<legacy::LegacyState>(contents).map(PersistedState::from)
}

/// Tried in order; the first success wins.
const DECODE_STRATEGIES: &[DecodeStrategy] = &[
    DecodeStrategy {
        name: "iso8601",
        canonical: true,
        decode: decode_current,
    },
    DecodeStrategy {
        name: "legacy-numeric",
        canonical: false,
        decode: decode_legacy,
    },
];

/// How the startup state was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// No state file yet.
    Missing,
    /// Decoded with the canonical encoding.
    Current,
    /// Decoded by a fallback strategy; a re-save upgrades the file.
    Upgraded { strategy: &'static str },
    /// Unreadable or empty file moved aside.
    Quarantined { moved_to: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub state: PersistedState,
    pub source: LoadSource,
}

impl LoadOutcome {
    fn empty(source: LoadSource) -> Self {
        Self {
            state: PersistedState::default(),
            source,
        }
    }

    pub fn needs_upgrade(&self) -> bool {
        matches!(self.source, LoadSource::Upgraded { .. })
    }

    /// False when an unreadable file is still in place with no copy aside,
    /// so writing would destroy the only copy.
    pub fn saves_allowed(&self) -> bool {
        !matches!(self.source, LoadSource::Quarantined { moved_to: None })
    }
}

/// Load the state file, recovering from every failure.
///
/// Never deletes the file and never returns an error: malformed content is
/// moved (or copied) next to the original and an empty state is returned.
pub fn load_state(path: &Path) -> LoadOutcome {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file; starting empty");
            return LoadOutcome::empty(LoadSource::Missing);
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "State file unreadable");
            return quarantine(path);
        }
    };

    for strategy in DECODE_STRATEGIES {
        match (strategy.decode)(&contents) {
            Ok(mut state) => {
                if state.sessions.is_empty() {
                    warn!(path = %path.display(), "State file has no sessions");
                    return quarantine(path);
                }
                state.schema_version = CURRENT_SCHEMA_VERSION;
                state.heal_active_session();
                info!(
                    path = %path.display(),
                    strategy = strategy.name,
                    sessions = state.sessions.len(),
                    "Loaded session state"
                );
                let source = if strategy.canonical {
                    LoadSource::Current
                } else {
                    LoadSource::Upgraded {
                        strategy: strategy.name,
                    }
                };
                return LoadOutcome { state, source };
            }
            Err(err) => {
                debug!(strategy = strategy.name, error = %err, "Decode strategy failed");
            }
        }
    }

    warn!(path = %path.display(), "State file could not be decoded");
    quarantine(path)
}

fn quarantine(path: &Path) -> LoadOutcome {
    let moved_to = match quarantine_path(path) {
        Some(target) => match fs::rename(path, &target) {
            Ok(()) => {
                warn!(
                    from = %path.display(),
                    to = %target.display(),
                    "Moved corrupt state file aside"
                );
                Some(target)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not move corrupt state file");
                match fs::copy(path, &target) {
                    Ok(_) => {
                        warn!(
                            from = %path.display(),
                            to = %target.display(),
                            "Copied corrupt state file aside"
                        );
                        Some(target)
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Could not copy corrupt state file");
                        None
                    }
                }
            }
        },
        None => None,
    };
    LoadOutcome::empty(LoadSource::Quarantined { moved_to })
}

fn quarantine_path(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let base = path.with_file_name(format!("{file_name}.corrupt-{stamp}"));
    if !base.exists() {
        return Some(base);
    }
    (1..1000)
        .map(|n| path.with_file_name(format!("{file_name}.corrupt-{stamp}-{n}")))
        .find(|candidate| !candidate.exists())
}

/// Write `state` to `path` via temp file and rename.
pub fn write_state_atomic(path: &Path, state: &PersistedState) -> Result<(), PersistenceError> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

    if let Some(dir) = parent {
        fs::create_dir_all(dir)?;
    }

    let contents = serde_json::to_string_pretty(state)?;
    let mut temp_file = match parent {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };

    temp_file.write_all(contents.as_bytes())?;
    temp_file.as_file_mut().sync_all()?;
    temp_file.persist(path)?;
    Ok(())
}

/// Serializes writes and drops snapshots older than the last one written.
struct SnapshotWriter {
    path: PathBuf,
    last_generation: Mutex<u64>,
}

impl SnapshotWriter {
    async fn write(
        &self,
        snapshot: PersistedState,
        generation: u64,
    ) -> Result<bool, PersistenceError> {
        let mut last = self.last_generation.lock().await;
        if generation <= *last {
            debug!(generation, last = *last, "Skipping stale snapshot");
            return Ok(false);
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_state_atomic(&path, &snapshot))
            .await
            .map_err(|err| PersistenceError::Task(err.to_string()))??;

        *last = generation;
        debug!(path = %self.path.display(), generation, "State written");
        Ok(true)
    }
}

/// Debounced, atomic persistence for the session store.
pub struct PersistenceGateway {
    writer: Arc<SnapshotWriter>,
    debounce: Duration,
    pending: Option<CancellationToken>,
    generation: u64,
}

impl PersistenceGateway {
    pub fn new(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            writer: Arc::new(SnapshotWriter {
                path: path.into(),
                last_generation: Mutex::new(0),
            }),
            debounce,
            pending: None,
            generation: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    pub fn load(&self) -> LoadOutcome {
        load_state(self.path())
    }

    fn cancel_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Arm (or re-arm) the single debounce slot with `snapshot`.
    pub fn schedule_save(&mut self, snapshot: PersistedState) {
        self.cancel_pending();
        let generation = self.next_generation();
        let token = CancellationToken::new();
        self.pending = Some(token.clone());

        let writer = Arc::clone(&self.writer);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(generation, "Debounced save superseded");
                }
                _ = tokio::time::sleep(debounce) => {
                    if let Err(err) = writer.write(snapshot, generation).await {
                        warn!(error = %err, "Debounced save failed");
                    }
                }
            }
        });
    }

    /// Write immediately, replacing any pending debounced save.
    pub fn save_now(&mut self, snapshot: PersistedState) -> JoinHandle<()> {
        self.cancel_pending();
        let generation = self.next_generation();
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            if let Err(err) = writer.write(snapshot, generation).await {
                warn!(error = %err, "Immediate save failed");
            }
        })
    }

    /// Write immediately and wait for the result.
    pub async fn flush(&mut self, snapshot: PersistedState) -> Result<(), PersistenceError> {
        self.cancel_pending();
        let generation = self.next_generation();
        self.writer.write(snapshot, generation).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests;
