//! Best-effort session titles.
//!
//! After a session's first assistant reply the coordinator asks
//! [`TitleGenerator::begin`] for a request. The reply is cleaned up by
//! [`sanitize_title`]; any failure falls back to [`fallback_title`], so a
//! session that reached this point always ends up titled.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::api::ChatMessage;
use crate::core::message::ROLE_USER;
use crate::core::session::{Session, SessionId};
use crate::core::store::SessionStore;
use crate::core::transport::TransportError;

/// Fixed prompt for title requests; the session's own profile is not used.
pub const TITLE_SYSTEM_PROMPT: &str =
    "You label chat conversations. Answer with a short plain-text title and nothing else.";

const TITLE_INSTRUCTION: &str = "Write a short, neutral title of 3 to 6 words for the \
conversation excerpt below. Reply with the title only: no quotes, no prefix, no trailing \
punctuation.";

pub const MAX_TITLE_CHARS: usize = 60;
pub const FALLBACK_EXCERPT_CHARS: usize = 40;
const EXCERPT_CHARS: usize = 500;

const TITLE_PREFIXES: &[&str] = &[
    "conversation title:",
    "suggested title:",
    "chat title:",
    "title:",
];
const WRAPPERS: &[(&str, &str)] = &[
    ("**", "**"),
    ("__", "__"),
    ("```", "```"),
    ("`", "`"),
    ("\"", "\""),
    ("'", "'"),
    ("“", "”"),
    ("‘", "’"),
    ("«", "»"),
];
const QUOTE_CHARS: &[char] = &['"', '\'', '“', '”', '‘', '’', '«', '»', '`', '*'];
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '…', '-', '–', '—'];

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Peel one layer of prefix or wrapping. Returns `None` when nothing changed.
fn peel_once(text: &str) -> Option<&str> {
    for prefix in TITLE_PREFIXES {
        if let Some(rest) = strip_prefix_ignore_case(text, prefix) {
            return Some(rest.trim());
        }
    }
    for (open, close) in WRAPPERS {
        if text.len() >= open.len() + close.len() {
            if let Some(inner) = text
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                return Some(inner.trim());
            }
        }
    }
    None
}

/// Clean a raw model reply into a title, or `None` if nothing usable remains.
pub fn sanitize_title(raw: &str) -> Option<String> {
    let first_line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;

    let mut current = first_line;
    while let Some(peeled) = peel_once(current) {
        current = peeled;
    }

    let unquoted = current.trim_matches(|c: char| QUOTE_CHARS.contains(&c) || c.is_whitespace());
    let collapsed = collapse_whitespace(unquoted);
    let clamped = clamp_graphemes(&collapsed, MAX_TITLE_CHARS);
    let cleaned = clamped
        .trim_end_matches(|c: char| TRAILING_PUNCTUATION.contains(&c) || c.is_whitespace())
        .trim_matches(|c: char| QUOTE_CHARS.contains(&c) || c.is_whitespace());

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Deterministic title from the first user message, else a dated label.
pub fn fallback_title(session: &Session, now: DateTime<Utc>) -> String {
    let excerpt = session
        .first_user_message()
        .map(|message| collapse_whitespace(&message.content))
        .map(|text| clamp_graphemes(&text, FALLBACK_EXCERPT_CHARS).trim_end().to_string())
        .filter(|text| !text.is_empty());

    excerpt.unwrap_or_else(|| format!("Chat — {}", now.format("%Y-%m-%d %H:%M")))
}

/// The single user message sent for title generation.
pub fn build_title_messages(session: &Session) -> Vec<ChatMessage> {
    let user_text = session
        .first_user_message()
        .map(|m| clamp_graphemes(m.content.trim(), EXCERPT_CHARS))
        .unwrap_or_default();
    let assistant_text = session
        .first_assistant_message()
        .map(|m| clamp_graphemes(m.content.trim(), EXCERPT_CHARS))
        .unwrap_or_default();

    vec![ChatMessage::new(
        ROLE_USER,
        format!("{TITLE_INSTRUCTION}\n\nUser: {user_text}\n\nAssistant: {assistant_text}"),
    )]
}

#[derive(Debug, Clone)]
pub struct TitleRequest {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub cancel_token: CancellationToken,
}

/// Tracks which sessions have a title request in flight.
#[derive(Debug, Default)]
pub struct TitleGenerator {
    in_flight: HashMap<SessionId, CancellationToken>,
}

impl TitleGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, session_id: SessionId) -> bool {
        self.in_flight.contains_key(&session_id)
    }

    /// Start a title request if the session is untitled, has a reply, and
    /// nothing is already running for it.
    pub fn begin(&mut self, session: &Session) -> Option<TitleRequest> {
        let session_id = session.id();
        if session.title().is_some() || !session.has_assistant_reply() {
            return None;
        }
        if self.is_in_flight(session_id) {
            debug!(session_id = %session_id, "Title generation already in flight");
            return None;
        }

        let cancel_token = CancellationToken::new();
        self.in_flight.insert(session_id, cancel_token.clone());
        debug!(session_id = %session_id, "Title generation started");
        Some(TitleRequest {
            session_id,
            messages: build_title_messages(session),
            cancel_token,
        })
    }

    /// Cancel the request for a session that is going away.
    pub fn cancel(&mut self, session_id: SessionId) {
        if let Some(token) = self.in_flight.remove(&session_id) {
            token.cancel();
            debug!(session_id = %session_id, "Title generation cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, token) in self.in_flight.drain() {
            token.cancel();
        }
    }

    /// Apply a finished request. Returns the title that was assigned.
    ///
    /// Cancelled requests and sessions that vanished or got titled in the
    /// meantime are left alone.
    pub fn complete(
        &mut self,
        store: &mut SessionStore,
        session_id: SessionId,
        result: Result<String, TransportError>,
    ) -> Option<String> {
        let token = self.in_flight.remove(&session_id)?;
        if token.is_cancelled() || matches!(result, Err(TransportError::Cancelled)) {
            return None;
        }

        let session = store.session(session_id)?;
        if session.title().is_some() {
            return None;
        }

        let title = match result {
            Ok(raw) => sanitize_title(&raw),
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "Title request failed");
                None
            }
        }
        .unwrap_or_else(|| fallback_title(session, Utc::now()));

        if store.assign_title(session_id, title.clone()) {
            info!(session_id = %session_id, title = %title, "Session titled");
            Some(title)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;
    use crate::core::session::ProfileSnapshot;
    use chrono::TimeZone;

    fn answered_session(store: &mut SessionStore, question: &str) -> SessionId {
        let id = store.begin_session(ProfileSnapshot::new("Pirate", "Talk like a pirate."));
        store.append_message(id, Message::user(question));
        store.append_message(id, Message::assistant("Arr, here be the answer."));
        id
    }

    #[test]
    fn sanitize_strips_quotes_prefixes_and_wrapping() {
        assert_eq!(
            sanitize_title("\"Rust Borrow Checker Basics\"").as_deref(),
            Some("Rust Borrow Checker Basics")
        );
        assert_eq!(
            sanitize_title("Title: **Planning a Trip to Kyoto**").as_deref(),
            Some("Planning a Trip to Kyoto")
        );
        assert_eq!(
            sanitize_title("`Sorting   Algorithms\tCompared`.").as_deref(),
            Some("Sorting Algorithms Compared")
        );
        assert_eq!(
            sanitize_title("chat title: “Weekend Recipes”!").as_deref(),
            Some("Weekend Recipes")
        );
    }

    #[test]
    fn sanitize_uses_first_non_empty_line_and_clamps() {
        assert_eq!(
            sanitize_title("\n\nBudget Review\nExplanation: because...").as_deref(),
            Some("Budget Review")
        );
        let long = "word ".repeat(40);
        let title = sanitize_title(&long).expect("title");
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(!title.ends_with(' '));
    }

    #[test]
    fn sanitize_rejects_empty_results() {
        assert_eq!(sanitize_title(""), None);
        assert_eq!(sanitize_title("   \n  "), None);
        assert_eq!(sanitize_title("\"\""), None);
        assert_eq!(sanitize_title("Title: ..."), None);
    }

    #[test]
    fn fallback_uses_first_user_message_excerpt() {
        let mut store = SessionStore::new();
        let id = answered_session(
            &mut store,
            "How   do I configure a reverse proxy for my local model server?",
        );
        let title = fallback_title(store.session(id).expect("session"), Utc::now());
        assert_eq!(title, "How do I configure a reverse proxy for m");
        assert_eq!(title.chars().count(), FALLBACK_EXCERPT_CHARS);
    }

    #[test]
    fn fallback_without_user_message_is_dated() {
        let mut store = SessionStore::new();
        let id = store.begin_session(ProfileSnapshot::new("A", ""));
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let title = fallback_title(store.session(id).expect("session"), now);
        assert_eq!(title, "Chat — 2024-03-09 14:05");
    }

    #[test]
    fn title_prompt_is_profile_agnostic_excerpt() {
        let mut store = SessionStore::new();
        let id = answered_session(&mut store, "Where is the treasure?");
        let messages = build_title_messages(store.session(id).expect("session"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert!(messages[0].content.contains("User: Where is the treasure?"));
        assert!(messages[0].content.contains("Assistant: Arr, here be the answer."));
        assert!(!messages[0].content.contains("pirate."));
    }

    #[test]
    fn begin_requires_reply_and_guards_duplicates() {
        let mut store = SessionStore::new();
        let mut generator = TitleGenerator::new();

        let bare = store.begin_session(ProfileSnapshot::new("A", ""));
        store.append_message(bare, Message::user("Hello"));
        assert!(generator.begin(store.session(bare).expect("session")).is_none());

        let id = answered_session(&mut store, "Hello");
        assert!(generator.begin(store.session(id).expect("session")).is_some());
        assert!(generator.is_in_flight(id));
        assert!(generator.begin(store.session(id).expect("session")).is_none());
    }

    #[test]
    fn failure_resolves_to_fallback() {
        let mut store = SessionStore::new();
        let mut generator = TitleGenerator::new();
        let id = answered_session(&mut store, "Where is the treasure?");
        generator.begin(store.session(id).expect("session"));

        let title = generator.complete(
            &mut store,
            id,
            Err(TransportError::Unreachable("connection refused".into())),
        );

        assert_eq!(title.as_deref(), Some("Where is the treasure?"));
        assert_eq!(store.session(id).and_then(Session::title), Some("Where is the treasure?"));
        assert!(!generator.is_in_flight(id));
    }

    #[test]
    fn existing_title_is_never_overwritten() {
        let mut store = SessionStore::new();
        let mut generator = TitleGenerator::new();
        let id = answered_session(&mut store, "Hello");
        generator.begin(store.session(id).expect("session"));
        store.assign_title(id, "Set elsewhere".into());
        let stamped = store.session(id).and_then(Session::title_generated_at);

        assert_eq!(
            generator.complete(&mut store, id, Ok("Generated".into())),
            None
        );
        let session = store.session(id).expect("session");
        assert_eq!(session.title(), Some("Set elsewhere"));
        assert_eq!(session.title_generated_at(), stamped);
        assert!(generator.begin(session).is_none());
    }

    #[test]
    fn cancelled_request_leaves_session_untitled() {
        let mut store = SessionStore::new();
        let mut generator = TitleGenerator::new();
        let id = answered_session(&mut store, "Hello");
        let request = generator.begin(store.session(id).expect("session")).expect("request");

        generator.cancel(id);
        assert!(request.cancel_token.is_cancelled());
        assert_eq!(generator.complete(&mut store, id, Ok("Late".into())), None);
        assert_eq!(store.session(id).and_then(Session::title), None);
    }

    #[test]
    fn result_for_deleted_session_is_dropped() {
        let mut store = SessionStore::new();
        let mut generator = TitleGenerator::new();
        let id = answered_session(&mut store, "Hello");
        generator.begin(store.session(id).expect("session"));
        store.delete_session(id);

        assert_eq!(generator.complete(&mut store, id, Ok("Orphan".into())), None);
        assert!(!generator.is_in_flight(id));
    }
}
