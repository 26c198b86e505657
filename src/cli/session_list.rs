//! `parlor sessions`: print the saved sessions without starting a chat.

use std::error::Error;

use crate::commands::describe_session;
use crate::core::config::{path_display, Config};
use crate::core::persistence::{load_state, LoadSource};
use crate::core::store::SessionStore;

pub fn list_sessions(config: &Config) -> Result<(), Box<dyn Error>> {
    let path = config.state_path()?;
    let outcome = load_state(&path);

    if let LoadSource::Quarantined { moved_to } = &outcome.source {
        match moved_to {
            Some(moved_to) => eprintln!(
                "⚠️  {} could not be read and was moved to {}",
                path_display(&path),
                path_display(moved_to)
            ),
            None => eprintln!("⚠️  {} could not be read", path_display(&path)),
        }
    }

    let store = SessionStore::from_state(outcome.state);
    let sessions = store.sessions_by_recency();
    if sessions.is_empty() {
        println!("No sessions in {}", path_display(&path));
        return Ok(());
    }

    println!("💬 Sessions in {}", path_display(&path));
    println!();
    let active = store.active_session_id();
    for (index, session) in sessions.iter().enumerate() {
        println!(
            "{}",
            describe_session(index + 1, session, Some(session.id()) == active)
        );
    }
    Ok(())
}
