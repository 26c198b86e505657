use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named system prompt that new sessions snapshot at creation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Server base URL, e.g. "http://localhost:1234"
    pub base_url: Option<String>,
    /// Explicit model id. When unset the server's loaded model is discovered.
    pub model: Option<String>,
    /// Profile used for new sessions when none is named
    pub default_profile: Option<String>,
    pub chat_timeout_secs: Option<u64>,
    pub title_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    /// `-1` or unset leaves the limit to the server
    pub max_tokens: Option<i32>,
    pub save_debounce_ms: Option<u64>,
    /// Overrides the default sessions file in the data directory
    pub state_file: Option<PathBuf>,
    /// Kept last so it serializes as trailing `[[profiles]]` tables
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Get a user-friendly display string for a path
///
/// Paths under `$HOME` are shown with `~` on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

impl Config {
    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Insert or replace a profile by name.
    pub fn upsert_profile(&mut self, profile: Profile) {
        match self
            .profiles
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&profile.name))
        {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    /// Remove a profile by name, clearing the default if it pointed there.
    pub fn remove_profile(&mut self, name: &str) -> bool {
        let before = self.profiles.len();
        self.profiles.retain(|p| !p.name.eq_ignore_ascii_case(name));
        if self.profiles.len() == before {
            return false;
        }
        if self
            .default_profile
            .as_deref()
            .is_some_and(|default| default.eq_ignore_ascii_case(name))
        {
            self.default_profile = None;
        }
        true
    }
}
