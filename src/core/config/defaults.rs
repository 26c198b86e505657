use std::path::PathBuf;
use std::time::Duration;

use crate::core::config::data::{Config, Profile};
use crate::core::config::io::ConfigError;
use crate::core::persistence::DEFAULT_SAVE_DEBOUNCE;
use crate::core::session::ProfileSnapshot;
use crate::core::transport::TransportOptions;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";
pub const DEFAULT_PROFILE_NAME: &str = "Default";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Keys accepted by `parlor set` and `parlor unset`.
pub const CONFIG_KEYS: &[&str] = &[
    "base-url",
    "model",
    "default-profile",
    "chat-timeout",
    "title-timeout",
    "temperature",
    "max-tokens",
    "save-debounce-ms",
    "state-file",
];

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl Config {
    pub fn base_url(&self) -> String {
        normalize_base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
    }

    pub fn chat_timeout(&self) -> Duration {
        self.chat_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(TransportOptions::default().chat_timeout)
    }

    pub fn title_timeout(&self) -> Duration {
        self.title_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(TransportOptions::default().title_timeout)
    }

    pub fn save_debounce(&self) -> Duration {
        self.save_debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SAVE_DEBOUNCE)
    }

    pub fn transport_options(&self) -> TransportOptions {
        let defaults = TransportOptions::default();
        TransportOptions {
            chat_timeout: self.chat_timeout(),
            title_timeout: self.title_timeout(),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.filter(|tokens| *tokens > 0),
            ..defaults
        }
    }

    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Config::default_state_path(),
        }
    }

    /// Snapshot for a new session.
    ///
    /// `name` falls back to `default_profile`, then to the built-in
    /// assistant profile. A name that matches nothing is an error.
    pub fn resolve_profile(&self, name: Option<&str>) -> Result<ProfileSnapshot, ConfigError> {
        let requested = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or(self.default_profile.as_deref());

        let profile = match requested {
            Some(name) => match self.get_profile(name) {
                Some(profile) => profile.clone(),
                None if name.eq_ignore_ascii_case(DEFAULT_PROFILE_NAME) => builtin_profile(),
                None => return Err(ConfigError::UnknownProfile(name.to_string())),
            },
            None => self
                .profiles
                .first()
                .cloned()
                .unwrap_or_else(builtin_profile),
        };
        Ok(ProfileSnapshot::new(profile.name, profile.system_prompt))
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match key {
            "base-url" => self.base_url = Some(normalize_base_url(value)),
            "model" => self.model = Some(value.to_string()),
            "default-profile" => {
                if self.get_profile(value).is_none()
                    && !value.eq_ignore_ascii_case(DEFAULT_PROFILE_NAME)
                {
                    return Err(ConfigError::UnknownProfile(value.to_string()));
                }
                self.default_profile = Some(value.to_string());
            }
            "chat-timeout" => self.chat_timeout_secs = Some(parse_value(key, value)?),
            "title-timeout" => self.title_timeout_secs = Some(parse_value(key, value)?),
            "temperature" => self.temperature = Some(parse_value(key, value)?),
            "max-tokens" => self.max_tokens = Some(parse_value(key, value)?),
            "save-debounce-ms" => self.save_debounce_ms = Some(parse_value(key, value)?),
            "state-file" => self.state_file = Some(PathBuf::from(value)),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "base-url" => self.base_url = None,
            "model" => self.model = None,
            "default-profile" => self.default_profile = None,
            "chat-timeout" => self.chat_timeout_secs = None,
            "title-timeout" => self.title_timeout_secs = None,
            "temperature" => self.temperature = None,
            "max-tokens" => self.max_tokens = None,
            "save-debounce-ms" => self.save_debounce_ms = None,
            "state-file" => self.state_file = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn builtin_profile() -> Profile {
    Profile::new(DEFAULT_PROFILE_NAME, DEFAULT_SYSTEM_PROMPT)
}
