use crate::core::config::data::Config;
use crate::core::config::io::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

#[derive(Default)]
struct ConfigCacheState {
    config: Option<Config>,
    modified: Option<SystemTime>,
}

/// Cached access to one config file.
///
/// The cache is refreshed whenever the file's modification time changes, so
/// edits made by another `parlor set` are picked up.
pub struct ConfigOrchestrator {
    path: PathBuf,
    state: Mutex<ConfigCacheState>,
}

impl ConfigOrchestrator {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(ConfigCacheState::default()),
        }
    }

    /// Orchestrator for the platform config file.
    pub fn for_default_path() -> Result<Self, ConfigError> {
        Ok(Self::new(Config::default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_with_cache(&self) -> Result<Config, ConfigError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::refresh(&self.path, &mut state)?;
        Ok(state.config.clone().unwrap_or_default())
    }

    pub fn persist(&self, config: Config) -> Result<(), ConfigError> {
        config.save_to_path(&self.path)?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.modified = Self::modified_time(&self.path);
        state.config = Some(config);
        Ok(())
    }

    /// Load, apply `mutator`, and save. Nothing is written if it fails.
    pub fn mutate<F, T>(&self, mutator: F) -> Result<T, ConfigError>
    where
        F: FnOnce(&mut Config) -> Result<T, ConfigError>,
    {
        let mut working = self.load_with_cache()?;
        let result = mutator(&mut working)?;
        self.persist(working)?;
        Ok(result)
    }

    fn refresh(path: &Path, state: &mut ConfigCacheState) -> Result<(), ConfigError> {
        let disk_modified = Self::modified_time(path);
        if state.config.is_none() || state.modified != disk_modified {
            state.config = Some(Config::load_from_path(path)?);
            state.modified = disk_modified;
        }
        Ok(())
    }

    fn modified_time(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).ok()?.modified().ok()
    }
}
