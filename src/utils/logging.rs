//! Diagnostic logging setup.
//!
//! Filters come from `PARLOR_LOG`, then `RUST_LOG`, then default to `warn`.
//! Output goes to stderr unless a log file is given, in which case lines are
//! appended to it without ANSI colors.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PARLOR_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";

/// Build the filter from the environment.
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV_VAR)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .unwrap_or_default();
    filter_from(&directives)
}

fn filter_from(directives: &str) -> EnvFilter {
    if directives.trim().is_empty() {
        return EnvFilter::new(DEFAULT_DIRECTIVE);
    }
    EnvFilter::try_new(directives).unwrap_or_else(|err| {
        eprintln!("Ignoring invalid log filter {directives:?}: {err}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}

/// Open (or create) `path` for appending log lines.
pub fn open_log_file(path: &Path) -> Result<File, Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false);

    let installed = match log_file {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}
