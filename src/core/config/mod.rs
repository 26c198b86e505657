//! User configuration stored as TOML in the platform config directory.

pub mod data;
pub mod defaults;
pub mod io;
pub mod orchestrator;
pub mod printing;

pub use data::{path_display, Config, Profile};
pub use io::ConfigError;

#[cfg(test)]
mod tests;
