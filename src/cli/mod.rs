//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod model_list;
pub mod session_list;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::chat::run_chat;
use crate::cli::model_list::list_models;
use crate::cli::session_list::list_sessions;
use crate::core::config::defaults::CONFIG_KEYS;
use crate::core::config::orchestrator::ConfigOrchestrator;
use crate::core::config::{Config, ConfigError, Profile};
use crate::utils::logging::init_logging;
use crate::utils::url::normalize_base_url;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    " with rustc ",
    env!("VERGEN_RUSTC_SEMVER"),
    ")"
);

#[derive(Parser)]
#[command(name = "parlor", version, long_version = LONG_VERSION)]
#[command(about = "A session-aware chat client for local OpenAI-compatible servers")]
#[command(
    long_about = "Parlor keeps a list of chat sessions with a local OpenAI-compatible server \
(LM Studio, llama.cpp, Ollama and friends). Sessions are saved between runs and get a \
short title after the first reply.\n\n\
Profiles:\n\
  parlor profile add Coder \"Answer with code only.\"\n\
  parlor profile list\n\
  parlor profile remove Coder\n\n\
Environment Variables:\n\
  PARLOR_LOG        Log filter, e.g. \"parlor=debug\" (falls back to RUST_LOG)\n\n\
Commands inside a chat:\n\
  /new [profile]    Start a new session\n\
  /sessions         List sessions, most recent first\n\
  /switch <n>       Switch to session n\n\
  /delete <n>       Delete session n\n\
  /retry            Re-send the last message\n\
  /stop             Stop waiting for the reply\n\
  /models           Refresh the server's model list\n\
  /help             Show this list\n\
  /quit             Save and exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server base URL, e.g. http://localhost:1234
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to use instead of the one the server reports as loaded
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Profile for new sessions
    #[arg(short = 'p', long, global = true, value_name = "PROFILE")]
    pub profile: Option<String>,

    /// Sessions file to use instead of the one in the data directory
    #[arg(long, global = true, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Write diagnostic logs to this file instead of stderr
    #[arg(short = 'l', long, global = true, value_name = "PATH")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List models the server reports
    Models,
    /// List saved sessions, most recent first
    Sessions,
    /// Set configuration values, or show them all when no value is given
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Manage the profiles new sessions can start from
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ProfileCommands {
    /// List configured profiles (the default is marked with *)
    List,
    /// Add a profile, or replace the system prompt of an existing one
    Add {
        /// Profile name
        name: String,
        /// System prompt for sessions started with this profile
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
    /// Remove a profile
    Remove {
        /// Profile name
        name: String,
    },
}

impl Args {
    /// Fold command-line overrides into the loaded configuration.
    ///
    /// The result is used for this run only and never saved.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(normalize_base_url(base_url));
        }
        if let Some(model) = self.model.as_deref().map(str::trim) {
            config.model = Some(model.to_string()).filter(|m| !m.is_empty());
        }
        if let Some(profile) = &self.profile {
            config.default_profile = Some(profile.clone());
        }
        if let Some(path) = &self.state_file {
            config.state_file = Some(path.clone());
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|err| format!("Failed to start the async runtime: {err}"))?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let mut args = Args::parse();
    init_logging(args.log.as_deref())?;

    let orchestrator = ConfigOrchestrator::for_default_path()?;

    match args.command.take().unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            if value.is_empty() {
                orchestrator.load_with_cache()?.print_all();
                return Ok(());
            }
            let value = value.join(" ");
            match orchestrator.mutate(|config| config.set_value(&key, &value)) {
                Ok(()) => println!("✅ Set {key} to: {value}"),
                Err(err) => exit_with_config_error(&err),
            }
            Ok(())
        }
        Commands::Unset { key } => {
            match orchestrator.mutate(|config| config.unset_value(&key)) {
                Ok(()) => println!("✅ Unset {key}"),
                Err(err) => exit_with_config_error(&err),
            }
            Ok(())
        }
        Commands::Profile { command } => {
            run_profile_command(&orchestrator, command)?;
            Ok(())
        }
        Commands::Models => {
            let mut config = orchestrator.load_with_cache()?;
            args.apply_overrides(&mut config);
            list_models(&config).await
        }
        Commands::Sessions => {
            let mut config = orchestrator.load_with_cache()?;
            args.apply_overrides(&mut config);
            list_sessions(&config)
        }
        Commands::Chat => {
            let mut config = orchestrator.load_with_cache()?;
            args.apply_overrides(&mut config);
            run_chat(config, args.profile.is_some()).await
        }
    }
}

fn run_profile_command(
    orchestrator: &ConfigOrchestrator,
    command: ProfileCommands,
) -> Result<(), ConfigError> {
    match command {
        ProfileCommands::List => {
            orchestrator.load_with_cache()?.print_profiles();
        }
        ProfileCommands::Add { name, prompt } => {
            let name = name.trim().to_string();
            let prompt = prompt.join(" ");
            let result = orchestrator.mutate(|config| {
                config.upsert_profile(Profile::new(name.clone(), prompt));
                Ok(())
            });
            match result {
                Ok(()) => println!("✅ Saved profile {name}"),
                Err(err) => exit_with_config_error(&err),
            }
        }
        ProfileCommands::Remove { name } => {
            let result = orchestrator.mutate(|config| {
                if config.remove_profile(&name) {
                    Ok(())
                } else {
                    Err(ConfigError::UnknownProfile(name.clone()))
                }
            });
            match result {
                Ok(()) => println!("✅ Removed profile {name}"),
                Err(err) => exit_with_config_error(&err),
            }
        }
    }
    Ok(())
}

fn exit_with_config_error(err: &ConfigError) -> ! {
    eprintln!("❌ {err}");
    if matches!(err, ConfigError::UnknownKey(_)) {
        eprintln!("Known keys: {}", CONFIG_KEYS.join(", "));
    }
    std::process::exit(1);
}
