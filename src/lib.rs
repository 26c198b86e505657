//! Parlor is a session-aware client for local OpenAI-compatible chat servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session store, its persistence, the request
//!   coordinator that fences stale completions, and title generation.
//! - [`api`] defines the chat and model payloads exchanged with the server.
//! - [`commands`] implements slash-command parsing for the chat driver.
//! - [`cli`] parses arguments and runs the line-oriented chat loop.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which loads configuration and dispatches
//! into [`cli::chat::run_chat`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
