pub mod app;
pub mod config;
pub mod executor;
pub mod message;
pub mod persistence;
pub mod session;
pub mod store;
pub mod title;
pub mod transport;
