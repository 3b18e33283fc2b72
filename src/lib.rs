#![forbid(unsafe_code)]

//! Run an interactive coding-assistant CLI per chat channel, pausing for
//! human authorization and clarification and restarting the CLI when a
//! denied tool is granted after the fact.

pub mod commands;
pub mod config;
pub mod console;
pub mod driver;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod protocol;
pub mod terminal;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
