//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// The session working directory does not exist.
    DirectoryNotFound(String),
    /// The assistant CLI could not be launched.
    ProcessSpawn(String),
    /// An attempt exceeded its time budget while not awaiting a decision.
    ReadTimeout(Duration),
    /// A write to the pseudo-terminal did not complete within its deadline.
    WriteTimeout(Duration),
    /// The restart budget was consumed by repeated authorization denials.
    AuthorizationExhausted(String),
    /// A decision request is already open for the session.
    RequestAlreadyPending(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::DirectoryNotFound(path) => write!(f, "directory not found: {path}"),
            Self::ProcessSpawn(msg) => write!(f, "failed to launch assistant CLI: {msg}"),
            Self::ReadTimeout(limit) => {
                write!(f, "session timed out after {}s", limit.as_secs())
            }
            Self::WriteTimeout(limit) => {
                write!(f, "terminal write timed out after {}ms", limit.as_millis())
            }
            Self::AuthorizationExhausted(denial) => {
                write!(f, "max retries exceeded: {denial}")
            }
            Self::RequestAlreadyPending(id) => {
                write!(f, "a decision request is already pending: {id}")
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
