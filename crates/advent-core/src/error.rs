use std::process::ExitStatus;

use thiserror::Error;

use crate::session::SessionState;

/// Errors produced by the adventure session engine.
#[derive(Debug, Error)]
pub enum AdventError {
    #[error("failed to spawn game process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("game process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("game process already started")]
    AlreadyStarted,

    #[error("game process not started")]
    NotStarted,

    #[error("game process already closed")]
    ProcessClosed,

    #[error("write to game process failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("save dialog ended before {0}")]
    SaveDialog(&'static str),

    #[error("timeout")]
    Timeout,

    #[error("game process exited with {0}")]
    Exited(ExitStatus),

    #[error("already expired, create a new session instead")]
    Expired,

    #[error("invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AdventError {
    /// Whether the caller should create a fresh session instead of retrying.
    pub fn is_expired(&self) -> bool {
        matches!(self, AdventError::Expired)
    }
}

pub type AdventResult<T> = Result<T, AdventError>;
