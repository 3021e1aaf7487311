//! Error type shared by the session engine components

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("session store error: {0}")]
    Store(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
