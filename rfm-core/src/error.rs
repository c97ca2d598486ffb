use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RfmError>;

#[derive(Debug, Error)]
pub enum RfmError {
    #[error("path \"{0}\" is not reachable on this host")]
    NonLocalPath(String),

    #[error("entry \"{0}\" already exists in the table")]
    DuplicateName(String),

    #[error("transfer from \"{from}\" to \"{to}\" failed: {detail}")]
    Transfer {
        from: String,
        to: String,
        detail: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("no registered table is reachable on this host")]
    NoLocalReplica,

    #[error("{} worker task(s) failed; first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Worker(Vec<RfmError>),

    #[error("{0}")]
    Format(String),
}

impl From<serde_json::Error> for RfmError {
    fn from(e: serde_json::Error) -> Self {
        RfmError::Format(e.to_string())
    }
}
