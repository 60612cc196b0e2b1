//! Error type shared by every command.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlddtError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed structure, FASTA or table content.
    #[error("parse error: {0}")]
    Parse(String),

    /// Bad arguments or inputs that cannot be processed at all.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PlddtError>;
