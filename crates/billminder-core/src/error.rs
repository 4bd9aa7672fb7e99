//! Error type shared by all BillMinder crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillMinderError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BillMinderError>;
