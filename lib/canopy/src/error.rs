//! Canopy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected form: expected {expected}, got {got}")]
    UnexpectedForm {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Registrar returned error: {status} - {message}")]
    Registrar { status: u16, message: String },

    #[error("No reachable leading registrar")]
    NoLeadingRegistrar,
}
