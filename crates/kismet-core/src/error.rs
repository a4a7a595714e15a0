use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KismetError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    ExternalService(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Unable to process response: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File error: {0}")]
    File(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    Render(#[from] askama::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Coarse classification of a failure, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ExternalServiceFailure,
    EmptyResult,
    ParseFailure,
    PersistenceFailure,
    Configuration,
}

/// Message shown when a non-blank response yields nothing displayable.
pub const UNABLE_TO_PROCESS: &str = "Unable to process the response. Please try again!";

impl KismetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ExternalService(_) | Self::Http(_) => ErrorKind::ExternalServiceFailure,
            Self::EmptyResult(_) => ErrorKind::EmptyResult,
            Self::Parse(_) | Self::Serialization(_) => ErrorKind::ParseFailure,
            Self::Storage(_) | Self::File(_) | Self::Render(_) | Self::NotFound(_) => {
                ErrorKind::PersistenceFailure
            }
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Text suitable for a toast or an inline error panel.
    ///
    /// Service failures are surfaced verbatim; parse failures collapse to a
    /// generic message since the raw detail means nothing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) | Self::ExternalService(msg) | Self::EmptyResult(msg) => {
                msg.clone()
            }
            Self::Parse(_) | Self::Serialization(_) => UNABLE_TO_PROCESS.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KismetError>;
