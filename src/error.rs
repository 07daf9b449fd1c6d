use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
pub enum LandwatchError {
    /// The remote gateway rejected the API key.
    #[error("Remote source rejected the API key: {0}")]
    Auth(String),

    /// Timeout or connection failure talking to the remote gateway. Retryable.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unreadable image {filename}: {reason}")]
    UnreadableImage { filename: String, reason: String },

    #[error("A worker is already running with a different API key")]
    Conflict,

    #[error("Invalid request: {0}")]
    Config(String),

    #[error("API key does not match the active worker")]
    InvalidKey,

    #[error("No worker is running")]
    NotRunning,

    #[error("Worker did not stop within {0:?}")]
    StopTimedOut(Duration),

    #[error("Missing user identity")]
    Unauthorized,

    #[error("Detector error: {0}")]
    Detector(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    ImageError(#[from] image::ImageError),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    #[error("Some other error: {0}")]
    Other(String),
}

impl LandwatchError {
    /// Errors that only affect the current item; the worker marks the item
    /// as processed and never retries it.
    pub fn is_permanent_skip(&self) -> bool {
        matches!(
            self,
            LandwatchError::NotFound(_) | LandwatchError::UnreadableImage { .. }
        )
    }

    pub fn unreadable(filename: impl Into<String>, reason: impl ToString) -> Self {
        LandwatchError::UnreadableImage {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_skip_classification() {
        assert!(LandwatchError::NotFound("a.jpg".into()).is_permanent_skip());
        assert!(LandwatchError::unreadable("a.jpg", "bad header").is_permanent_skip());
        assert!(!LandwatchError::Network("timeout".into()).is_permanent_skip());
        assert!(!LandwatchError::Auth("401".into()).is_permanent_skip());
    }

    #[test]
    fn test_unreadable_message() {
        let err = LandwatchError::unreadable("b.png", "truncated");
        assert_eq!(err.to_string(), "Unreadable image b.png: truncated");
    }
}
