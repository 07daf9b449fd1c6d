use serde::{Deserialize, Serialize};

use crate::error::LandwatchError;

/// Body of the realtime control and streaming requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ApiKeyRequest {
    /// Parse a raw request body. A missing body, malformed JSON or a blank
    /// key are all reported as a configuration error.
    pub fn parse_key(body: &[u8]) -> Result<String, LandwatchError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(LandwatchError::Config("API key is required".to_string()));
        }
        let request: ApiKeyRequest = serde_json::from_slice(body)
            .map_err(|err| LandwatchError::Config(format!("Invalid request body: {}", err)))?;
        match request.api_key.map(|key| key.trim().to_string()) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(LandwatchError::Config("API key is required".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_running: bool,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
