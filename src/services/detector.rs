use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use tracing::{debug, info};

use crate::config;
use crate::error::LandwatchError;
use crate::utils::detection_utils::DetectionResult;

/// Object detector. Deterministic for a fixed model and free of side effects.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(
        &self,
        filename: &str,
        bytes: Bytes,
    ) -> Result<Vec<DetectionResult>, LandwatchError>;
}

/// Posts images to the detection API as multipart form data.
#[derive(Clone)]
pub struct HttpDetector {
    api_url: String,
    timeout: Duration,
    client: Client,
}

impl HttpDetector {
    pub fn new(config: &config::Detection) -> Self {
        Self {
            api_url: config.api_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            client: Client::new(),
        }
    }
}

pub fn mime_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(
        &self,
        filename: &str,
        bytes: Bytes,
    ) -> Result<Vec<DetectionResult>, LandwatchError> {
        debug!("Sending {} ({} bytes) to detector", filename, bytes.len());

        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.api_url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| LandwatchError::Detector(format!("Could not send the request: {}", err)))?;

        let status = response.status();
        if status.is_client_error() {
            // The detector refuses images it cannot decode.
            let body = response.text().await.unwrap_or_default();
            return Err(LandwatchError::unreadable(
                filename,
                format!("detector returned {}: {}", status, body),
            ));
        }
        if !status.is_success() {
            return Err(LandwatchError::Detector(format!(
                "detector returned {}",
                status
            )));
        }

        let results: Vec<DetectionResult> = response.json().await.map_err(|err| {
            LandwatchError::Detector(format!("Could not parse detector response: {}", err))
        })?;
        info!("Detector found {} objects in {}", results.len(), filename);
        Ok(results)
    }
}
