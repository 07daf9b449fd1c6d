use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config;
use crate::error::LandwatchError;

const API_KEY_HEADER: &str = "X-API-Key";

/// Where the ingestion worker pulls new imagery from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Identifiers of all images currently offered, in the source's order.
    async fn list(&self, api_key: &str) -> Result<Vec<String>, LandwatchError>;

    async fn fetch(
        &self,
        api_key: &str,
        id: &str,
        timeout: Duration,
    ) -> Result<Bytes, LandwatchError>;
}

#[derive(Deserialize, Debug)]
struct ImageListResponse {
    images: Vec<String>,
}

/// HTTP client for the remote image gateway. Identifiers are the image URLs
/// the gateway hands out; relative ones are resolved against `base_url`.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    list_timeout: Duration,
    client: Client,
}

impl GatewayClient {
    pub fn new(config: &config::Source) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            list_timeout: Duration::from_secs(config.list_timeout_secs),
            client: Client::new(),
        }
    }

    fn resolve(&self, id: &str) -> String {
        if id.starts_with("http://") || id.starts_with("https://") {
            id.to_string()
        } else {
            format!("{}/{}", self.base_url, id.trim_start_matches('/'))
        }
    }

    async fn get(
        &self,
        url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, LandwatchError> {
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| LandwatchError::Network(format!("GET {} failed: {}", url, err)))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LandwatchError::Auth(
                format!("{} returned {}", url, response.status()),
            )),
            StatusCode::NOT_FOUND => Err(LandwatchError::NotFound(url.to_string())),
            status => Err(LandwatchError::Network(format!(
                "{} returned {}",
                url, status
            ))),
        }
    }
}

#[async_trait]
impl ImageSource for GatewayClient {
    async fn list(&self, api_key: &str) -> Result<Vec<String>, LandwatchError> {
        let url = format!("{}/images", self.base_url);
        let response = self.get(&url, api_key, self.list_timeout).await?;
        let body: ImageListResponse = response
            .json()
            .await
            .map_err(|err| LandwatchError::Network(format!("Bad image list response: {}", err)))?;

        debug!("Gateway lists {} images", body.images.len());
        Ok(body.images)
    }

    async fn fetch(
        &self,
        api_key: &str,
        id: &str,
        timeout: Duration,
    ) -> Result<Bytes, LandwatchError> {
        let url = self.resolve(id);
        let response = self.get(&url, api_key, timeout).await?;
        response
            .bytes()
            .await
            .map_err(|err| LandwatchError::Network(format!("Reading {} failed: {}", url, err)))
    }
}

/// Local filename for a source identifier: the last path segment with any
/// query or fragment removed.
pub fn filename_from_id(id: &str) -> &str {
    let without_query = id.split(['?', '#']).next().unwrap_or(id);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
}
