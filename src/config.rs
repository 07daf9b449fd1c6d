use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::LandwatchError;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub source: Source,
    pub detection: Detection,
    pub ingest: Ingest,
    pub stream: Stream,
    pub storage: Storage,
    pub geo: Geo,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Source {
    pub base_url: String,
    pub list_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Detection {
    pub api_url: String,
    pub timeout_secs: u64,
    pub min_confidence: f32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Ingest {
    pub poll_interval_ms: u64,
    pub stop_timeout_secs: u64,
    pub staging_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Stream {
    pub poll_interval_ms: u64,
    pub channel_capacity: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Storage {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Fallback georeferencing used when an image has no world file.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Geo {
    /// Meters per pixel.
    pub default_scaling_factor: f64,
    pub base_lat: f64,
    pub base_lng: f64,
    /// Added to both coordinates once per detection index.
    pub offset_step: f64,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            list_timeout_secs: 10,
            fetch_timeout_secs: 10,
        }
    }
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/detect".to_string(),
            timeout_secs: 60,
            min_confidence: 0.25,
        }
    }
}

impl Default for Ingest {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            stop_timeout_secs: 30,
            staging_dir: PathBuf::from("realtime_images"),
            allowed_extensions: ["png", "jpg", "jpeg", "tif", "tiff"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            channel_capacity: 32,
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl Default for Geo {
    fn default() -> Self {
        Self {
            default_scaling_factor: 0.1,
            base_lat: 34.0522,
            base_lng: -118.2437,
            offset_step: 0.001,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, LandwatchError> {
        Ok(toml::from_str(text)?)
    }

    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LandwatchError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Source {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Ingest {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Stream {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
