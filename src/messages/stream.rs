use serde::{Deserialize, Serialize};

use crate::error::LandwatchError;
use crate::utils::detection_utils::Detection;
use crate::utils::geo::GeoPoint;

/// One newline-delimited JSON unit on a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Detections {
        image: String,
        detections: Vec<DetectionView>,
    },
    #[serde(rename_all = "camelCase")]
    FirstDetection { first_detection: bool },
    #[serde(rename_all = "camelCase")]
    Completed {
        completed: bool,
        total_detections: u64,
    },
    Error { image: String, error: String },
}

/// Detection as seen by streaming clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionView {
    pub location: GeoPoint,
    pub area: f64,
    pub confidence: f32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl From<&Detection> for DetectionView {
    fn from(detection: &Detection) -> Self {
        Self {
            location: detection.location,
            area: detection.area,
            confidence: detection.confidence,
            kind: detection.label.clone(),
            id: Some(detection.id.to_string()),
        }
    }
}

impl StreamEvent {
    pub fn detections(image: &str, detections: &[Detection]) -> Self {
        StreamEvent::Detections {
            image: image.to_string(),
            detections: detections.iter().map(DetectionView::from).collect(),
        }
    }

    pub fn first_detection() -> Self {
        StreamEvent::FirstDetection {
            first_detection: true,
        }
    }

    pub fn completed(total_detections: u64) -> Self {
        StreamEvent::Completed {
            completed: true,
            total_detections,
        }
    }

    pub fn error(image: &str, error: impl ToString) -> Self {
        StreamEvent::Error {
            image: image.to_string(),
            error: error.to_string(),
        }
    }

    /// Serialize as a single line terminated by `\n`.
    pub fn to_ndjson(&self) -> Result<String, LandwatchError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
