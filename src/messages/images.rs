use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::{ImageOrigin, ImageRecord};
use crate::utils::detection_utils::{AnnotationRecord, Detection};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub id: Uuid,
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    pub detection_count: usize,
    pub source: ImageOrigin,
}

impl From<&ImageRecord> for ImageSummary {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            processed_at: record.processed_at,
            detection_count: record.annotations.detection_count(),
            source: record.source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxCorners {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDetails {
    pub id: String,
    pub confidence: f32,
    #[serde(rename = "type")]
    pub kind: String,
    pub area: f64,
    pub location: GeoPoint,
    /// Pixel corners, with `lng` holding x and `lat` holding y.
    pub bounding_box: BoxCorners,
    pub segmentation: Vec<Vec<f32>>,
    pub date_detected: DateTime<Utc>,
}

impl DetectionDetails {
    fn new(detection: &Detection, detected_at: DateTime<Utc>) -> Self {
        let bbox = &detection.bbox;
        Self {
            id: detection.id.to_string(),
            confidence: detection.confidence,
            kind: detection.label.clone(),
            area: detection.area,
            location: detection.location,
            bounding_box: BoxCorners {
                top_left: GeoPoint {
                    lat: bbox.y1 as f64,
                    lng: bbox.x1 as f64,
                },
                bottom_right: GeoPoint {
                    lat: bbox.y2 as f64,
                    lng: bbox.x2 as f64,
                },
            },
            segmentation: detection.segmentation.clone(),
            date_detected: detected_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub id: Uuid,
    pub filename: String,
    pub original_url: String,
    pub annotated_url: String,
    pub annotations: AnnotationRecord,
    pub processed_at: DateTime<Utc>,
    pub source: ImageOrigin,
    pub detections: Vec<DetectionDetails>,
}

impl ImageDetails {
    /// URLs are relative to the service root so they work behind any proxy.
    pub fn from_record(record: &ImageRecord) -> Self {
        let (original_prefix, annotated_prefix) = match record.source {
            ImageOrigin::Uploaded => ("/uploads", "/outputs"),
            ImageOrigin::Realtime => ("/realtime-files", "/outputs/realtime"),
        };
        let annotated_name = record
            .annotated_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();

        Self {
            id: record.id,
            filename: record.filename.clone(),
            original_url: format!("{}/{}", original_prefix, record.filename),
            annotated_url: format!("{}/{}", annotated_prefix, annotated_name),
            annotations: record.annotations.clone(),
            processed_at: record.processed_at,
            source: record.source,
            detections: record
                .annotations
                .detections
                .iter()
                .map(|detection| DetectionDetails::new(detection, record.processed_at))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub image_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub images: Vec<String>,
}
