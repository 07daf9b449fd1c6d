use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config;
use crate::utils::geo::{GeoPoint, GeoTransform};

/// A single detection as returned by the detector API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionResult {
    #[serde(deserialize_with = "deserialize_box")]
    pub r#box: [f32; 4],
    #[serde(deserialize_with = "float_to_class_id")]
    pub cls: u32,
    pub cls_name: String,
    pub conf: f32,
    /// Mask polygons as flat `[x0, y0, x1, y1, ...]` lists.
    #[serde(default)]
    pub segments: Vec<Vec<f32>>,
}

fn float_to_class_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let f = f64::deserialize(deserializer)?;
    if f < 0.0 {
        return Err(serde::de::Error::custom(format!("negative class id {}", f)));
    }
    Ok(f as u32)
}

fn deserialize_box<'de, D>(deserializer: D) -> Result<[f32; 4], D::Error>
where
    D: Deserializer<'de>,
{
    let vec: Vec<f32> = Vec::deserialize(deserializer)?;
    match vec[..] {
        [x1, y1, x2, y2] => Ok([x1, y1, x2, y2]),
        _ => Err(serde::de::Error::invalid_length(
            vec.len(),
            &"a box of 4 coordinates",
        )),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(b: [f32; 4]) -> Self {
        Self {
            x1: b[0],
            y1: b[1],
            x2: b[2],
            y2: b[3],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    /// Index within the owning annotation record.
    pub id: u32,
    pub class_id: u32,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub segmentation: Vec<Vec<f32>>,
    /// Square meters.
    pub area: f64,
    pub location: GeoPoint,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
    pub scaling_factor: f64,
}

impl AnnotationRecord {
    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }
}

/// Turn raw detector output into an annotation record.
///
/// Results under `min_confidence` are dropped before ids are assigned, so ids
/// are contiguous. With a georeferencing transform the box center is mapped
/// through it; otherwise each detection gets `base + index * offset_step` so
/// results stay reproducible without geodata.
pub fn annotate(
    filename: &str,
    dimensions: (u32, u32),
    results: &[DetectionResult],
    transform: Option<&GeoTransform>,
    geo: &config::Geo,
    min_confidence: f32,
) -> AnnotationRecord {
    let scaling_factor = transform
        .map(GeoTransform::scaling_factor)
        .unwrap_or(geo.default_scaling_factor);

    let detections: Vec<Detection> = results
        .iter()
        .filter(|result| result.conf >= min_confidence)
        .enumerate()
        .map(|(idx, result)| {
            let bbox = BoundingBox::from(result.r#box);
            let area_pixels = bbox.width() as f64 * bbox.height() as f64;
            let (center_x, center_y) = bbox.center();

            let location = match transform {
                Some(transform) => transform.apply(center_x, center_y),
                None => {
                    let offset = idx as f64 * geo.offset_step;
                    GeoPoint {
                        lat: geo.base_lat + offset,
                        lng: geo.base_lng + offset,
                    }
                }
            };

            Detection {
                id: idx as u32,
                class_id: result.cls,
                label: result.cls_name.clone(),
                confidence: result.conf.clamp(0.0, 1.0),
                bbox,
                segmentation: result.segments.clone(),
                area: area_pixels * scaling_factor * scaling_factor,
                location,
            }
        })
        .collect();

    debug!(
        "Annotated {} with {} of {} detections",
        filename,
        detections.len(),
        results.len()
    );

    AnnotationRecord {
        image: filename.to_string(),
        width: dimensions.0,
        height: dimensions.1,
        detections,
        scaling_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_detection(conf: f32) -> DetectionResult {
        DetectionResult {
            r#box: [10.0, 20.0, 30.0, 60.0],
            cls: 0,
            cls_name: "landfill".to_string(),
            conf,
            segments: vec![],
        }
    }

    #[test]
    fn test_detector_response_parses() {
        let json = r#"[
            {"box": [1.5, 2.0, 10.0, 12.0], "cls": 1.0, "cls_name": "dump", "conf": 0.91},
            {"box": [0, 0, 4, 4], "cls": 0, "cls_name": "landfill", "conf": 0.4,
             "segments": [[0, 0, 4, 0, 4, 4]]}
        ]"#;
        let parsed: Vec<DetectionResult> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].cls, 1);
        assert_eq!(parsed[0].r#box, [1.5, 2.0, 10.0, 12.0]);
        assert_eq!(parsed[1].segments[0].len(), 6);
    }

    #[test]
    fn test_short_box_is_rejected() {
        let json = r#"{"box": [1, 2, 3], "cls": 0, "cls_name": "x", "conf": 0.5}"#;
        assert!(serde_json::from_str::<DetectionResult>(json).is_err());
    }

    #[test]
    fn test_mock_locations_and_area() {
        let geo = config::Geo::default();
        let results = vec![create_test_detection(0.9), create_test_detection(0.8)];
        let record = annotate("a.jpg", (640, 480), &results, None, &geo, 0.25);

        assert_eq!(record.detection_count(), 2);
        assert_eq!(record.scaling_factor, 0.1);
        // 20 x 40 pixels at 0.1 m/px
        assert!((record.detections[0].area - 8.0).abs() < 1e-9);
        assert_eq!(record.detections[0].location.lat, geo.base_lat);
        assert!((record.detections[1].location.lng - (geo.base_lng + 0.001)).abs() < 1e-12);
        assert_eq!(record.detections[1].id, 1);
    }

    #[test]
    fn test_low_confidence_is_dropped_and_ids_stay_contiguous() {
        let geo = config::Geo::default();
        let results = vec![
            create_test_detection(0.1),
            create_test_detection(0.7),
            create_test_detection(0.3),
        ];
        let record = annotate("b.png", (10, 10), &results, None, &geo, 0.25);
        let ids: Vec<u32> = record.detections.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(record.detections[0].confidence, 0.7);
    }

    #[test]
    fn test_transform_drives_location_and_scale() {
        let geo = config::Geo::default();
        let transform = GeoTransform {
            a: 2.0,
            b: 0.0,
            c: 500.0,
            d: 0.0,
            e: -2.0,
            f: 100.0,
        };
        let results = vec![create_test_detection(0.9)];
        let record = annotate("c.tif", (100, 100), &results, Some(&transform), &geo, 0.25);

        let detection = &record.detections[0];
        assert_eq!(record.scaling_factor, 2.0);
        assert_eq!(detection.location, GeoPoint { lat: 20.0, lng: 540.0 });
        assert!((detection.area - 3200.0).abs() < 1e-9);
    }
}
