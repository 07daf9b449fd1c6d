use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LandwatchError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Affine pixel-to-map transform anchored at the outer corner of the
/// upper-left pixel:
///
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
///
/// `x` is longitude/easting and `y` is latitude/northing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// Parse an ESRI world file. World files list `A D B E C F`, one per
    /// line, with `C`/`F` pointing at the *center* of the upper-left pixel.
    pub fn from_world_file(text: &str) -> Result<Self, LandwatchError> {
        let values = text
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|err| {
                    LandwatchError::Other(format!("Invalid world file value '{}': {}", token, err))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let [a, d, b, e, c, f] = values[..] else {
            return Err(LandwatchError::Other(format!(
                "World file must contain 6 values, found {}",
                values.len()
            )));
        };

        Ok(Self {
            a,
            b,
            c: c - a / 2.0 - b / 2.0,
            d,
            e,
            f: f - d / 2.0 - e / 2.0,
        })
    }

    pub fn apply(&self, col: f64, row: f64) -> GeoPoint {
        let x = self.a * col + self.b * row + self.c;
        let y = self.d * col + self.e * row + self.f;
        GeoPoint { lat: y, lng: x }
    }

    /// Ground size of one pixel along x.
    pub fn scaling_factor(&self) -> f64 {
        self.a.abs()
    }
}

/// Candidate sidecar paths for `image_path`, e.g. `scene.tfw`, `scene.tifw`
/// and `scene.wld` for `scene.tif`.
pub fn world_file_candidates(image_path: &Path) -> Vec<PathBuf> {
    let Some(ext) = image_path.extension().and_then(|ext| ext.to_str()) else {
        return vec![image_path.with_extension("wld")];
    };
    let ext = ext.to_lowercase();

    let mut candidates = Vec::with_capacity(3);
    let mut chars = ext.chars();
    if let (Some(first), Some(last)) = (chars.next(), chars.last()) {
        candidates.push(image_path.with_extension(format!("{}{}w", first, last)));
    }
    candidates.push(image_path.with_extension(format!("{}w", ext)));
    candidates.push(image_path.with_extension("wld"));
    candidates
}

/// Look for a world file next to the image. A malformed sidecar is logged and
/// ignored so the caller falls back to mock coordinates.
pub async fn load_for_image(image_path: &Path) -> Option<GeoTransform> {
    for candidate in world_file_candidates(image_path) {
        let text = match tokio::fs::read_to_string(&candidate).await {
            Ok(text) => text,
            Err(_) => continue,
        };

        match GeoTransform::from_world_file(&text) {
            Ok(transform) => {
                debug!("Using world file {}", candidate.display());
                return Some(transform);
            }
            Err(err) => {
                warn!(
                    "Could not read georeferencing from {}: {}",
                    candidate.display(),
                    err
                );
                return None;
            }
        }
    }
    None
}
