use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use image::DynamicImage;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config;
use crate::error::LandwatchError;
use crate::services::{Detector, ImageOrigin, ImageRecord, ImageStore};
use crate::utils::archive::AnnotationArchive;
use crate::utils::detection_utils::{annotate, AnnotationRecord};
use crate::utils::{geo, image_utils};

/// Result of the side-effect-free half of the pipeline.
pub struct Analysis {
    pub image: DynamicImage,
    pub annotation: AnnotationRecord,
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub record_id: Uuid,
    pub annotation: AnnotationRecord,
}

/// decode → detect → georeference → render → persist
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    store: Arc<dyn ImageStore>,
    uploads: AnnotationArchive,
    realtime: AnnotationArchive,
    geo: config::Geo,
    min_confidence: f32,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        store: Arc<dyn ImageStore>,
        output_dir: impl Into<PathBuf>,
        geo: config::Geo,
        min_confidence: f32,
    ) -> Self {
        let output_dir = output_dir.into();
        Self {
            detector,
            store,
            realtime: AnnotationArchive::new(output_dir.join("realtime")),
            uploads: AnnotationArchive::new(output_dir),
            geo,
            min_confidence,
        }
    }

    /// Uploads and realtime images are archived apart so an upload can never
    /// stand in for a realtime result of the same name.
    pub fn archive(&self, origin: ImageOrigin) -> &AnnotationArchive {
        match origin {
            ImageOrigin::Uploaded => &self.uploads,
            ImageOrigin::Realtime => &self.realtime,
        }
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    /// Decode and run detection. Writes nothing, so it can be abandoned at
    /// any await point.
    pub async fn analyze(
        &self,
        filename: &str,
        path: &Path,
        bytes: Bytes,
    ) -> Result<Analysis, LandwatchError> {
        let decode_name = filename.to_string();
        let decode_bytes = bytes.clone();
        let image = tokio::task::spawn_blocking(move || {
            image_utils::decode_image(&decode_name, &decode_bytes)
        })
        .await
        .map_err(|err| LandwatchError::Other(format!("Decode task failed: {}", err)))??;

        let results = self.detector.detect(filename, bytes).await?;
        let transform = geo::load_for_image(path).await;
        let annotation = annotate(
            filename,
            (image.width(), image.height()),
            &results,
            transform.as_ref(),
            &self.geo,
            self.min_confidence,
        );

        Ok(Analysis { image, annotation })
    }

    /// Render, record and archive. The annotation document is written last so
    /// readers that gate on it see a complete result.
    pub async fn persist(
        &self,
        analysis: Analysis,
        owner: &str,
        original_path: &Path,
        origin: ImageOrigin,
    ) -> Result<ProcessedImage, LandwatchError> {
        let Analysis { image, annotation } = analysis;
        let filename = annotation.image.clone();
        let archive = self.archive(origin);

        tokio::fs::create_dir_all(archive.dir()).await?;
        let annotated_path = archive.annotated_path(&filename);
        image_utils::save_annotated(image, annotation.detections.clone(), &annotated_path).await?;

        let record = ImageRecord {
            id: Uuid::now_v7(),
            owner: owner.to_string(),
            filename: filename.clone(),
            original_path: original_path.to_path_buf(),
            annotated_path,
            annotations: annotation.clone(),
            processed_at: Utc::now(),
            source: origin,
        };
        let record_id = self.store.insert(record).await?;
        archive.write(&annotation).await?;

        info!(
            target: "pipeline",
            "Processed {} for {}: {} detections",
            filename,
            owner,
            annotation.detection_count()
        );
        Ok(ProcessedImage {
            record_id,
            annotation,
        })
    }

    pub async fn process(
        &self,
        filename: &str,
        path: &Path,
        bytes: Bytes,
        owner: &str,
        origin: ImageOrigin,
    ) -> Result<ProcessedImage, LandwatchError> {
        debug!(target: "pipeline", "Processing {}", filename);
        let analysis = self.analyze(filename, path, bytes).await?;
        self.persist(analysis, owner, path, origin).await
    }
}
