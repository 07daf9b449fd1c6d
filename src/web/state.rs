use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{
    DetectionPipeline, IngestionManager, SessionRegistry, StreamResponder, WorkerSettings,
};
use crate::services::{Detector, ImageSource, ImageStore};
use crate::utils::staging::StagingArea;

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<IngestionManager>,
    pub sessions: Arc<SessionRegistry>,
    pub responder: Arc<StreamResponder>,
    pub pipeline: Arc<DetectionPipeline>,
    pub store: Arc<dyn ImageStore>,
    pub staging: StagingArea,
    pub upload_dir: PathBuf,
    /// Cancelled on process shutdown; every stream's token is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        source: Arc<dyn ImageSource>,
        detector: Arc<dyn Detector>,
        store: Arc<dyn ImageStore>,
    ) -> Self {
        let staging = StagingArea::new(
            config.ingest.staging_dir.clone(),
            &config.ingest.allowed_extensions,
        );
        let pipeline = Arc::new(DetectionPipeline::new(
            detector,
            store.clone(),
            config.storage.output_dir.clone(),
            config.geo.clone(),
            config.detection.min_confidence,
        ));
        let manager = Arc::new(IngestionManager::new(
            source,
            pipeline.clone(),
            staging.clone(),
            WorkerSettings::from_config(&config),
        ));
        let sessions = Arc::new(SessionRegistry::new(store.clone()));
        let responder = Arc::new(StreamResponder::new(
            manager.clone(),
            sessions.clone(),
            pipeline.clone(),
            staging.clone(),
            config.stream.poll_interval(),
        ));

        Self {
            upload_dir: config.storage.upload_dir.clone(),
            config: Arc::new(config),
            manager,
            sessions,
            responder,
            pipeline,
            store,
            staging,
            shutdown: CancellationToken::new(),
        }
    }
}
