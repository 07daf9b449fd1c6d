use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::LandwatchError;
use crate::services::{filename_from_id, ImageOrigin, ImageSource};
use crate::utils::staging::{sanitize_filename, StagingArea};

use super::pipeline::DetectionPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Processed,
    Cancelled,
}

/// The background poll → fetch → detect → persist loop. Exactly one of these
/// runs at a time; [`super::IngestionManager`] owns it.
pub struct IngestionWorker {
    api_key: String,
    owner: Arc<RwLock<String>>,
    source: Arc<dyn ImageSource>,
    pipeline: Arc<DetectionPipeline>,
    staging: StagingArea,
    poll_interval: Duration,
    fetch_timeout: Duration,
    processed: HashSet<String>,
}

impl IngestionWorker {
    pub fn new(
        api_key: String,
        owner: Arc<RwLock<String>>,
        source: Arc<dyn ImageSource>,
        pipeline: Arc<DetectionPipeline>,
        staging: StagingArea,
        poll_interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            owner,
            source,
            pipeline,
            staging,
            poll_interval,
            fetch_timeout,
            processed: HashSet::new(),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Poll until `cancel` fires. Errors from a single poll are logged and the
    /// next poll happens on schedule.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            target: "ingest",
            interval_ms = self.poll_interval.as_millis() as u64,
            "Ingestion worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.poll_once(&cancel).await {
                Ok(0) => debug!(target: "ingest", "No new images"),
                Ok(count) => info!(target: "ingest", count = count as u64, "Ingested new images"),
                Err(LandwatchError::Auth(reason)) => {
                    error!(target: "ingest", "Source rejected the API key: {}", reason)
                }
                Err(err) => warn!(target: "ingest", "Poll failed: {}", err),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(
            target: "ingest",
            processed = self.processed.len() as u64,
            "Ingestion worker stopped"
        );
    }

    /// One pass over the source listing. Returns how many images were
    /// processed in this pass.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> Result<usize, LandwatchError> {
        let ids = tokio::select! {
            _ = cancel.cancelled() => return Ok(0),
            ids = self.source.list(&self.api_key) => ids?,
        };

        let mut count = 0;
        for id in ids {
            if cancel.is_cancelled() {
                break;
            }

            let filename = filename_from_id(&id).to_string();
            if self.processed.contains(&filename) {
                continue;
            }
            if !self.staging.is_allowed(&filename) {
                debug!(target: "ingest", "Ignoring {} (extension not allowed)", filename);
                self.processed.insert(filename);
                continue;
            }
            if let Err(err) = sanitize_filename(&filename) {
                warn!(target: "ingest", "Skipping {}: {}", id, err);
                self.processed.insert(filename);
                continue;
            }

            match self.process_item(&id, &filename, cancel).await {
                Ok(ItemOutcome::Processed) => {
                    self.processed.insert(filename);
                    count += 1;
                }
                Ok(ItemOutcome::Cancelled) => break,
                Err(err) if err.is_permanent_skip() => {
                    warn!(target: "ingest", "Skipping {}: {}", filename, err);
                    self.processed.insert(filename);
                }
                // A bad key fails every item the same way; end the pass.
                Err(err @ LandwatchError::Auth(_)) => return Err(err),
                Err(err) => {
                    error!(target: "ingest", "Failed to process {}: {}", filename, err);
                }
            }
        }
        Ok(count)
    }

    async fn process_item(
        &self,
        id: &str,
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, LandwatchError> {
        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Ok(ItemOutcome::Cancelled),
            bytes = self.source.fetch(&self.api_key, id, self.fetch_timeout) => bytes?,
        };

        let path = self.staging.write(filename, &bytes).await?;
        if cancel.is_cancelled() {
            return Ok(ItemOutcome::Cancelled);
        }

        let analysis = tokio::select! {
            _ = cancel.cancelled() => return Ok(ItemOutcome::Cancelled),
            analysis = self.pipeline.analyze(filename, &path, bytes) => analysis,
        };
        let analysis = match analysis {
            Ok(analysis) => analysis,
            Err(err) if err.is_permanent_skip() => {
                // Staged but never annotated; live streams report it from this.
                let archive = self.pipeline.archive(ImageOrigin::Realtime);
                let reason = err.to_string();
                if let Err(write_err) = archive.write_failure(filename, &reason).await {
                    warn!(
                        target: "ingest",
                        "Could not record failure for {}: {}",
                        filename,
                        write_err
                    );
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        // Persisting runs to completion so a stop never leaves a record
        // without its annotation document.
        let owner = self.owner.read().await.clone();
        self.pipeline
            .persist(analysis, &owner, &path, ImageOrigin::Realtime)
            .await?;
        Ok(ItemOutcome::Processed)
    }
}
