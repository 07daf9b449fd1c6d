use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LandwatchError;
use crate::messages::StreamEvent;
use crate::services::ImageOrigin;
use crate::utils::archive::ArchiveEntry;
use crate::utils::detection_utils::AnnotationRecord;
use crate::utils::staging::StagingArea;

use super::manager::{IngestionManager, StartOutcome};
use super::pipeline::DetectionPipeline;
use super::session::{Session, SessionRegistry};

/// How a live stream joined the ingestion worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMode {
    /// A worker for the same key was already running.
    Attach,
    /// This request started the worker on a cleared staging area.
    ColdStart,
}

/// Per-connection bookkeeping for what has been sent.
#[derive(Debug, Default)]
pub struct EmissionTracker {
    emitted: HashSet<String>,
    first_detection_sent: bool,
    total_detections: u64,
}

impl EmissionTracker {
    pub fn has_emitted(&self, filename: &str) -> bool {
        self.emitted.contains(filename)
    }

    /// Events for the listed `filename`, preceded by the first-detection
    /// marker when this is the first image on the connection with anything
    /// in it.
    pub fn record(&mut self, filename: &str, record: &AnnotationRecord) -> Vec<StreamEvent> {
        let mut events = Vec::with_capacity(2);
        if !self.first_detection_sent && !record.detections.is_empty() {
            self.first_detection_sent = true;
            events.push(StreamEvent::first_detection());
        }
        self.total_detections += record.detections.len() as u64;
        self.emitted.insert(filename.to_string());
        events.push(StreamEvent::detections(filename, &record.detections));
        events
    }

    pub fn record_error(&mut self, filename: &str, error: impl ToString) -> StreamEvent {
        self.emitted.insert(filename.to_string());
        StreamEvent::error(filename, error)
    }

    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    pub fn completion(&self) -> StreamEvent {
        StreamEvent::completed(self.total_detections)
    }
}

pub struct StreamResponder {
    manager: Arc<IngestionManager>,
    sessions: Arc<SessionRegistry>,
    pipeline: Arc<DetectionPipeline>,
    staging: StagingArea,
    poll_interval: Duration,
}

async fn send(sink: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    sink.send(event).await.is_ok()
}

impl StreamResponder {
    pub fn new(
        manager: Arc<IngestionManager>,
        sessions: Arc<SessionRegistry>,
        pipeline: Arc<DetectionPipeline>,
        staging: StagingArea,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            sessions,
            pipeline,
            staging,
            poll_interval,
        }
    }

    /// Join or start the worker for `api_key` and open a fresh session for
    /// `owner`. Fails before any stream output, e.g. with a conflict.
    pub async fn open_live(
        &self,
        api_key: &str,
        owner: &str,
    ) -> Result<(LiveMode, Session), LandwatchError> {
        // The boundary predates the worker so its first results fall inside.
        let session = Session::new(owner);
        let mode = match self.manager.start_fresh(api_key, owner).await? {
            StartOutcome::Started => LiveMode::ColdStart,
            StartOutcome::AlreadyRunning => LiveMode::Attach,
        };
        self.sessions.install(session.clone()).await;
        info!(target: "stream", ?mode, session = %session.id, "Live stream opened");
        Ok((mode, session))
    }

    /// Emit every staged image once its annotation document exists, until the
    /// connection goes away.
    pub async fn run_live(&self, sink: mpsc::Sender<StreamEvent>, cancel: CancellationToken) {
        let mut tracker = EmissionTracker::default();

        'scan: loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.staging.list().await {
                Ok(filenames) => {
                    for filename in filenames {
                        if cancel.is_cancelled() {
                            break 'scan;
                        }
                        if tracker.has_emitted(&filename) {
                            continue;
                        }

                        let archive = self.pipeline.archive(ImageOrigin::Realtime);
                        let events = match archive.lookup(&filename).await {
                            Ok(Some(ArchiveEntry::Annotated(record)))
                                if record.image == filename =>
                            {
                                tracker.record(&filename, &record)
                            }
                            Ok(Some(ArchiveEntry::Failed(failure))) => {
                                vec![tracker.record_error(&filename, failure.error)]
                            }
                            // Not finished yet; look again on the next scan.
                            Ok(_) => continue,
                            Err(err) => {
                                warn!(target: "stream", "Bad annotation record for {}: {}", filename, err);
                                vec![tracker.record_error(&filename, &err)]
                            }
                        };

                        for event in events {
                            if !send(&sink, event).await {
                                cancel.cancel();
                                break 'scan;
                            }
                        }
                    }
                }
                Err(err) => warn!(target: "stream", "Could not list staged images: {}", err),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!(
            target: "stream",
            emitted = tracker.emitted.len() as u64,
            "Live stream closed"
        );
    }

    /// Walk the staged images once, reusing finished annotation documents and
    /// running the pipeline for the rest, then send the completion event.
    pub async fn run_replay(
        &self,
        owner: &str,
        sink: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) {
        let mut tracker = EmissionTracker::default();

        let filenames = match self.staging.list().await {
            Ok(filenames) => filenames,
            Err(err) => {
                warn!(target: "stream", "Could not list staged images: {}", err);
                Vec::new()
            }
        };

        for filename in filenames {
            if cancel.is_cancelled() {
                return;
            }

            let events = match self.annotation_for(&filename, owner, &cancel).await {
                Ok(Some(record)) => tracker.record(&filename, &record),
                Ok(None) => return,
                Err(err) => {
                    warn!(target: "stream", "Replay of {} failed: {}", filename, err);
                    vec![tracker.record_error(&filename, &err)]
                }
            };

            for event in events {
                if !send(&sink, event).await {
                    cancel.cancel();
                    return;
                }
            }
        }

        if !send(&sink, tracker.completion()).await {
            cancel.cancel();
            return;
        }
        info!(
            target: "stream",
            total = tracker.total_detections(),
            "Replay completed"
        );
    }

    /// `Ok(None)` means the connection was cancelled mid-way.
    async fn annotation_for(
        &self,
        filename: &str,
        owner: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<AnnotationRecord>, LandwatchError> {
        let archive = self.pipeline.archive(ImageOrigin::Realtime);
        if let Some(record) = archive.read(filename).await? {
            if record.image == filename {
                return Ok(Some(record));
            }
        }

        let bytes = Bytes::from(self.staging.read(filename).await?);
        let path = self.staging.path(filename);
        let analysis = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            analysis = self.pipeline.analyze(filename, &path, bytes) => analysis?,
        };
        let processed = self
            .pipeline
            .persist(analysis, owner, &path, ImageOrigin::Realtime)
            .await?;
        Ok(Some(processed.annotation))
    }
}
