use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config;
use crate::error::LandwatchError;
use crate::services::ImageSource;
use crate::utils::staging::StagingArea;

use super::pipeline::DetectionPipeline;
use super::worker::IngestionWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub api_key: Option<String>,
}

impl WorkerStatus {
    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub stop_timeout: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &config::Config) -> Self {
        Self {
            poll_interval: config.ingest.poll_interval(),
            fetch_timeout: config.source.fetch_timeout(),
            stop_timeout: config.ingest.stop_timeout(),
        }
    }
}

struct WorkerHandle {
    api_key: String,
    owner: Arc<RwLock<String>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Single-flight control plane for the ingestion worker.
///
/// The handle slot is only touched under `slot`'s mutex, so start and stop
/// calls are serialized. Status goes through a watch channel and can be read
/// at any time without waiting on that lock.
pub struct IngestionManager {
    source: Arc<dyn ImageSource>,
    pipeline: Arc<DetectionPipeline>,
    staging: StagingArea,
    settings: WorkerSettings,
    slot: Mutex<Option<WorkerHandle>>,
    status: Arc<watch::Sender<WorkerStatus>>,
}

fn validate_key(api_key: &str) -> Result<&str, LandwatchError> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(LandwatchError::Config("API key is required".to_string()));
    }
    Ok(key)
}

impl IngestionManager {
    pub fn new(
        source: Arc<dyn ImageSource>,
        pipeline: Arc<DetectionPipeline>,
        staging: StagingArea,
        settings: WorkerSettings,
    ) -> Self {
        let (status, _) = watch::channel(WorkerStatus {
            state: WorkerState::Idle,
            api_key: None,
        });
        Self {
            source,
            pipeline,
            staging,
            settings,
            slot: Mutex::new(None),
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status.subscribe()
    }

    fn publish(&self, state: WorkerState, api_key: Option<String>) {
        self.status.send_replace(WorkerStatus { state, api_key });
    }

    /// Start a worker for `api_key`. Starting the key that is already running
    /// is a no-op apart from re-tagging the owner of future records.
    pub async fn start(&self, api_key: &str, owner: &str) -> Result<StartOutcome, LandwatchError> {
        self.start_inner(api_key, owner, false).await
    }

    /// Like [`Self::start`], but clears the staging directory first when this
    /// call is the one that spawns the worker.
    pub async fn start_fresh(
        &self,
        api_key: &str,
        owner: &str,
    ) -> Result<StartOutcome, LandwatchError> {
        self.start_inner(api_key, owner, true).await
    }

    async fn start_inner(
        &self,
        api_key: &str,
        owner: &str,
        clear_staging: bool,
    ) -> Result<StartOutcome, LandwatchError> {
        let api_key = validate_key(api_key)?;
        let mut slot = self.slot.lock().await;

        if slot.as_ref().is_some_and(|handle| handle.task.is_finished()) {
            warn!(target: "ingest", "Previous worker exited unexpectedly, clearing its handle");
            *slot = None;
        }

        if let Some(handle) = slot.as_ref() {
            if handle.api_key != api_key {
                return Err(LandwatchError::Conflict);
            }
            *handle.owner.write().await = owner.to_string();
            return Ok(StartOutcome::AlreadyRunning);
        }

        if clear_staging {
            self.staging.clear().await?;
        }

        let owner = Arc::new(RwLock::new(owner.to_string()));
        let cancel = CancellationToken::new();
        let worker = IngestionWorker::new(
            api_key.to_string(),
            owner.clone(),
            self.source.clone(),
            self.pipeline.clone(),
            self.staging.clone(),
            self.settings.poll_interval,
            self.settings.fetch_timeout,
        );

        let status = self.status.clone();
        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            if AssertUnwindSafe(worker.run(worker_cancel))
                .catch_unwind()
                .await
                .is_err()
            {
                error!(target: "ingest", "Ingestion worker panicked");
                status.send_replace(WorkerStatus {
                    state: WorkerState::Stopped,
                    api_key: None,
                });
            }
        });

        *slot = Some(WorkerHandle {
            api_key: api_key.to_string(),
            owner,
            cancel,
            task,
        });
        self.publish(WorkerState::Running, Some(api_key.to_string()));
        info!(target: "ingest", "Started ingestion worker");
        Ok(StartOutcome::Started)
    }

    /// Cancel the worker started with `api_key` and wait for it to finish.
    pub async fn stop(&self, api_key: &str) -> Result<(), LandwatchError> {
        let api_key = validate_key(api_key)?;
        let mut slot = self.slot.lock().await;

        match slot.as_ref() {
            None => return Err(LandwatchError::NotRunning),
            Some(handle) if handle.task.is_finished() => {
                *slot = None;
                self.publish(WorkerState::Stopped, None);
                return Err(LandwatchError::NotRunning);
            }
            Some(handle) if handle.api_key != api_key => return Err(LandwatchError::InvalidKey),
            Some(_) => {}
        }

        let Some(handle) = slot.take() else {
            return Err(LandwatchError::NotRunning);
        };
        self.publish(WorkerState::Stopping, Some(handle.api_key.clone()));
        let result = self.join(handle).await;
        self.publish(WorkerState::Stopped, None);
        result
    }

    /// Stop whatever worker is active. Used on process shutdown.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.take() {
            self.publish(WorkerState::Stopping, Some(handle.api_key.clone()));
            if let Err(err) = self.join(handle).await {
                warn!(target: "ingest", "Worker shutdown: {}", err);
            }
            self.publish(WorkerState::Stopped, None);
        }
    }

    async fn join(&self, mut handle: WorkerHandle) -> Result<(), LandwatchError> {
        handle.cancel.cancel();
        match tokio::time::timeout(self.settings.stop_timeout, &mut handle.task).await {
            Ok(Ok(())) => {
                info!(target: "ingest", "Ingestion worker stopped");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(target: "ingest", "Ingestion worker ended abnormally: {}", err);
                Ok(())
            }
            Err(_) => {
                handle.task.abort();
                error!(
                    target: "ingest",
                    "Ingestion worker did not stop within {:?}, aborted",
                    self.settings.stop_timeout
                );
                Err(LandwatchError::StopTimedOut(self.settings.stop_timeout))
            }
        }
    }
}
