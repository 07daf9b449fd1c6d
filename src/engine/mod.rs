mod manager;
mod pipeline;
mod responder;
mod session;
mod worker;

pub use manager::{IngestionManager, StartOutcome, WorkerSettings, WorkerState, WorkerStatus};
pub use pipeline::{Analysis, DetectionPipeline, ProcessedImage};
pub use responder::{EmissionTracker, LiveMode, StreamResponder};
pub use session::{Session, SessionRegistry};
pub use worker::{IngestionWorker, ItemOutcome};
