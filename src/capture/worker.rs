//! Background pipeline worker
//!
//! Runs one pipeline job on its own thread and posts the outcome, tagged
//! with the session generation it was started for, back over a channel.
//! The worker never touches session state directly.

use chrono::{DateTime, Local};
use crossbeam_channel::Sender;
use image::RgbImage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

use super::pipeline::{Pipeline, PipelineFailure, PipelineOutcome};
use crate::card::BoundingBox;
use crate::error::PipelineError;
use crate::vision::desaturate;

/// Input for one pipeline run
#[derive(Debug, Clone)]
pub struct Job {
    pub generation: u64,
    pub frame: RgbImage,
    pub barcode: BoundingBox,
    pub captured_at: DateTime<Local>,
}

/// Outcome of one run, for the generation that started it
#[derive(Debug)]
pub struct WorkerResult {
    pub generation: u64,
    pub outcome: PipelineOutcome,
}

/// Run `job` on a new thread and send the result to `results`.
///
/// A panic inside the pipeline is reported as a failed run, so the session
/// always hears back from every worker it started.
pub fn spawn(pipeline: Arc<Pipeline>, job: Job, results: Sender<WorkerResult>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("ocr-worker-{}", job.generation))
        .spawn(move || {
            let generation = job.generation;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                pipeline.run(&job.frame, &job.barcode, job.captured_at)
            }))
            .unwrap_or_else(|payload| {
                let message = panic_message(&*payload);
                error!("Worker {} panicked: {}", generation, message);
                Err(PipelineFailure {
                    error: PipelineError::WorkerCrashed(message),
                    card: None,
                    frame: desaturate(&job.frame),
                })
            });

            if results.send(WorkerResult { generation, outcome }).is_err() {
                // Session dropped while we were working
                debug!("Worker {} finished after its session closed", generation);
            }
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
