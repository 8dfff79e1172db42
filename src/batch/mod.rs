//! Batch orchestration: partitioning, pacing, retries and aggregation.
//!
//! A run normalizes its records, resolves the project once, then uploads
//! units strictly one after another. Units are grouped into fixed-size
//! batches with a pause between units and a longer pause between batches,
//! both there to stay under the dataset service's rate limits. A unit that
//! keeps failing is recorded and the run moves on.
//!
//! Runs are not idempotent: uploading the same records twice creates new
//! images under new generated filenames.

pub mod report;
pub mod retry;

use std::fmt;
use std::time::{Duration, Instant};

pub use report::{BatchResult, ImageResult, UploadError};
pub use retry::{retry, Pause, RecordingPause, RetryOutcome, ThreadPause};

use crate::client::UploadOutcome;
use crate::error::CoolerUploadError;
use crate::normalize::{normalize_records, RawRecord, UploadUnit};
use crate::project::{ProjectHandle, ResolveProject};

/// Uploads a single unit into a resolved project.
pub trait UnitUploader {
    fn upload_one(
        &self,
        project: &ProjectHandle,
        unit: &UploadUnit,
    ) -> Result<UploadOutcome, CoolerUploadError>;
}

/// Pacing and retry settings for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Units per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Pause between units within a batch.
    pub image_delay: Duration,
    /// Attempts per unit, including the first.
    pub max_retries: u32,
    /// Fixed pause between failed attempts.
    pub retry_backoff: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(5),
            image_delay: Duration::from_millis(500),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Split into contiguous chunks of `batch_size`; only the last may be shorter.
pub fn partition<T>(units: &[T], batch_size: usize) -> Vec<&[T]> {
    units.chunks(batch_size.max(1)).collect()
}

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Normalizing,
    ResolvingProject,
    Uploading { batch: usize, of: usize },
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Normalizing => f.write_str("normalizing"),
            RunState::ResolvingProject => f.write_str("resolving project"),
            RunState::Uploading { batch, of } => write!(f, "uploading batch {batch}/{of}"),
            RunState::Completed => f.write_str("completed"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Drives a [`UnitUploader`] over many units under a [`BatchPolicy`].
pub struct BatchOrchestrator<U, P = ThreadPause> {
    uploader: U,
    policy: BatchPolicy,
    pause: P,
}

impl<U: UnitUploader> BatchOrchestrator<U, ThreadPause> {
    pub fn new(uploader: U, policy: BatchPolicy) -> Self {
        Self::with_pause(uploader, policy, ThreadPause)
    }
}

impl<U: UnitUploader, P: Pause> BatchOrchestrator<U, P> {
    pub fn with_pause(uploader: U, policy: BatchPolicy, pause: P) -> Self {
        Self {
            uploader,
            policy,
            pause,
        }
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Normalize `records`, resolve the project and upload every unit.
    ///
    /// Invalid records and project resolution failures abort the run before
    /// any upload. Per-unit failures never do; they are collected in the
    /// returned [`BatchResult`].
    pub fn run(
        &self,
        records: &[RawRecord],
        resolver: &dyn ResolveProject,
    ) -> Result<BatchResult, CoolerUploadError> {
        let mut state = RunState::Idle;

        transition(&mut state, RunState::Normalizing);
        let units = normalize_records(records).inspect_err(|err| {
            tracing::error!(error = %err, "Input rejected");
            transition(&mut state, RunState::Failed);
        })?;

        transition(&mut state, RunState::ResolvingProject);
        let project = resolver.resolve().inspect_err(|err| {
            tracing::error!(error = %err, "Project resolution failed");
            transition(&mut state, RunState::Failed);
        })?;

        let result = self.run_units_tracked(&project, &units, &mut state);
        transition(&mut state, RunState::Completed);
        Ok(result)
    }

    /// Upload already-normalized units into `project`.
    pub fn run_units(&self, project: &ProjectHandle, units: &[UploadUnit]) -> BatchResult {
        let mut state = RunState::Idle;
        self.run_units_tracked(project, units, &mut state)
    }

    fn run_units_tracked(
        &self,
        project: &ProjectHandle,
        units: &[UploadUnit],
        state: &mut RunState,
    ) -> BatchResult {
        let started = Instant::now();
        let batches = partition(units, self.policy.batch_size);
        let total_batches = batches.len();
        let mut result = BatchResult::new(project.clone(), units.len(), total_batches);

        tracing::info!(
            project = %project.id,
            images = units.len(),
            batches = total_batches,
            batch_size = self.policy.batch_size,
            "Starting upload"
        );

        for (batch_idx, batch) in batches.iter().enumerate() {
            let batch_number = batch_idx + 1;
            transition(
                state,
                RunState::Uploading {
                    batch: batch_number,
                    of: total_batches,
                },
            );

            for (unit_idx, unit) in batch.iter().enumerate() {
                let image = self.upload_with_retry(project, unit, batch_number);
                result.record(image);

                if unit_idx + 1 < batch.len() {
                    self.pause.pause(self.policy.image_delay);
                }
            }

            result.processed_batches += 1;
            tracing::info!(
                batch = batch_number,
                of = total_batches,
                successful = result.successful,
                failed = result.failed,
                "Batch finished"
            );

            if batch_number < total_batches {
                tracing::debug!(
                    delay_ms = self.policy.batch_delay.as_millis() as u64,
                    "Waiting before next batch"
                );
                self.pause.pause(self.policy.batch_delay);
            }
        }

        result.elapsed = started.elapsed();
        tracing::info!(
            successful = result.successful,
            failed = result.failed,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Upload finished"
        );
        result
    }

    fn upload_with_retry(
        &self,
        project: &ProjectHandle,
        unit: &UploadUnit,
        batch_number: usize,
    ) -> ImageResult {
        let mut orphaned_image_ids = Vec::new();

        let outcome = retry(
            self.policy.max_retries,
            self.policy.retry_backoff,
            &self.pause,
            CoolerUploadError::is_retryable,
            |attempt| {
                tracing::debug!(filename = %unit.filename, attempt, "Uploading unit");
                self.uploader.upload_one(project, unit).inspect_err(|err| {
                    if let Some(id) = err.orphan_image_id() {
                        orphaned_image_ids.push(id.to_string());
                    }
                })
            },
        );

        let mut image = ImageResult {
            filename: unit.filename.clone(),
            source_url: unit.source_url.clone(),
            attempts: outcome.attempts,
            batch_number,
            has_annotations: unit.annotation_tree.is_some(),
            ..ImageResult::default()
        };

        match outcome.result {
            Ok(uploaded) => {
                image.image_id = Some(uploaded.image_id);
                image.success = true;
                image.has_annotations = uploaded.has_annotations;
                image.expected_annotations = uploaded.expected_annotations;
                image.verified_annotations = uploaded.verified_annotations;
            }
            Err(err) => {
                tracing::error!(
                    filename = %unit.filename,
                    attempts = outcome.attempts,
                    error = %err,
                    "Unit failed"
                );
                image.image_id = err.orphan_image_id().map(str::to_string);
                image.has_annotations = false;
                image.error = Some(err.to_string());
            }
        }
        image.orphaned_image_ids = orphaned_image_ids;
        image
    }
}

fn transition(state: &mut RunState, next: RunState) {
    tracing::info!(from = %state, to = %next, "Run state changed");
    *state = next;
}
