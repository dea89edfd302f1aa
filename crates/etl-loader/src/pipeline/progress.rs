//! Progress reporting and cancellation support for ETL runs.
//!
//! The loader reports one update per committed batch, and the cancellation
//! token is checked between batches so a run can be stopped from another
//! thread (e.g. a Ctrl-C handler) without leaving a transaction open.
//!
//! # Example
//!
//! ```rust,ignore
//! use etl_loader::{CancellationToken, EtlConfig, Pipeline};
//!
//! let token = CancellationToken::new();
//! let pipeline = Pipeline::builder()
//!     .config(config)
//!     .cancellation_token(token.clone())
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stages of an ETL run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtlStage {
    /// Reading the source file
    Extracting,
    /// Dropping duplicate rows
    Deduplicating,
    /// Filling missing values
    Imputing,
    /// Removing Z-score outliers
    RemovingOutliers,
    /// Issuing CREATE TABLE IF NOT EXISTS
    EnsuringSchema,
    /// Streaming batches to the destination
    Loading,
    /// Run completed successfully
    Complete,
    /// Run was cancelled by the user
    Cancelled,
    /// Run failed or the load aborted
    Failed,
}

impl EtlStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Extracting => "Reading Source",
            Self::Deduplicating => "Removing Duplicates",
            Self::Imputing => "Filling Missing Values",
            Self::RemovingOutliers => "Removing Outliers",
            Self::EnsuringSchema => "Ensuring Table",
            Self::Loading => "Loading Batches",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the whole run taken by this stage (0.0 - 1.0).
    ///
    /// The working stages sum to 1.0; terminal states weigh nothing.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Extracting => 0.15,
            Self::Deduplicating => 0.05,
            Self::Imputing => 0.10,
            Self::RemovingOutliers => 0.05,
            Self::EnsuringSchema => 0.05,
            Self::Loading => 0.60,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Extracting => 0.0,
            Self::Deduplicating => 0.15,
            Self::Imputing => 0.20,
            Self::RemovingOutliers => 0.30,
            Self::EnsuringSchema => 0.35,
            Self::Loading => 0.40,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: EtlStage,

    /// Optional sub-stage description (e.g. "Batch 3/12")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    /// Number of items processed in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    /// Total items in current stage (for iterative operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage without sub-stage info.
    pub fn new(stage: EtlStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with sub-stage information.
    pub fn with_sub_stage(
        stage: EtlStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: Some(sub_stage.into()),
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: EtlStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: Some(sub_stage.into()),
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: Some(current),
            items_total: Some(total),
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: EtlStage::Complete,
            sub_stage: None,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a cancelled progress update.
    pub fn cancelled() -> Self {
        Self {
            stage: EtlStage::Cancelled,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: "Load cancelled by user".to_string(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: EtlStage::Failed,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }
}

/// Receiver for progress updates.
///
/// Implementations must be `Send + Sync` so the token and reporter can be
/// shared with a signal handler or a supervising thread.
pub trait ProgressReporter: Send + Sync {
    /// Called once per stage transition and once per committed batch.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running load.
///
/// Clones share one atomic flag. The bulk loader checks it before each
/// batch; a cancelled run rolls nothing back that was already committed and
/// ends in the aborted state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Takes effect before the next batch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    ///
    /// Returns `true` if [`cancel()`](Self::cancel) has been called on this
    /// token or any of its clones.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
