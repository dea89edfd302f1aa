//! Pipeline module.
//!
//! This module provides the ETL pipeline and related components.

mod builder;
pub mod outliers;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use outliers::OutlierFilter;
pub use progress::{
    CancellationToken, ClosureProgressReporter, EtlStage, ProgressReporter, ProgressUpdate,
};
