//! ETL Loader Library
//!
//! Cleans tabular data with Polars and bulk-loads it into PostgreSQL.
//!
//! # Overview
//!
//! - **Extraction**: CSV or Parquet, chosen by file extension
//! - **Deduplication**: exact duplicate rows removed, first occurrence kept
//! - **Null Imputation**: mode, median, mean or a custom literal per column
//! - **Outlier Removal**: rows with a Z-score above a threshold are dropped
//! - **Schema Creation**: `create table if not exists` inferred from column types
//! - **Bulk Loading**: fixed-size batches, each copied in its own transaction;
//!   the first failing batch is rolled back and the rest are skipped
//! - **Progress Reporting**: per-stage and per-batch updates with cancellation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use etl_loader::{EtlConfig, FillOperation, FillStrategy, Pipeline, PostgresDestination};
//!
//! let config = EtlConfig::builder()
//!     .source_path("yellow_tripdata_2021-01.parquet")
//!     .table_name("yellow_taxi")
//!     .chunk_size(10_000)
//!     .fill(FillOperation::new(["passenger_count"], FillStrategy::Median))
//!     .build()?;
//!
//! let mut destination = PostgresDestination::connect(&config.connection)?;
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run_from_path(&mut destination)?;
//!
//! println!("{}", result.summary());
//! ```
//!
//! # Using the stages directly
//!
//! Every transform takes a [`Table`] by reference and returns a new one:
//!
//! ```rust,ignore
//! use etl_loader::{BulkLoader, DataCleaner, MemoryDestination, OutlierFilter, OutlierSpec};
//!
//! let (table, _) = DataCleaner::drop_duplicates(&table)?;
//! let (table, removed) = OutlierFilter::remove_outliers(&table, &OutlierSpec::default())?;
//!
//! let mut destination = MemoryDestination::new();
//! let mut loader = BulkLoader::new(&mut destination, 5_000);
//! loader.ensure_schema(&table, "trips")?;
//! let report = loader.load(&table, "trips")?.into_result()?;
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod extract;
pub mod imputers;
pub mod loader;
pub mod pipeline;
pub mod table;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::DataCleaner;
pub use config::{
    ConfigValidationError, ConnectionConfig, EtlConfig, EtlConfigBuilder, FillOperation,
    FillStrategy, FillValue, OutlierSpec,
};
pub use error::{EtlError, Result as EtlResult, ResultExt};
pub use extract::{SourceFormat, read_table};
pub use imputers::NullImputer;
pub use loader::{
    BatchError, BulkDestination, BulkLoader, DestinationError, LoadReport, LoadState,
    MemoryDestination, PostgresDestination, SchemaInferencer, SchemaOutcome,
};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, EtlStage, OutlierFilter, Pipeline,
    PipelineBuilder, ProgressReporter, ProgressUpdate,
};
pub use table::{ColumnKind, Table};
pub use types::{ActionType, PipelineResult, TransformAction, TransformSummary};
