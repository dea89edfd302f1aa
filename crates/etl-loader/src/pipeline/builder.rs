//! Main ETL pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating extract → dedup → fill → outliers → schema → load.

use crate::cleaner::DataCleaner;
use crate::config::{ConfigValidationError, EtlConfig};
use crate::error::{EtlError, Result};
use crate::extract::read_table;
use crate::imputers::NullImputer;
use crate::loader::{BulkDestination, BulkLoader};
use crate::pipeline::outliers::OutlierFilter;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, EtlStage, ProgressReporter, ProgressUpdate,
};
use crate::table::Table;
use crate::types::{ActionType, PipelineResult, TransformAction, TransformSummary};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// The ETL pipeline.
///
/// Use [`Pipeline::builder()`] to create a pipeline from an [`EtlConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use etl_loader::{EtlConfig, MemoryDestination, Pipeline};
///
/// let config = EtlConfig::builder()
///     .source_path("data/yellow_tripdata.parquet")
///     .table_name("yellow_taxi")
///     .build()?;
///
/// let mut destination = MemoryDestination::new();
/// let result = Pipeline::builder()
///     .config(config)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run_from_path(&mut destination)?;
///
/// println!("{}", result.summary());
/// ```
pub struct Pipeline {
    config: EtlConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Read the configured source file.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] when no source path is configured, otherwise
    /// see [`read_table`].
    pub fn extract(&self) -> Result<Table> {
        let path = self
            .config
            .source_path
            .as_ref()
            .ok_or_else(|| EtlError::validation("no source path configured"))?;

        self.report_progress(ProgressUpdate::new(
            EtlStage::Extracting,
            0.0,
            format!("Reading {}", path.display()),
        ));
        let table = read_table(path)?;
        self.report_progress(ProgressUpdate::new(
            EtlStage::Extracting,
            1.0,
            format!("Read {} rows, {} columns", table.height(), table.width()),
        ));
        Ok(table)
    }

    /// Apply the cleaning stages: dedup, then each fill operation in
    /// order, then outlier removal.
    ///
    /// The input table is left untouched.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] from any stage (nothing is half-applied,
    /// the caller still holds the original table), [`EtlError::Cancelled`]
    /// when cancellation was requested between stages.
    pub fn transform(&self, table: &Table) -> Result<(Table, TransformSummary)> {
        let start = Instant::now();
        let mut summary = TransformSummary::new();
        summary.rows_before = table.height();

        let mut current = table.clone();

        if self.config.remove_duplicates {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::new(
                EtlStage::Deduplicating,
                0.0,
                "Removing duplicate rows...",
            ));
            let (deduped, removed) = DataCleaner::drop_duplicates(&current)?;
            if removed > 0 {
                summary.add_action(TransformAction::new(
                    ActionType::DuplicatesRemoved,
                    "dataset",
                    format!("Removed {} duplicate rows", removed),
                ));
            }
            summary.duplicates_removed = removed;
            current = deduped;
        }

        summary.nulls_before = total_nulls(&current);
        let fills = &self.config.fill_operations;
        for (i, op) in fills.iter().enumerate() {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::with_items(
                EtlStage::Imputing,
                format!("Columns: {}", op.columns.join(", ")),
                i,
                fills.len(),
                format!("Filling with {}", op.strategy),
            ));

            let mut steps = Vec::new();
            current = NullImputer::fill(&current, op, &mut steps)?;

            for col in &op.columns {
                let nulls = current.null_count(col)?;
                if nulls > 0 && nulls == current.height() {
                    summary.add_warning(format!(
                        "column '{col}' has no values; {} fill left it empty",
                        op.strategy
                    ));
                }
            }
            if !steps.is_empty() {
                summary.add_action(
                    TransformAction::new(
                        ActionType::ValueImputed,
                        op.columns.join(", "),
                        format!("Applied {} fill", op.strategy),
                    )
                    .with_details(steps.join("; ")),
                );
            }
            summary.processing_steps.extend(steps);
        }
        summary.nulls_after = total_nulls(&current);

        self.check_cancelled()?;
        let screened = match &self.config.outliers.columns {
            Some(cols) => format!("Columns: {}", cols.join(", ")),
            None => "All numeric columns".to_string(),
        };
        self.report_progress(ProgressUpdate::with_sub_stage(
            EtlStage::RemovingOutliers,
            screened,
            0.0,
            format!("Removing outliers (|z| > {})", self.config.outliers.threshold),
        ));
        let (filtered, removed) = OutlierFilter::remove_outliers(&current, &self.config.outliers)?;
        if removed > 0 {
            summary.add_action(TransformAction::new(
                ActionType::OutliersRemoved,
                "dataset",
                format!(
                    "Removed {} rows with |z| > {}",
                    removed, self.config.outliers.threshold
                ),
            ));
        }
        summary.outliers_removed = removed;
        current = filtered;

        summary.rows_after = current.height();
        summary.duration_ms = start.elapsed().as_millis() as u64;
        info!("{}", summary.summary());

        Ok((current, summary))
    }

    /// Transform `table`, ensure the destination table exists and load it.
    ///
    /// A failed or cancelled load is not an `Err`: the result comes back
    /// with `success == false` and the batch error in
    /// [`PipelineResult::error`].
    ///
    /// # Errors
    ///
    /// Validation errors from the transforms or the loader, and
    /// [`EtlError::Cancelled`] if cancellation was requested before loading.
    pub fn run(
        &self,
        table: &Table,
        destination: &mut dyn BulkDestination,
    ) -> Result<PipelineResult> {
        match self.run_internal(table, destination) {
            Ok(result) => {
                if result.success {
                    self.report_progress(ProgressUpdate::complete(result.load.summary()));
                }
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// [`Pipeline::extract`] followed by [`Pipeline::run`].
    pub fn run_from_path(&self, destination: &mut dyn BulkDestination) -> Result<PipelineResult> {
        let table = self.extract().inspect_err(|e| {
            self.report_progress(ProgressUpdate::failed(e.to_string()));
        })?;
        self.run(&table, destination)
    }

    fn run_internal(
        &self,
        table: &Table,
        destination: &mut dyn BulkDestination,
    ) -> Result<PipelineResult> {
        info!("Starting ETL pipeline for table '{}'", self.config.table_name);
        let (cleaned, summary) = self.transform(table)?;

        self.check_cancelled()?;
        let mut loader = BulkLoader::new(destination, self.config.chunk_size)
            .with_cancellation_token(self.cancellation_token.clone());
        if let Some(reporter) = &self.progress_reporter {
            loader = loader.with_progress(reporter.clone());
        }

        self.report_progress(ProgressUpdate::new(
            EtlStage::EnsuringSchema,
            0.0,
            format!("Ensuring table '{}'", self.config.table_name),
        ));
        let schema = loader.ensure_schema(&cleaned, &self.config.table_name)?;

        let report = loader.load(&cleaned, &self.config.table_name)?;
        Ok(PipelineResult::new(summary, schema, report))
    }

    /// Check if cancellation has been requested.
    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(EtlError::Cancelled);
        }
        Ok(())
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }
}

fn total_nulls(table: &Table) -> usize {
    table
        .frame()
        .get_columns()
        .iter()
        .map(|c| c.null_count())
        .sum()
}

/// Builder for creating a [`Pipeline`] instance.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<EtlConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the run configuration. Required.
    pub fn config(mut self, config: EtlConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during the run.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// Shorthand for [`progress_reporter`](Self::progress_reporter) with a
    /// [`ClosureProgressReporter`].
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the run.
    ///
    /// The token is checked between stages and between load batches.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if no configuration was given or it is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self
            .config
            .ok_or_else(|| ConfigValidationError::InvalidTableName(String::new()))?;
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
