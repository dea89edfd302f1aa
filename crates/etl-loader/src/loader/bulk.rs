//! Batched bulk loading.
//!
//! The table is cut into `chunk_size` row slices. Each slice is serialized
//! to CSV and copied inside its own transaction, so a batch is either fully
//! committed or not at all. The first failing batch is rolled back and the
//! remaining batches are never attempted.

use super::schema::{SchemaInferencer, SchemaOutcome, is_valid_table_name};
use super::BulkDestination;
use crate::error::{EtlError, Result};
use crate::pipeline::progress::{CancellationToken, EtlStage, ProgressReporter, ProgressUpdate};
use crate::table::Table;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a loader is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    Idle,
    SchemaEnsured,
    /// Working on the given 1-based batch.
    Loading { batch: usize },
    Completed,
    /// Stopped before finishing; `batch` is the batch that failed or was
    /// about to start when the run was cancelled.
    Aborted { batch: usize },
}

/// A batch that could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    /// 1-based batch number.
    pub batch: usize,
    pub rows: usize,
    pub message: String,
}

/// Outcome of one [`BulkLoader::load`] call.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table_name: String,
    /// Rows in the table handed to the loader.
    pub rows_total: usize,
    /// Rows in batches that were sent, including a failed batch.
    pub rows_attempted: usize,
    /// Running total of rows in committed batches.
    pub rows_committed: usize,
    pub batches_total: usize,
    pub batches_committed: usize,
    pub duration_ms: u64,
    pub errors: Vec<BatchError>,
    pub cancelled: bool,
    pub state: LoadState,
    pub started_at: DateTime<Utc>,
}

impl LoadReport {
    fn new(table_name: &str, rows_total: usize, batches_total: usize) -> Self {
        Self {
            table_name: table_name.to_string(),
            rows_total,
            rows_attempted: 0,
            rows_committed: 0,
            batches_total,
            batches_committed: 0,
            duration_ms: 0,
            errors: Vec::new(),
            cancelled: false,
            state: LoadState::Idle,
            started_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == LoadState::Completed
    }

    /// Human-readable run report.
    pub fn summary(&self) -> String {
        let secs = self.duration_ms as f64 / 1000.0;
        match (&self.state, self.errors.first()) {
            (LoadState::Completed, _) => format!(
                "Data insertion complete!, total rows = {}, time = {:.2}s",
                self.rows_committed, secs
            ),
            (LoadState::Aborted { batch }, Some(err)) => format!(
                "Load into '{}' aborted at batch {}/{} ({} rows): {}. Committed {} of {} rows in {} batches, time = {:.2}s",
                self.table_name,
                batch,
                self.batches_total,
                err.rows,
                err.message,
                self.rows_committed,
                self.rows_total,
                self.batches_committed,
                secs
            ),
            (LoadState::Aborted { batch }, None) => format!(
                "Load into '{}' cancelled before batch {}/{}. Committed {} of {} rows, time = {:.2}s",
                self.table_name,
                batch,
                self.batches_total,
                self.rows_committed,
                self.rows_total,
                secs
            ),
            (state, _) => format!("Load into '{}' is {:?}", self.table_name, state),
        }
    }

    /// The error that ended an aborted load.
    ///
    /// [`EtlError::Cancelled`] for a cancelled run, [`EtlError::Load`] for
    /// the first failed batch, `None` otherwise.
    pub fn error(&self) -> Option<EtlError> {
        if self.cancelled {
            return Some(EtlError::Cancelled);
        }
        self.errors.first().map(|err| EtlError::Load {
            batch: err.batch,
            rows: err.rows,
            message: err.message.clone(),
        })
    }

    /// Turn an aborted load into an error. See [`LoadReport::error`].
    pub fn into_result(self) -> Result<LoadReport> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Loads a [`Table`] into a [`BulkDestination`] in fixed-size batches.
pub struct BulkLoader<'a> {
    destination: &'a mut dyn BulkDestination,
    chunk_size: usize,
    progress: Option<Arc<dyn ProgressReporter>>,
    cancel_token: Option<CancellationToken>,
    state: LoadState,
}

impl<'a> BulkLoader<'a> {
    pub fn new(destination: &'a mut dyn BulkDestination, chunk_size: usize) -> Self {
        Self {
            destination,
            chunk_size,
            progress: None,
            cancel_token: None,
            state: LoadState::Idle,
        }
    }

    /// Report one progress update per committed batch.
    pub fn with_progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Check `token` before every batch.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Create the destination table if needed. See [`SchemaInferencer::ensure`].
    pub fn ensure_schema(&mut self, table: &Table, table_name: &str) -> Result<SchemaOutcome> {
        let outcome = SchemaInferencer::ensure(&mut *self.destination, table, table_name)?;
        self.state = LoadState::SchemaEnsured;
        Ok(outcome)
    }

    /// Copy every row of `table` into `table_name`.
    ///
    /// Batch failures and cancellation do not make this fail; they are
    /// recorded in the report (see [`LoadReport::into_result`]).
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] before the first batch for a zero chunk
    /// size, an invalid table name or column names that collide once
    /// lower-cased.
    pub fn load(&mut self, table: &Table, table_name: &str) -> Result<LoadReport> {
        if self.chunk_size == 0 {
            return Err(EtlError::validation("chunk size must be at least 1"));
        }
        if !is_valid_table_name(table_name) {
            return Err(EtlError::validation(format!(
                "invalid table name '{table_name}'"
            )));
        }
        let columns = table.lowercase_column_names()?;
        let target = table_name.to_lowercase();

        // Outcome of an earlier load on this loader does not carry over.
        if self.state != LoadState::SchemaEnsured {
            self.state = LoadState::Idle;
        }

        let rows_total = table.height();
        let batches_total = rows_total.div_ceil(self.chunk_size);
        let mut report = LoadReport::new(&target, rows_total, batches_total);
        let timer = Instant::now();

        info!(
            "Loading {} rows into '{}' in {} batches of up to {} rows",
            rows_total, target, batches_total, self.chunk_size
        );

        for index in 0..batches_total {
            let batch_no = index + 1;

            if self.is_cancelled() {
                warn!("Load cancelled before batch {}/{}", batch_no, batches_total);
                report.cancelled = true;
                self.state = LoadState::Aborted { batch: batch_no };
                if let Some(reporter) = &self.progress {
                    reporter.report(ProgressUpdate::cancelled());
                }
                break;
            }

            self.state = LoadState::Loading { batch: batch_no };
            let batch = table.slice(index * self.chunk_size, self.chunk_size);
            let rows = batch.height();
            report.rows_attempted += rows;
            let batch_timer = Instant::now();

            if let Err(message) = self.copy_batch(&target, &columns, &batch) {
                if let Err(e) = self.destination.rollback() {
                    warn!("Rollback of batch {} failed: {}", batch_no, e);
                }
                error!(
                    "Batch {} ({} rows) failed and was rolled back: {}",
                    batch_no, rows, message
                );
                if let Some(reporter) = &self.progress {
                    reporter.report(ProgressUpdate::failed(format!(
                        "Batch {batch_no} failed: {message}"
                    )));
                }
                report.errors.push(BatchError {
                    batch: batch_no,
                    rows,
                    message,
                });
                self.state = LoadState::Aborted { batch: batch_no };
                break;
            }

            report.rows_committed += rows;
            report.batches_committed += 1;
            info!(
                "Batch {}/{}: inserted {} rows in {:.3}s, total rows = {}",
                batch_no,
                batches_total,
                rows,
                batch_timer.elapsed().as_secs_f64(),
                report.rows_committed
            );
            if let Some(reporter) = &self.progress {
                reporter.report(ProgressUpdate::with_items(
                    EtlStage::Loading,
                    format!("Batch {batch_no}/{batches_total}"),
                    batch_no,
                    batches_total,
                    format!("{} rows committed", report.rows_committed),
                ));
            }
        }

        if !matches!(self.state, LoadState::Aborted { .. }) {
            self.state = LoadState::Completed;
        }
        report.state = self.state;
        report.duration_ms = timer.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// begin → serialize → copy → commit for one batch.
    fn copy_batch(
        &mut self,
        target: &str,
        columns: &[String],
        batch: &Table,
    ) -> std::result::Result<(), String> {
        self.destination.begin().map_err(|e| e.to_string())?;
        let payload = serialize_batch(batch).map_err(|e| e.to_string())?;
        let accepted = self
            .destination
            .copy_rows(target, columns, &payload)
            .map_err(|e| e.to_string())?;
        if accepted as usize != batch.height() {
            debug!(
                "Destination reported {} rows for a batch of {}",
                accepted,
                batch.height()
            );
        }
        self.destination.commit().map_err(|e| e.to_string())
    }
}

/// CSV without header, nulls as empty fields.
fn serialize_batch(batch: &Table) -> PolarsResult<Vec<u8>> {
    let mut frame = batch.frame().clone();
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(false)
        .with_separator(b',')
        .with_null_value(String::new())
        .finish(&mut frame)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DestinationError, MemoryDestination};
    use crate::pipeline::progress::ClosureProgressReporter;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Wraps a memory store, records calls and fails chosen batches.
    #[derive(Default)]
    struct Recording {
        inner: MemoryDestination,
        calls: Vec<String>,
        copies: usize,
        fail_copy_on: Option<usize>,
    }

    impl BulkDestination for Recording {
        fn execute_ddl(&mut self, statement: &str) -> std::result::Result<(), DestinationError> {
            self.calls.push("ddl".into());
            self.inner.execute_ddl(statement)
        }
        fn begin(&mut self) -> std::result::Result<(), DestinationError> {
            self.calls.push("begin".into());
            self.inner.begin()
        }
        fn copy_rows(
            &mut self,
            table: &str,
            columns: &[String],
            payload: &[u8],
        ) -> std::result::Result<u64, DestinationError> {
            self.copies += 1;
            self.calls.push(format!("copy{}", self.copies));
            if self.fail_copy_on == Some(self.copies) {
                return Err(DestinationError::Rejected("invalid input syntax".into()));
            }
            self.inner.copy_rows(table, columns, payload)
        }
        fn commit(&mut self) -> std::result::Result<(), DestinationError> {
            self.calls.push("commit".into());
            self.inner.commit()
        }
        fn rollback(&mut self) -> std::result::Result<(), DestinationError> {
            self.calls.push("rollback".into());
            self.inner.rollback()
        }
    }

    fn five_rows() -> Table {
        df![
            "ID" => [1i64, 2, 3, 4, 5],
            "Val" => [Some(1.5), None, Some(3.0), Some(4.5), None],
        ]
        .unwrap()
        .into()
    }

    #[test]
    fn test_batches_cover_every_row() {
        let mut dest = Recording::default();
        let report = BulkLoader::new(&mut dest, 2)
            .load(&five_rows(), "trips")
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.rows_committed, 5);
        assert_eq!(report.batches_total, 3);
        assert_eq!(report.batches_committed, 3);
        let sizes: Vec<u64> = dest.inner.batches().iter().map(|b| b.rows).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            dest.calls,
            vec![
                "begin", "copy1", "commit", "begin", "copy2", "commit", "begin", "copy3",
                "commit"
            ]
        );
    }

    #[test]
    fn test_columns_lowercased_and_nulls_empty() {
        let mut dest = Recording::default();
        BulkLoader::new(&mut dest, 10)
            .load(&five_rows(), "Trips")
            .unwrap();

        let batch = &dest.inner.batches()[0];
        assert_eq!(batch.table, "trips");
        assert_eq!(batch.columns, vec!["id", "val"]);
        let text = String::from_utf8(batch.payload.clone()).unwrap();
        assert_eq!(text.lines().nth(1), Some("2,"));
    }

    #[test]
    fn test_failed_batch_aborts_the_rest() {
        let mut dest = Recording {
            fail_copy_on: Some(2),
            ..Default::default()
        };
        let report = BulkLoader::new(&mut dest, 2)
            .load(&five_rows(), "trips")
            .unwrap();

        assert_eq!(report.state, LoadState::Aborted { batch: 2 });
        assert_eq!(report.rows_committed, 2);
        assert_eq!(report.rows_attempted, 4);
        assert_eq!(report.batches_committed, 1);
        assert_eq!(
            report.errors,
            vec![BatchError {
                batch: 2,
                rows: 2,
                message: "invalid input syntax".into()
            }]
        );
        // Batch 3 never starts.
        assert_eq!(
            dest.calls,
            vec!["begin", "copy1", "commit", "begin", "copy2", "rollback"]
        );
        assert_eq!(dest.inner.committed_rows(), 2);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.error_code(), "LOAD_ERROR");
        assert!(err.to_string().contains("Batch 2 (2 rows)"));
    }

    #[test]
    fn test_running_total_resets_per_load() {
        let mut dest = Recording::default();
        let mut loader = BulkLoader::new(&mut dest, 3);
        let first = loader.load(&five_rows(), "trips").unwrap();
        let second = loader.load(&five_rows(), "trips").unwrap();

        assert_eq!(first.rows_committed, 5);
        assert_eq!(second.rows_committed, 5);
        assert_eq!(dest.inner.committed_rows(), 10);
    }

    #[test]
    fn test_aborted_load_does_not_leak_into_next_load() {
        let mut dest = Recording {
            fail_copy_on: Some(1),
            ..Default::default()
        };
        let mut loader = BulkLoader::new(&mut dest, 3);

        let first = loader.load(&five_rows(), "trips").unwrap();
        assert_eq!(first.state, LoadState::Aborted { batch: 1 });
        assert_eq!(loader.state(), LoadState::Aborted { batch: 1 });

        let empty: Table = df!["a" => Vec::<i64>::new()].unwrap().into();
        let second = loader.load(&empty, "t").unwrap();
        assert_eq!(second.state, LoadState::Completed);
        assert!(second.errors.is_empty());
        assert!(!second.cancelled);
        assert!(
            second.summary().starts_with("Data insertion complete!, total rows = 0"),
            "{}",
            second.summary()
        );

        let third = loader.load(&five_rows(), "trips").unwrap();
        assert!(third.is_complete());
        assert_eq!(third.rows_committed, 5);
        assert_eq!(loader.state(), LoadState::Completed);
    }

    #[test]
    fn test_summary_message() {
        let mut dest = MemoryDestination::new();
        let report = BulkLoader::new(&mut dest, 2)
            .load(&five_rows(), "trips")
            .unwrap();

        let summary = report.summary();
        assert!(
            summary.starts_with("Data insertion complete!, total rows = 5, time = "),
            "{summary}"
        );
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_empty_table_loads_nothing() {
        let mut dest = Recording::default();
        let table: Table = df!["a" => Vec::<i64>::new()].unwrap().into();
        let report = BulkLoader::new(&mut dest, 2).load(&table, "t").unwrap();

        assert!(report.is_complete());
        assert_eq!(report.batches_total, 0);
        assert!(dest.calls.is_empty());
    }

    #[test]
    fn test_validation_before_first_batch() {
        let mut dest = Recording::default();
        assert!(BulkLoader::new(&mut dest, 0).load(&five_rows(), "t").is_err());
        assert!(BulkLoader::new(&mut dest, 2).load(&five_rows(), "bad-name").is_err());

        let clash: Table = df!["A" => [1i64], "a" => [2i64]].unwrap().into();
        let err = BulkLoader::new(&mut dest, 2).load(&clash, "t").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(dest.calls.is_empty());
    }

    #[test]
    fn test_cancelled_between_batches() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let reporter = Arc::new(ClosureProgressReporter::new(move |update: ProgressUpdate| {
            if update.items_processed == Some(1) {
                trigger.cancel();
            }
        }));

        let mut dest = Recording::default();
        let report = BulkLoader::new(&mut dest, 2)
            .with_progress(reporter)
            .with_cancellation_token(token)
            .load(&five_rows(), "trips")
            .unwrap();

        assert_eq!(report.state, LoadState::Aborted { batch: 2 });
        assert_eq!(report.rows_committed, 2);
        assert!(report.summary().contains("cancelled before batch 2/3"));
        assert!(report.into_result().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_progress_per_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = Arc::new(ClosureProgressReporter::new(move |update: ProgressUpdate| {
            sink.lock().unwrap().push(update.sub_stage.unwrap_or_default());
        }));

        let mut dest = MemoryDestination::new();
        BulkLoader::new(&mut dest, 2)
            .with_progress(reporter)
            .load(&five_rows(), "trips")
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Batch 1/3", "Batch 2/3", "Batch 3/3"]
        );
    }

    #[test]
    fn test_ensure_schema_moves_state() {
        let mut dest = Recording::default();
        let mut loader = BulkLoader::new(&mut dest, 2);
        assert_eq!(loader.state(), LoadState::Idle);

        let outcome = loader.ensure_schema(&five_rows(), "trips").unwrap();
        assert!(outcome.is_ensured());
        assert_eq!(loader.state(), LoadState::SchemaEnsured);

        loader.load(&five_rows(), "trips").unwrap();
        assert_eq!(loader.state(), LoadState::Completed);
    }
}
