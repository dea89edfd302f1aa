//! Integration tests for the ETL pipeline.
//!
//! These tests drive the public API end to end: extraction from fixture
//! files, cleaning, schema creation and batched loading into in-memory
//! destinations.

use etl_loader::{
    BulkDestination, CancellationToken, DestinationError, EtlConfig, EtlError, EtlStage,
    FillOperation, FillStrategy, FillValue, LoadState, MemoryDestination, Pipeline,
    ProgressUpdate, SchemaOutcome, Table, read_table,
};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn trips_config() -> EtlConfig {
    EtlConfig::builder()
        .source_path(fixtures_path().join("trips.csv"))
        .table_name("yellow_taxi")
        .chunk_size(5)
        .fill(FillOperation::new(["passenger_count"], FillStrategy::Median))
        .fill(FillOperation::new(["store_and_fwd_flag"], FillStrategy::Mode))
        .build()
        .unwrap()
}

fn pipeline(config: EtlConfig) -> Pipeline {
    Pipeline::builder().config(config).build().unwrap()
}

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("etl_loader_{}_{}", std::process::id(), name))
}

/// Delegates to [`MemoryDestination`] but fails chosen operations.
#[derive(Default)]
struct FlakyDestination {
    inner: MemoryDestination,
    fail_copy_on: Option<usize>,
    fail_ddl: bool,
    copies: usize,
    rollbacks: usize,
}

impl BulkDestination for FlakyDestination {
    fn execute_ddl(&mut self, statement: &str) -> Result<(), DestinationError> {
        if self.fail_ddl {
            return Err(DestinationError::Rejected(
                "permission denied for schema public".to_string(),
            ));
        }
        self.inner.execute_ddl(statement)
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        self.inner.begin()
    }

    fn copy_rows(
        &mut self,
        table: &str,
        columns: &[String],
        payload: &[u8],
    ) -> Result<u64, DestinationError> {
        self.copies += 1;
        if self.fail_copy_on == Some(self.copies) {
            return Err(DestinationError::Rejected(
                "invalid input syntax for type double precision".to_string(),
            ));
        }
        self.inner.copy_rows(table, columns, payload)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        self.rollbacks += 1;
        self.inner.rollback()
    }
}

// ============================================================================
// End-to-End Tests
// ============================================================================

#[test]
fn test_trips_csv_end_to_end() {
    let mut destination = MemoryDestination::new();
    let result = pipeline(trips_config())
        .run_from_path(&mut destination)
        .unwrap();

    assert!(result.success);
    assert!(result.error.is_none());

    let transform = &result.transform;
    assert_eq!(transform.rows_before, 21);
    assert_eq!(transform.duplicates_removed, 1);
    assert_eq!(transform.outliers_removed, 1);
    assert_eq!(transform.rows_after, 19);
    assert_eq!(transform.nulls_before, 4);
    assert_eq!(transform.nulls_after, 0);

    assert_eq!(result.load.table_name, "yellow_taxi");
    assert_eq!(result.load.rows_committed, 19);
    assert_eq!(result.load.batches_total, 4);
    assert_eq!(result.load.batches_committed, 4);
    assert_eq!(result.load.state, LoadState::Completed);

    let sizes: Vec<u64> = destination.batches().iter().map(|b| b.rows).collect();
    assert_eq!(sizes, vec![5, 5, 5, 4]);
    assert_eq!(destination.committed_rows(), 19);

    let columns = &destination.batches()[0].columns;
    assert_eq!(
        columns,
        &vec![
            "vendorid".to_string(),
            "passenger_count".to_string(),
            "trip_distance".to_string(),
            "fare_amount".to_string(),
            "store_and_fwd_flag".to_string(),
        ]
    );

    // No empty field survives the fills.
    for batch in destination.batches() {
        let text = String::from_utf8(batch.payload.clone()).unwrap();
        for line in text.lines() {
            assert!(!line.contains(",,"), "unexpected null in '{line}'");
            assert!(!line.ends_with(','), "unexpected null in '{line}'");
            assert!(!line.contains("950"), "outlier row was loaded");
        }
    }

    assert!(
        result
            .load
            .summary()
            .starts_with("Data insertion complete!, total rows = 19")
    );
}

#[test]
fn test_trips_schema_statement() {
    let mut destination = MemoryDestination::new();
    let result = pipeline(trips_config())
        .run_from_path(&mut destination)
        .unwrap();

    let expected = "create table if not exists \"yellow_taxi\" (\"vendorid\" bigint, \
                    \"passenger_count\" double precision, \"trip_distance\" double precision, \
                    \"fare_amount\" double precision, \"store_and_fwd_flag\" text)";
    assert_eq!(destination.statements(), &[expected.to_string()]);
    assert!(matches!(
        result.schema,
        SchemaOutcome::Ensured { ref statement } if statement == expected
    ));
}

#[test]
fn test_dedup_then_custom_fill() {
    let table = Table::new(
        df![
            "id" => [1i64, 1, 2],
            "val" => [None, None, Some(5i64)],
        ]
        .unwrap(),
    );
    let config = EtlConfig::builder()
        .table_name("readings")
        .fill(FillOperation::custom(["val"], FillValue::Number(0.0)))
        .build()
        .unwrap();

    let (cleaned, summary) = pipeline(config).transform(&table).unwrap();

    let expected = Table::new(
        df![
            "id" => [1i64, 2],
            "val" => [0i64, 5],
        ]
        .unwrap(),
    );
    assert_eq!(cleaned, expected);
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.outliers_removed, 0);
    assert_eq!(summary.nulls_before, 2);
    assert_eq!(summary.nulls_after, 0);
}

#[test]
fn test_keep_duplicates() {
    let config = EtlConfig::builder()
        .source_path(fixtures_path().join("trips.csv"))
        .table_name("yellow_taxi")
        .remove_duplicates(false)
        .build()
        .unwrap();
    let p = pipeline(config);

    let (cleaned, summary) = p.transform(&p.extract().unwrap()).unwrap();
    assert_eq!(summary.duplicates_removed, 0);
    assert_eq!(summary.outliers_removed, 1);
    assert_eq!(cleaned.height(), 20);
}

// ============================================================================
// Failure Handling Tests
// ============================================================================

#[test]
fn test_failed_batch_aborts_remaining_batches() {
    let config = EtlConfig::builder()
        .table_name("readings")
        .chunk_size(2)
        .build()
        .unwrap();
    let table = Table::new(df!["reading" => [10i64, 11, 12, 13, 14, 15]].unwrap());
    let mut destination = FlakyDestination {
        fail_copy_on: Some(2),
        ..Default::default()
    };

    let result = pipeline(config).run(&table, &mut destination).unwrap();

    assert!(!result.success);
    assert_eq!(result.load.batches_total, 3);
    assert_eq!(result.load.batches_committed, 1);
    assert_eq!(result.load.rows_committed, 2);
    assert_eq!(result.load.rows_attempted, 4);
    assert_eq!(result.load.state, LoadState::Aborted { batch: 2 });
    assert_eq!(result.load.errors.len(), 1);
    assert_eq!(result.load.errors[0].batch, 2);

    // Batch 3 was never sent.
    assert_eq!(destination.copies, 2);
    assert_eq!(destination.rollbacks, 1);
    assert_eq!(destination.inner.committed_rows(), 2);
    assert!(!destination.inner.in_transaction());

    let err = result.error.as_ref().unwrap();
    assert_eq!(err.error_code(), "LOAD_ERROR");
    assert!(result.load.summary().contains("aborted at batch 2/3"));
}

#[test]
fn test_schema_failure_is_advisory() {
    let mut destination = FlakyDestination {
        fail_ddl: true,
        ..Default::default()
    };

    let result = pipeline(trips_config())
        .run_from_path(&mut destination)
        .unwrap();

    match &result.schema {
        SchemaOutcome::Skipped { error } => {
            assert_eq!(error.error_code(), "SCHEMA_ERROR");
            assert!(error.is_advisory());
        }
        other => panic!("expected skipped schema, got {other:?}"),
    }
    assert!(result.success);
    assert_eq!(destination.inner.committed_rows(), 19);
    assert!(result.summary().contains("Table creation skipped"));
}

#[test]
fn test_unsupported_format_rejected_before_loading() {
    let config = EtlConfig::builder()
        .source_path("trips.xlsx")
        .table_name("trips")
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();

    let err = pipeline(config)
        .run_from_path(&mut destination)
        .unwrap_err();

    assert_eq!(err.error_code(), "FORMAT_ERROR");
    assert!(destination.statements().is_empty());
    assert!(destination.batches().is_empty());
}

#[test]
fn test_missing_fill_column_fails_before_loading() {
    let config = EtlConfig::builder()
        .source_path(fixtures_path().join("trips.csv"))
        .table_name("trips")
        .fill(FillOperation::new(["tip_amount"], FillStrategy::Mean))
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();

    let err = pipeline(config)
        .run_from_path(&mut destination)
        .unwrap_err();

    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert!(destination.statements().is_empty());
}

// ============================================================================
// Parquet Tests
// ============================================================================

#[test]
fn test_parquet_source_matches_csv() {
    let mut frame = read_table(fixtures_path().join("trips.csv"))
        .unwrap()
        .into_frame();
    let path = temp_file("trips.parquet");
    ParquetWriter::new(std::fs::File::create(&path).unwrap())
        .finish(&mut frame)
        .unwrap();

    let config = EtlConfig::builder()
        .source_path(&path)
        .table_name("yellow_taxi")
        .chunk_size(5)
        .fill(FillOperation::new(["passenger_count"], FillStrategy::Median))
        .fill(FillOperation::new(["store_and_fwd_flag"], FillStrategy::Mode))
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();
    let result = pipeline(config).run_from_path(&mut destination).unwrap();
    std::fs::remove_file(&path).ok();

    assert!(result.success);
    assert_eq!(result.transform.rows_after, 19);
    assert_eq!(destination.committed_rows(), 19);
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let path = temp_file("config.json");
    let raw = format!(
        r#"{{
            "source_path": {source:?},
            "table_name": "yellow_taxi",
            "chunk_size": 5,
            "outliers": {{ "columns": ["fare_amount"], "threshold": 3.0 }},
            "fill_operations": [
                {{ "columns": ["passenger_count"], "strategy": "median" }},
                {{ "columns": ["store_and_fwd_flag"], "strategy": "custom", "value": "N" }}
            ],
            "connection": {{ "host": "db", "port": 5433, "user": "root", "password": "", "database": "ny_taxi" }}
        }}"#,
        source = fixtures_path().join("trips.csv").display().to_string()
    );
    std::fs::write(&path, raw).unwrap();

    let config = EtlConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.chunk_size, 5);
    assert!(config.remove_duplicates);
    assert_eq!(config.connection.port, 5433);
    assert_eq!(config.fill_operations.len(), 2);
    assert_eq!(
        config.fill_operations[1].value,
        Some(FillValue::Text("N".to_string()))
    );

    let mut destination = MemoryDestination::new();
    let result = pipeline(config).run_from_path(&mut destination).unwrap();
    assert!(result.success);
    assert_eq!(result.transform.outliers_removed, 1);
    assert_eq!(destination.committed_rows(), 19);
}

#[test]
fn test_config_unknown_strategy_rejected() {
    let err = EtlConfig::from_json_str(
        r#"{ "table_name": "t", "fill_operations": [ { "columns": ["a"], "strategy": "interpolate" } ] }"#,
    )
    .unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");

    let err = EtlConfig::from_json_str(r#"{ "table_name": "bad name" }"#).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_CONFIG");
}

// ============================================================================
// Progress and Cancellation Tests
// ============================================================================

#[test]
fn test_progress_reports_each_batch() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    let p = Pipeline::builder()
        .config(trips_config())
        .on_progress(move |update| sink.lock().unwrap().push(update))
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();
    p.run_from_path(&mut destination).unwrap();

    let updates = updates.lock().unwrap();
    let batch_updates: Vec<Option<usize>> = updates
        .iter()
        .filter(|u| u.stage == EtlStage::Loading)
        .map(|u| u.items_processed)
        .collect();
    assert_eq!(batch_updates, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(updates.last().map(|u| u.stage), Some(EtlStage::Complete));

    for pair in updates.windows(2) {
        assert!(pair[0].progress <= pair[1].progress);
    }
}

#[test]
fn test_cancel_during_load_keeps_committed_batches() {
    let token = CancellationToken::new();
    let cancel = token.clone();

    let p = Pipeline::builder()
        .config(trips_config())
        .cancellation_token(token)
        .on_progress(move |update| {
            if update.stage == EtlStage::Loading && update.items_processed == Some(2) {
                cancel.cancel();
            }
        })
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();

    let result = p.run_from_path(&mut destination).unwrap();

    assert!(!result.success);
    assert!(result.load.cancelled);
    assert_eq!(result.load.state, LoadState::Aborted { batch: 3 });
    assert_eq!(result.load.rows_committed, 10);
    assert_eq!(destination.committed_rows(), 10);
    assert!(matches!(result.error, Some(EtlError::Cancelled)));
}

#[test]
fn test_cancel_before_run() {
    let token = CancellationToken::new();
    token.cancel();

    let p = Pipeline::builder()
        .config(trips_config())
        .cancellation_token(token)
        .build()
        .unwrap();
    let mut destination = MemoryDestination::new();

    let err = p.run_from_path(&mut destination).unwrap_err();
    assert!(err.is_cancelled());
    assert!(destination.batches().is_empty());
}
