//! In-memory destination used for dry runs.

use super::{BulkDestination, DestinationError};
use std::collections::HashMap;

/// A batch that reached the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedBatch {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: u64,
    pub payload: Vec<u8>,
}

/// Keeps DDL statements and committed CSV batches in memory.
///
/// Copies outside a transaction are rejected, and batches copied inside a
/// transaction only become visible on commit.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    statements: Vec<String>,
    committed: Vec<CopiedBatch>,
    pending: Option<Vec<CopiedBatch>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// DDL statements executed so far.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Committed batches in commit order.
    pub fn batches(&self) -> &[CopiedBatch] {
        &self.committed
    }

    /// Total committed rows per table.
    pub fn row_counts(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for batch in &self.committed {
            *counts.entry(batch.table.clone()).or_insert(0) += batch.rows;
        }
        counts
    }

    /// Total committed rows across all tables.
    pub fn committed_rows(&self) -> u64 {
        self.committed.iter().map(|b| b.rows).sum()
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }
}

impl BulkDestination for MemoryDestination {
    fn execute_ddl(&mut self, statement: &str) -> Result<(), DestinationError> {
        self.statements.push(statement.to_string());
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DestinationError> {
        if self.pending.is_some() {
            return Err(DestinationError::Rejected(
                "a transaction is already open".to_string(),
            ));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn copy_rows(
        &mut self,
        table: &str,
        columns: &[String],
        payload: &[u8],
    ) -> Result<u64, DestinationError> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| DestinationError::Rejected("no open transaction".to_string()))?;

        let rows = count_csv_records(payload);
        pending.push(CopiedBatch {
            table: table.to_string(),
            columns: columns.to_vec(),
            rows,
            payload: payload.to_vec(),
        });
        Ok(rows)
    }

    fn commit(&mut self) -> Result<(), DestinationError> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| DestinationError::Rejected("no open transaction".to_string()))?;
        self.committed.extend(pending);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DestinationError> {
        self.pending = None;
        Ok(())
    }
}

/// Count CSV records, ignoring line breaks inside quoted fields.
fn count_csv_records(payload: &[u8]) -> u64 {
    let mut in_quotes = false;
    let mut records = 0;
    for &byte in payload {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => records += 1,
            _ => {}
        }
    }
    if payload.last().is_some_and(|b| *b != b'\n') {
        records += 1;
    }
    records
}
