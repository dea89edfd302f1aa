//! Data cleaning module.
//!
//! Removes exact duplicate rows. Runs before imputation so repeated rows do
//! not skew mode and median statistics.

use crate::error::Result;
use crate::table::Table;
use polars::prelude::*;
use tracing::debug;

/// Data cleaner for whole-row cleaning operations.
pub struct DataCleaner;

impl DataCleaner {
    /// Drop rows that duplicate an earlier row across every column.
    ///
    /// The first occurrence is kept and the original row order is preserved.
    /// Returns the cleaned table and the number of rows removed.
    pub fn drop_duplicates(table: &Table) -> Result<(Table, usize)> {
        let before = table.height();
        let frame = table
            .frame()
            .unique_stable(None, UniqueKeepStrategy::First, None)?;
        let removed = before - frame.height();

        if removed > 0 {
            let pct = (removed as f64 / before as f64) * 100.0;
            debug!("Removed {} duplicate rows ({:.1}%)", removed, pct);
        } else {
            debug!("No duplicate rows found");
        }

        Ok((Table::new(frame), removed))
    }
}
