//! Outlier handling module.
//!
//! Z-score based row filtering for numeric columns.

use crate::config::OutlierSpec;
use crate::error::{EtlError, Result};
use crate::table::{ColumnKind, Table};
use crate::utils::{mean_and_std, numeric_values};
use polars::prelude::*;
use tracing::debug;

/// Removes rows whose numeric values lie too far from the column mean.
pub struct OutlierFilter;

impl OutlierFilter {
    /// Drop every row that has `|z| > threshold` in any target column.
    ///
    /// Mean and sample standard deviation are computed over the non-null
    /// values of each column. A zero (or undefined) deviation is replaced by
    /// 1, which leaves constant columns alone. Null cells never flag a row.
    /// Surviving rows keep their order.
    ///
    /// Returns the filtered table and the number of rows removed.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] if a requested column is absent or not
    /// numeric, or the threshold is not a positive number.
    pub fn remove_outliers(table: &Table, spec: &OutlierSpec) -> Result<(Table, usize)> {
        spec.validate()?;

        let columns = match &spec.columns {
            Some(cols) => {
                table.require_columns(cols)?;
                for col in cols {
                    if table.column_kind(col)? != ColumnKind::Numeric {
                        return Err(EtlError::validation(format!(
                            "column '{col}' is not a valid numeric column"
                        )));
                    }
                }
                cols.clone()
            }
            None => table.numeric_columns(),
        };

        let mut keep = vec![true; table.height()];
        for col in &columns {
            let series = table.series(col)?;
            let Some((mean, std)) = mean_and_std(&numeric_values(series)?) else {
                continue;
            };
            let std = match std {
                Some(s) if s != 0.0 && s.is_finite() => s,
                _ => 1.0,
            };

            let floats = series.cast(&DataType::Float64)?;
            let mut flagged = 0usize;
            for (row, value) in floats.f64()?.into_iter().enumerate() {
                if let Some(v) = value
                    && ((v - mean) / std).abs() > spec.threshold
                {
                    if keep[row] {
                        flagged += 1;
                    }
                    keep[row] = false;
                }
            }
            debug!(
                "'{}': mean {:.3}, std {:.3}, {} new outlier rows",
                col, mean, std, flagged
            );
        }

        let before = table.height();
        let mask = BooleanChunked::from_slice("mask".into(), &keep);
        let filtered = table.filter(&mask)?;
        let removed = before - filtered.height();
        if removed > 0 {
            debug!("Removed {} outlier rows", removed);
        }

        Ok((filtered, removed))
    }
}
