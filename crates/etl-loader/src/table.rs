//! In-memory columnar table used by every pipeline stage.
//!
//! [`Table`] wraps a polars [`DataFrame`], which already guarantees unique
//! column names and equal column lengths, and adds the column-kind view and
//! validated column lookup the transforms need.

use crate::error::{EtlError, Result};
use crate::utils::{is_datetime_dtype, is_numeric_dtype};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declared kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating point numbers
    Numeric,
    /// Strings and anything without a more specific kind
    Text,
    /// Boolean type
    Boolean,
    /// Date, datetime or time
    Datetime,
}

impl ColumnKind {
    /// Classify a polars data type.
    pub fn of(dtype: &DataType) -> Self {
        if is_numeric_dtype(dtype) {
            Self::Numeric
        } else if is_datetime_dtype(dtype) {
            Self::Datetime
        } else if matches!(dtype, DataType::Boolean) {
            Self::Boolean
        } else {
            Self::Text
        }
    }
}

/// Ordered collection of named, typed, equal-length columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    frame: DataFrame,
}

impl From<DataFrame> for Table {
    fn from(frame: DataFrame) -> Self {
        Self { frame }
    }
}

impl Table {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Look up a column by name.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] if the column does not exist.
    pub fn series(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| EtlError::validation(format!("column '{name}' not found in table")))
    }

    /// Kind of the named column.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] if the column does not exist.
    pub fn column_kind(&self, name: &str) -> Result<ColumnKind> {
        Ok(ColumnKind::of(self.series(name)?.dtype()))
    }

    /// Names of every numeric column, in table order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.frame
            .get_columns()
            .iter()
            .filter(|c| is_numeric_dtype(c.dtype()))
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn null_count(&self, name: &str) -> Result<usize> {
        Ok(self.series(name)?.null_count())
    }

    /// Fail unless every name refers to an existing column.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] listing the missing columns.
    pub fn require_columns(&self, names: &[String]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EtlError::validation(format!(
                "columns not present in the table: {}",
                missing.join(", ")
            )))
        }
    }

    /// A copy of this table with one column replaced.
    pub fn with_replaced(&self, name: &str, series: Series) -> Result<Table> {
        let mut frame = self.frame.clone();
        frame.replace(name, series)?;
        Ok(Table { frame })
    }

    /// Keep the rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanChunked) -> Result<Table> {
        Ok(Table {
            frame: self.frame.filter(mask)?,
        })
    }

    /// Rows `offset..offset + len`, clamped to the table.
    pub fn slice(&self, offset: usize, len: usize) -> Table {
        Table {
            frame: self.frame.slice(offset as i64, len),
        }
    }

    /// Lower-cased column names, in table order.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] when two columns collide after lower-casing.
    pub fn lowercase_column_names(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.width());
        for name in self.column_names() {
            let lower = name.to_lowercase();
            if !seen.insert(lower.clone()) {
                return Err(EtlError::validation(format!(
                    "column '{name}' collides with another column once lower-cased ('{lower}')"
                )));
            }
            names.push(lower);
        }
        Ok(names)
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.frame.equals_missing(&other.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        df![
            "id" => [1i64, 2, 3],
            "name" => [Some("a"), None, Some("c")],
            "active" => [true, false, true],
            "fare" => [Some(1.5), Some(2.5), None],
        ]
        .unwrap()
        .into()
    }

    #[test]
    fn test_column_kinds() {
        let table = sample();
        assert_eq!(table.column_kind("id").unwrap(), ColumnKind::Numeric);
        assert_eq!(table.column_kind("name").unwrap(), ColumnKind::Text);
        assert_eq!(table.column_kind("active").unwrap(), ColumnKind::Boolean);
        assert_eq!(
            ColumnKind::of(&DataType::Datetime(TimeUnit::Microseconds, None)),
            ColumnKind::Datetime
        );
    }

    #[test]
    fn test_missing_column_is_validation_error() {
        let table = sample();
        let err = table.column_kind("nope").unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let err = table
            .require_columns(&["id".to_string(), "ghost".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_numeric_columns() {
        assert_eq!(sample().numeric_columns(), vec!["id", "fare"]);
    }

    #[test]
    fn test_slice_clamps() {
        let table = sample();
        assert_eq!(table.slice(2, 10).height(), 1);
        assert_eq!(table.slice(0, 2).height(), 2);
    }

    #[test]
    fn test_lowercase_column_names() {
        let table: Table = df!["VendorID" => [1i64], "Fare" => [2.0]].unwrap().into();
        assert_eq!(table.lowercase_column_names().unwrap(), vec!["vendorid", "fare"]);

        let clash: Table = df!["ID" => [1i64], "id" => [2i64]].unwrap().into();
        assert!(clash.lowercase_column_names().is_err());
    }

    #[test]
    fn test_null_count() {
        let table = sample();
        assert_eq!(table.null_count("name").unwrap(), 1);
        assert_eq!(table.null_count("id").unwrap(), 0);
    }
}
