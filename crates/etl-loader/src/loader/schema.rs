//! Destination table creation.
//!
//! Builds a `create table if not exists` statement from the column types of
//! a [`Table`]. Creation is advisory: when the statement fails the load still
//! goes ahead and the store rejects incompatible rows itself.

use super::BulkDestination;
use crate::error::{EtlError, Result};
use crate::table::Table;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex: table name"));

/// Whether `name` can be used as a destination table name.
///
/// Letters, digits and underscores, not starting with a digit.
pub fn is_valid_table_name(name: &str) -> bool {
    TABLE_NAME.is_match(name)
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// PostgreSQL column type for a polars data type.
pub fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "bigint",
        DataType::Float32 | DataType::Float64 => "double precision",
        DataType::Boolean => "boolean",
        DataType::Date => "date",
        DataType::Datetime(_, _) => "timestamp",
        DataType::Time => "time",
        _ => "text",
    }
}

/// Result of trying to ensure the destination table exists.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchemaOutcome {
    /// The statement ran; the table exists now (it may have existed before).
    Ensured { statement: String },
    /// The statement failed. Carries an [`EtlError::Schema`].
    Skipped { error: EtlError },
}

impl SchemaOutcome {
    pub fn is_ensured(&self) -> bool {
        matches!(self, Self::Ensured { .. })
    }
}

/// Infers and applies the destination table definition.
pub struct SchemaInferencer;

impl SchemaInferencer {
    /// Build the DDL for `table_name` from the table's column types.
    ///
    /// Table and column names are lower-cased and double-quoted.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] for an invalid table name, a table without
    /// columns, or column names that collide once lower-cased.
    pub fn infer_create_table(table: &Table, table_name: &str) -> Result<String> {
        if !is_valid_table_name(table_name) {
            return Err(EtlError::validation(format!(
                "invalid table name '{table_name}'"
            )));
        }
        if table.width() == 0 {
            return Err(EtlError::validation("cannot create a table without columns"));
        }

        let names = table.lowercase_column_names()?;
        let definitions: Vec<String> = names
            .iter()
            .zip(table.frame().get_columns())
            .map(|(name, col)| format!("{} {}", quote_identifier(name), sql_type(col.dtype())))
            .collect();

        Ok(format!(
            "create table if not exists {} ({})",
            quote_identifier(&table_name.to_lowercase()),
            definitions.join(", ")
        ))
    }

    /// Create the destination table if it does not exist.
    ///
    /// A failing statement is logged and returned as
    /// [`SchemaOutcome::Skipped`]; only validation problems are errors.
    pub fn ensure(
        destination: &mut dyn BulkDestination,
        table: &Table,
        table_name: &str,
    ) -> Result<SchemaOutcome> {
        let statement = Self::infer_create_table(table, table_name)?;

        match destination.execute_ddl(&statement) {
            Ok(()) => {
                info!("Table '{}' is ready", table_name.to_lowercase());
                Ok(SchemaOutcome::Ensured { statement })
            }
            Err(e) => {
                let error = EtlError::Schema {
                    table: table_name.to_lowercase(),
                    reason: e.to_string(),
                };
                warn!("{}; continuing with the load", error);
                Ok(SchemaOutcome::Skipped { error })
            }
        }
    }
}
