//! Custom error types for the ETL pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. The variants
//! follow the life cycle of a run: input format, parameter validation,
//! schema creation (advisory) and batch loading (fatal).
//!
//! Errors are serializable so a run report can be emitted as JSON.

use crate::loader::DestinationError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the ETL pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Input file has an extension the extractor does not understand.
    #[error("Unsupported input format '{extension}': data must be in CSV or Parquet format")]
    Format { extension: String },

    /// Bad column reference, unknown strategy or missing parameter.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// DDL execution failed. Logged and bypassed by the pipeline.
    #[error("Failed to create table '{table}': {reason}")]
    Schema { table: String, reason: String },

    /// A batch could not be transferred or committed.
    #[error("Batch {batch} ({rows} rows) failed to load: {message}")]
    Load {
        batch: usize,
        rows: usize,
        message: String,
    },

    /// Load was cancelled between batches.
    #[error("Load cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Database collaborator error outside of a batch (e.g. connecting).
    #[error("Database error: {0}")]
    Destination(#[from] DestinationError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// Shorthand for a [`EtlError::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        EtlError::Validation(message.into())
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EtlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, used in JSON reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Format { .. } => "FORMAT_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::Load { .. } => "LOAD_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Destination(_) => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the pipeline may carry on after this error.
    ///
    /// Only schema creation failures are advisory; the receiving store is
    /// left to reject incompatible rows during the load.
    pub fn is_advisory(&self) -> bool {
        match self {
            Self::Schema { .. } => true,
            Self::WithContext { source, .. } => source.is_advisory(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for EtlError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("EtlError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(EtlError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            EtlError::validation("no columns").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            EtlError::Format {
                extension: "xlsx".to_string()
            }
            .error_code(),
            "FORMAT_ERROR"
        );
    }

    #[test]
    fn test_is_advisory() {
        let schema = EtlError::Schema {
            table: "trips".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(schema.is_advisory());

        let load = EtlError::Load {
            batch: 2,
            rows: 10,
            message: "connection reset".to_string(),
        };
        assert!(!load.is_advisory());
    }

    #[test]
    fn test_load_error_message_names_batch() {
        let error = EtlError::Load {
            batch: 3,
            rows: 500,
            message: "duplicate key".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("Batch 3"));
        assert!(text.contains("500 rows"));
    }

    #[test]
    fn test_error_serialization() {
        let error = EtlError::validation("Column 'fare' not found");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(json.contains("fare"));
    }

    #[test]
    fn test_with_context() {
        let error = EtlError::Cancelled.with_context("During load");
        assert!(error.to_string().contains("During load"));
        assert_eq!(error.error_code(), "CANCELLED");
        assert!(error.is_cancelled());
    }
}
