//! Configuration types for the ETL pipeline.
//!
//! Fill operations are typed records rather than loose keyword arguments,
//! and the run configuration is assembled with a builder and validated
//! before any data is touched.

use crate::error::{EtlError, Result};
use crate::loader::schema::is_valid_table_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default number of rows per load batch.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Default Z-score threshold for outlier removal.
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.0;

/// Strategy for filling missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum FillStrategy {
    /// Most frequent non-null value
    #[default]
    Mode,
    /// Median of the non-null numeric values
    Median,
    /// Mean of the non-null numeric values
    Mean,
    /// A literal supplied by the caller
    Custom,
}

impl FillStrategy {
    /// Lower-case name as used in configuration files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mode => "mode",
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Custom => "custom",
        }
    }

    /// Whether this strategy needs numeric columns.
    pub fn requires_numeric(&self) -> bool {
        matches!(self, Self::Median | Self::Mean)
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillStrategy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mode" => Ok(Self::Mode),
            "median" => Ok(Self::Median),
            "mean" => Ok(Self::Mean),
            "custom" => Ok(Self::Custom),
            other => Err(EtlError::validation(format!(
                "unknown fill strategy '{other}': must be 'mode', 'median', 'mean' or 'custom'"
            ))),
        }
    }
}

impl TryFrom<String> for FillStrategy {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FillStrategy> for String {
    fn from(strategy: FillStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

/// A literal used by [`FillStrategy::Custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl FillValue {
    /// Interpret a raw command-line literal.
    ///
    /// `true`/`false` (any case) become booleans, anything that parses as a
    /// float becomes a number, everything else stays text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => Self::Boolean(true),
            "false" => Self::Boolean(false),
            _ => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map_or_else(|| Self::Text(raw.to_string()), Self::Number),
        }
    }
}

impl fmt::Display for FillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One null-filling instruction: which columns, how, and with what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOperation {
    pub columns: Vec<String>,
    #[serde(default)]
    pub strategy: FillStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FillValue>,
}

impl FillOperation {
    /// Create an operation for a statistical strategy.
    pub fn new<I, S>(columns: I, strategy: FillStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            strategy,
            value: None,
        }
    }

    /// Create a [`FillStrategy::Custom`] operation.
    pub fn custom<I, S>(columns: I, value: FillValue) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            strategy: FillStrategy::Custom,
            value: Some(value),
        }
    }

    /// Checks that do not need the table.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] when no column is named, or when the custom
    /// strategy has no literal.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(EtlError::validation(
                "you must specify at least one column to fill",
            ));
        }
        if self.strategy == FillStrategy::Custom && self.value.is_none() {
            return Err(EtlError::validation(
                "strategy 'custom' requires a fill value",
            ));
        }
        Ok(())
    }
}

/// Parses `col_a,col_b=strategy[:value]`. The strategy defaults to `mode`.
impl FromStr for FillOperation {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        let (cols, rest) = match s.split_once('=') {
            Some((cols, rest)) => (cols, Some(rest)),
            None => (s, None),
        };

        let columns: Vec<String> = cols
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        let (strategy, value) = match rest {
            None => (FillStrategy::Mode, None),
            Some(rest) => match rest.split_once(':') {
                Some((strategy, value)) => (strategy.parse()?, Some(FillValue::parse(value))),
                None => (rest.parse()?, None),
            },
        };

        let op = Self {
            columns,
            strategy,
            value,
        };
        op.validate()?;
        Ok(op)
    }
}

/// Which columns to screen for outliers and how strictly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierSpec {
    /// Columns to check. `None` means every numeric column.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Absolute Z-score above which a value is an outlier.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_OUTLIER_THRESHOLD
}

impl Default for OutlierSpec {
    fn default() -> Self {
        Self {
            columns: None,
            threshold: DEFAULT_OUTLIER_THRESHOLD,
        }
    }
}

impl OutlierSpec {
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// # Errors
    ///
    /// [`EtlError::Validation`] unless the threshold is a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(EtlError::validation(format!(
                "outlier threshold must be a positive number, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// PostgreSQL connection target.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PostgreSQL at {}:{}, database: {} (user '{}')",
            self.host, self.port, self.database, self.user
        )
    }
}

/// Configuration for one ETL run.
///
/// Use [`EtlConfig::builder()`] to create a configuration with the fluent API,
/// or [`EtlConfig::from_json_file`] to read one from disk.
///
/// # Example
///
/// ```rust,ignore
/// use etl_loader::config::{EtlConfig, FillOperation, FillStrategy};
///
/// let config = EtlConfig::builder()
///     .table_name("yellow_trips")
///     .chunk_size(5_000)
///     .outlier_threshold(3.0)
///     .fill(FillOperation::new(["passenger_count"], FillStrategy::Median))
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Database connection target.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Source CSV or Parquet file.
    #[serde(default)]
    pub source_path: Option<PathBuf>,

    /// Destination table name.
    pub table_name: String,

    /// Rows per load batch.
    /// Default: 10 000
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Outlier screening parameters.
    #[serde(default)]
    pub outliers: OutlierSpec,

    /// Fill operations, applied in order.
    #[serde(default)]
    pub fill_operations: Vec<FillOperation>,

    /// Whether to drop exact duplicate rows before imputation.
    /// Default: true
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

impl EtlConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EtlConfigBuilder {
        EtlConfigBuilder::default()
    }

    /// Read and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// IO errors, [`EtlError::Validation`] for malformed or unknown values
    /// (such as an unknown fill strategy) and [`EtlError::Config`] when the
    /// resulting configuration is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// See [`EtlConfig::from_json_file`].
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: EtlConfig = serde_json::from_str(raw).map_err(|e| {
            if e.is_data() {
                EtlError::validation(e.to_string())
            } else {
                EtlError::Json(e)
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !is_valid_table_name(&self.table_name) {
            return Err(ConfigValidationError::InvalidTableName(
                self.table_name.clone(),
            ));
        }

        if self.chunk_size == 0 {
            return Err(ConfigValidationError::InvalidChunkSize(self.chunk_size));
        }

        if self.outliers.validate().is_err() {
            return Err(ConfigValidationError::InvalidThreshold(
                self.outliers.threshold,
            ));
        }

        for op in &self.fill_operations {
            op.validate()
                .map_err(|e| ConfigValidationError::InvalidFillOperation(e.to_string()))?;
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid table name '{0}' (letters, digits and underscores only)")]
    InvalidTableName(String),

    #[error("Invalid chunk size: {0} (must be at least 1)")]
    InvalidChunkSize(usize),

    #[error("Invalid outlier threshold: {0} (must be a positive number)")]
    InvalidThreshold(f64),

    #[error("Invalid fill operation: {0}")]
    InvalidFillOperation(String),
}

/// Builder for [`EtlConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct EtlConfigBuilder {
    connection: Option<ConnectionConfig>,
    source_path: Option<PathBuf>,
    table_name: Option<String>,
    chunk_size: Option<usize>,
    outlier_threshold: Option<f64>,
    outlier_columns: Option<Vec<String>>,
    fill_operations: Vec<FillOperation>,
    remove_duplicates: Option<bool>,
}

impl EtlConfigBuilder {
    /// Start from an existing configuration, e.g. one read from a file.
    pub fn from_config(config: EtlConfig) -> Self {
        Self {
            connection: Some(config.connection),
            source_path: config.source_path,
            table_name: Some(config.table_name),
            chunk_size: Some(config.chunk_size),
            outlier_threshold: Some(config.outliers.threshold),
            outlier_columns: config.outliers.columns,
            fill_operations: config.fill_operations,
            remove_duplicates: Some(config.remove_duplicates),
        }
    }

    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Set the number of rows sent per batch.
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = Some(threshold);
        self
    }

    /// Restrict outlier screening to these columns.
    ///
    /// If not set, every numeric column is screened.
    pub fn outlier_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outlier_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Append a fill operation. Operations run in insertion order.
    pub fn fill(mut self, op: FillOperation) -> Self {
        self.fill_operations.push(op);
        self
    }

    pub fn remove_duplicates(mut self, remove: bool) -> Self {
        self.remove_duplicates = Some(remove);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `EtlConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<EtlConfig, ConfigValidationError> {
        let config = EtlConfig {
            connection: self.connection.unwrap_or_default(),
            source_path: self.source_path,
            table_name: self.table_name.unwrap_or_default(),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            outliers: OutlierSpec {
                columns: self.outlier_columns,
                threshold: self.outlier_threshold.unwrap_or(DEFAULT_OUTLIER_THRESHOLD),
            },
            fill_operations: self.fill_operations,
            remove_duplicates: self.remove_duplicates.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
