//! Reading CSV and Parquet files into a [`Table`].

use crate::error::{EtlError, Result, ResultExt};
use crate::table::Table;
use polars::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Rows scanned when inferring CSV column types.
const INFER_SCHEMA_ROWS: usize = 10_000;

/// Recognized input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    /// Decide the format from the file extension alone (case-insensitive).
    ///
    /// # Errors
    ///
    /// [`EtlError::Format`] for any extension other than `.csv` or `.parquet`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            _ => Err(EtlError::Format { extension: ext }),
        }
    }
}

/// Load a CSV or Parquet file.
///
/// The extension is checked before the file is opened.
///
/// # Errors
///
/// [`EtlError::Format`] for unsupported extensions, IO and polars errors
/// while reading.
pub fn read_table(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let format = SourceFormat::from_path(path)?;

    info!("Loading dataset from: {}", path.display());
    let frame = match format {
        SourceFormat::Csv => CsvReadOptions::default()
            .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .context("Failed to open CSV")?
            .finish()
            .context("Failed to read CSV")?,
        SourceFormat::Parquet => ParquetReader::new(std::fs::File::open(path)?)
            .finish()
            .context("Failed to read Parquet")?,
    };

    debug!("Loaded shape: {:?}", frame.shape());
    Ok(Table::new(frame))
}
