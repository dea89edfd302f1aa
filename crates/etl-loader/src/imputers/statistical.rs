//! Statistical null filling.
//!
//! Provides mode, median, mean and custom-literal imputation for the columns
//! named by a [`FillOperation`].

use crate::config::{FillOperation, FillStrategy, FillValue};
use crate::error::{EtlError, Result};
use crate::table::{ColumnKind, Table};
use crate::utils::{
    fill_boolean_nulls, fill_nulls_with, fill_numeric_nulls, fill_string_nulls,
    is_integer_dtype, median, numeric_values,
};
use polars::prelude::*;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

/// Fills missing values according to a [`FillOperation`].
pub struct NullImputer;

impl NullImputer {
    /// Apply one fill operation and return the resulting table.
    ///
    /// Every check runs before any column is touched, so on error the input
    /// table is returned to the caller unchanged. Columns without nulls are
    /// left as they are.
    ///
    /// # Errors
    ///
    /// [`EtlError::Validation`] when no column is named, a column is absent,
    /// `custom` has no value, or `median`/`mean` targets a non-numeric column.
    pub fn fill(
        table: &Table,
        op: &FillOperation,
        processing_steps: &mut Vec<String>,
    ) -> Result<Table> {
        op.validate()?;
        table.require_columns(&op.columns)?;

        if op.strategy.requires_numeric() {
            for col in &op.columns {
                if table.column_kind(col)? != ColumnKind::Numeric {
                    return Err(EtlError::validation(format!(
                        "strategy '{}' needs a numeric column, '{col}' is not numeric",
                        op.strategy
                    )));
                }
            }
        }

        let mut result = table.clone();
        for col in &op.columns {
            let series = result.series(col)?;
            let nulls = series.null_count();
            if nulls == 0 {
                debug!("'{}' has no missing values, skipping", col);
                continue;
            }

            let filled = match op.strategy {
                FillStrategy::Mode => Self::mode_fill(series)?,
                FillStrategy::Median => Self::statistic_fill(series, median)?,
                FillStrategy::Mean => Self::statistic_fill(series, |values| {
                    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
                })?,
                FillStrategy::Custom => {
                    // validate() guarantees a value for custom
                    let value = op.value.as_ref().ok_or_else(|| {
                        EtlError::validation("strategy 'custom' requires a fill value")
                    })?;
                    Some(Self::custom_fill(series, value)?)
                }
            };

            match filled {
                Some((series, description)) => {
                    processing_steps.push(format!(
                        "Filled {} missing values in '{}' with {}",
                        nulls, col, description
                    ));
                    debug!("Filled '{}' ({} nulls) with {}", col, nulls, description);
                    result = result.with_replaced(col, series)?;
                }
                None => {
                    warn!(
                        "'{}' has no non-null values; cannot compute {}, left unchanged",
                        col, op.strategy
                    );
                }
            }
        }

        Ok(result)
    }

    /// Median or mean fill. The column becomes Float64.
    fn statistic_fill(
        series: &Series,
        statistic: impl Fn(&[f64]) -> Option<f64>,
    ) -> Result<Option<(Series, String)>> {
        let values = numeric_values(series)?;
        let Some(fill_value) = statistic(&values) else {
            return Ok(None);
        };
        let filled = fill_numeric_nulls(series, fill_value)?;
        Ok(Some((filled, format!("{fill_value:.2}"))))
    }

    /// Mode fill that keeps the column's type.
    ///
    /// Ties go to the value that appears first.
    fn mode_fill(series: &Series) -> Result<Option<(Series, String)>> {
        let dtype = series.dtype().clone();
        let filled = match ColumnKind::of(&dtype) {
            ColumnKind::Numeric if dtype == DataType::UInt64 => {
                let mode = first_mode(series.u64()?.into_iter());
                mode.map(|m| {
                    let fill = Series::new(series.name().clone(), [m]);
                    fill_nulls_with(series, &fill).map(|s| (s, format!("mode: {m}")))
                })
                .transpose()?
            }
            ColumnKind::Numeric if is_integer_dtype(&dtype) => {
                // Every other integer type widens to i64 without loss.
                let ints = series.cast(&DataType::Int64)?;
                let mode = first_mode(ints.i64()?.into_iter());
                mode.map(|m| {
                    let fill = Series::new(series.name().clone(), [m]);
                    fill_nulls_with(series, &fill).map(|s| (s, format!("mode: {m}")))
                })
                .transpose()?
            }
            ColumnKind::Numeric => {
                let floats = series.cast(&DataType::Float64)?;
                // Keyed by bit pattern; -0.0 folds into 0.0.
                let mode = first_mode(
                    floats
                        .f64()?
                        .into_iter()
                        .map(|v| v.map(|x| (if x == 0.0 { 0.0f64 } else { x }).to_bits())),
                )
                .map(f64::from_bits);
                mode.map(|m| {
                    let fill = Series::new(series.name().clone(), [m]);
                    fill_nulls_with(series, &fill).map(|s| (s, format!("mode: {m}")))
                })
                .transpose()?
            }
            ColumnKind::Boolean => {
                let mode = first_mode(series.bool()?.into_iter());
                match mode {
                    Some(m) => Some((fill_boolean_nulls(series, m)?, format!("mode: {m}"))),
                    None => None,
                }
            }
            ColumnKind::Datetime => {
                let physical = series.to_physical_repr().cast(&DataType::Int64)?;
                let mode = first_mode(physical.i64()?.into_iter());
                match mode {
                    Some(m) => {
                        let fill = Series::new(series.name().clone(), [m]).cast(&dtype)?;
                        let shown = fill.get(0)?.to_string();
                        Some((fill_nulls_with(series, &fill)?, format!("mode: {shown}")))
                    }
                    None => None,
                }
            }
            ColumnKind::Text => {
                let strings = series.cast(&DataType::String)?;
                let mode = first_mode(strings.str()?.into_iter()).map(ToOwned::to_owned);
                match mode {
                    Some(m) => {
                        let filled = fill_string_nulls(series, &m)?;
                        Some((filled, format!("mode: '{m}'")))
                    }
                    None => None,
                }
            }
        };
        Ok(filled)
    }

    /// Fill with a caller-supplied literal.
    ///
    /// A literal whose kind does not match the column turns the column into text.
    fn custom_fill(series: &Series, value: &FillValue) -> Result<(Series, String)> {
        let dtype = series.dtype().clone();
        let filled = match (ColumnKind::of(&dtype), value) {
            (ColumnKind::Numeric, FillValue::Number(n)) => {
                let integral = n.fract() == 0.0 && n.abs() < 2f64.powi(63);
                if !is_integer_dtype(&dtype) {
                    fill_nulls_with(series, &Series::new(series.name().clone(), [*n]))?
                } else if let Some(filled) = integral
                    .then(|| {
                        let fill = Series::new(series.name().clone(), [*n as i64]);
                        fill_nulls_with(series, &fill).ok()
                    })
                    .flatten()
                {
                    filled
                } else {
                    warn!(
                        "'{}' is {} but {} does not fit it; converting the column to Float64",
                        series.name(),
                        dtype,
                        n
                    );
                    fill_numeric_nulls(series, *n)?
                }
            }
            (ColumnKind::Boolean, FillValue::Boolean(b)) => fill_boolean_nulls(series, *b)?,
            (ColumnKind::Text, v) => fill_string_nulls(series, &v.to_string())?,
            (kind, v) => {
                warn!(
                    "'{}' is {:?} but the fill value '{}' is not; converting the column to text",
                    series.name(),
                    kind,
                    v
                );
                fill_string_nulls(series, &v.to_string())?
            }
        };
        Ok((filled, format!("custom value: '{value}'")))
    }
}

/// Most frequent non-null item; ties resolved by earliest first occurrence.
fn first_mode<K, I>(values: I) -> Option<K>
where
    K: Eq + Hash,
    I: IntoIterator<Item = Option<K>>,
{
    let mut counts: HashMap<K, (usize, usize)> = HashMap::new();
    for (idx, value) in values.into_iter().enumerate() {
        if let Some(v) = value {
            counts.entry(v).or_insert((0, idx)).0 += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(value, _)| value)
}
