//! Shared helpers for working with polars data types and series values.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    is_numeric_dtype(dtype) && !matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a DataType is a date/time type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

// =============================================================================
// Series Value Utilities
// =============================================================================

/// Non-null values of a numeric Series as `f64`, in row order.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_iter().flatten().collect())
}

/// Sample mean and sample standard deviation (ddof = 1).
///
/// Returns `None` for an empty slice. The deviation is `None` when fewer
/// than two values are available.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, Option<f64>)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return Some((mean, None));
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, Some(var.sqrt())))
}

/// Median of a slice of floats. `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Fill null values in a numeric Series with a specific value.
///
/// The result is always Float64.
pub fn fill_numeric_nulls(series: &Series, fill_value: f64) -> PolarsResult<Series> {
    let floats = series.cast(&DataType::Float64)?;
    let filled: Vec<Option<f64>> = floats
        .f64()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill_value)))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Replace nulls with the single value in `fill`, keeping the column type.
///
/// Non-null cells are taken from `series` as they are; only `fill` is cast.
pub fn fill_nulls_with(series: &Series, fill: &Series) -> PolarsResult<Series> {
    let fill = fill
        .strict_cast(series.dtype())?
        .new_from_index(0, series.len());
    series.zip_with(&series.is_not_null(), &fill)
}

/// Fill null values in a string Series with a specific value.
///
/// Non-string columns are rendered to text first.
pub fn fill_string_nulls(series: &Series, fill_value: &str) -> PolarsResult<Series> {
    let strings = series.cast(&DataType::String)?;
    let filled: Vec<Option<String>> = strings
        .str()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill_value).to_string()))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

/// Fill null values in a boolean Series with a specific value.
pub fn fill_boolean_nulls(series: &Series, fill_value: bool) -> PolarsResult<Series> {
    let filled: Vec<Option<bool>> = series
        .bool()?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill_value)))
        .collect();
    Ok(Series::new(series.name().clone(), filled))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_is_integer_dtype() {
        assert!(is_integer_dtype(&DataType::UInt8));
        assert!(!is_integer_dtype(&DataType::Float32));
    }

    #[test]
    fn test_is_datetime_dtype() {
        assert!(is_datetime_dtype(&DataType::Date));
        assert!(is_datetime_dtype(&DataType::Datetime(
            TimeUnit::Milliseconds,
            None
        )));
        assert!(!is_datetime_dtype(&DataType::String));
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(mean, 5.0);
        // sample variance = 32 / 7
        assert!((std.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);

        assert_eq!(mean_and_std(&[1.5]), Some((1.5, None)));
        assert_eq!(mean_and_std(&[]), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_numeric_values_skips_nulls() {
        let series = Series::new("v".into(), &[Some(1i64), None, Some(3)]);
        assert_eq!(numeric_values(&series).unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_fill_numeric_nulls() {
        let series = Series::new("test".into(), &[Some(1.0), None, Some(3.0)]);
        let filled = fill_numeric_nulls(&series, 0.0).unwrap();

        assert_eq!(filled.get(0).unwrap().try_extract::<f64>().unwrap(), 1.0);
        assert_eq!(filled.get(1).unwrap().try_extract::<f64>().unwrap(), 0.0);
        assert_eq!(filled.get(2).unwrap().try_extract::<f64>().unwrap(), 3.0);
    }

    #[test]
    fn test_fill_nulls_with_keeps_large_integers() {
        let big = (1i64 << 53) + 1;
        let series = Series::new("id".into(), &[Some(big), None]);
        let filled = fill_nulls_with(&series, &Series::new("fill".into(), [0i64])).unwrap();

        assert_eq!(filled.dtype(), &DataType::Int64);
        let values: Vec<Option<i64>> = filled.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(big), Some(0)]);
    }

    #[test]
    fn test_fill_nulls_with_rejects_unrepresentable_fill() {
        let series = Series::new("small".into(), &[Some(1i8), None]);
        assert!(fill_nulls_with(&series, &Series::new("fill".into(), [1000i64])).is_err());
    }

    #[test]
    fn test_fill_string_nulls() {
        let series = Series::new("test".into(), &[Some("a"), None]);
        let filled = fill_string_nulls(&series, "Unknown").unwrap();
        assert_eq!(filled.null_count(), 0);
        assert_eq!(filled.str().unwrap().get(1), Some("Unknown"));
    }

    #[test]
    fn test_fill_boolean_nulls() {
        let series = Series::new("flag".into(), &[Some(true), None]);
        let filled = fill_boolean_nulls(&series, false).unwrap();
        assert_eq!(filled.bool().unwrap().get(1), Some(false));
    }
}
