use crate::error::ContinuousError;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Totally ordered key for the date axis.
///
/// The date column may arrive as polars `Date` (`Day`), `Datetime` or any
/// integer type (`Int`), or `String` (`Text`; ISO dates order correctly
/// lexicographically). A single run only ever produces one variant, so the
/// derived ordering never compares across variants in practice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DateKey {
    Int(i64),
    Day(i32),
    Text(String),
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateKey::Int(v) => write!(f, "{v}"),
            DateKey::Day(days) => {
                let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
                    + chrono::Duration::days(*days as i64);
                write!(f, "{date}")
            }
            DateKey::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Check that every named column exists, before any extraction starts.
pub(crate) fn require_columns(df: &DataFrame, names: &[&str]) -> Result<(), ContinuousError> {
    let schema = df.schema();
    for name in names {
        if !schema.contains(name) {
            return Err(ContinuousError::MissingColumn((*name).to_string()));
        }
    }
    Ok(())
}

fn ensure_numeric_dtype(column: &str, dtype: &DataType) -> Result<(), ContinuousError> {
    use DataType::*;
    match dtype {
        Float32 | Float64 | Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 => {
            Ok(())
        }
        other => Err(ContinuousError::NonNumericColumn {
            column: column.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

/// Validate that a column exists and is numeric without materializing it.
pub(crate) fn ensure_numeric(df: &DataFrame, column: &str) -> Result<(), ContinuousError> {
    let col = df.column(column)?;
    ensure_numeric_dtype(column, col.dtype())
}

/// Extract the date column as totally ordered keys, one per row.
pub fn date_keys(df: &DataFrame, column: &str) -> Result<Vec<DateKey>, ContinuousError> {
    let col = df.column(column)?;
    match col.dtype() {
        DataType::String => {
            let ca = col.str()?;
            ca.into_iter()
                .enumerate()
                .map(|(row, opt)| {
                    opt.map(|s| DateKey::Text(s.to_string()))
                        .ok_or_else(|| ContinuousError::NullKeyValue {
                            column: column.to_string(),
                            row,
                        })
                })
                .collect()
        }
        DataType::Date => {
            let cast = col.cast(&DataType::Int32)?;
            let ca = cast.i32()?;
            ca.into_iter()
                .enumerate()
                .map(|(row, opt)| {
                    opt.map(DateKey::Day)
                        .ok_or_else(|| ContinuousError::NullKeyValue {
                            column: column.to_string(),
                            row,
                        })
                })
                .collect()
        }
        DataType::Datetime(_, _)
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let cast = col.cast(&DataType::Int64)?;
            let ca = cast.i64()?;
            ca.into_iter()
                .enumerate()
                .map(|(row, opt)| {
                    opt.map(DateKey::Int)
                        .ok_or_else(|| ContinuousError::NullKeyValue {
                            column: column.to_string(),
                            row,
                        })
                })
                .collect()
        }
        other => Err(ContinuousError::UnorderableDateColumn {
            column: column.to_string(),
            dtype: format!("{other:?}"),
        }),
    }
}

/// Extract contract identifiers as strings, one per row.
///
/// Any dtype goes: identifiers only need equality, and casting to string
/// preserves it.
pub fn contract_ids(df: &DataFrame, column: &str) -> Result<Vec<String>, ContinuousError> {
    let col = df.column(column)?;
    let cast = col.cast(&DataType::String)?;
    let ca = cast.str()?;
    ca.into_iter()
        .enumerate()
        .map(|(row, opt)| {
            opt.map(|s| s.to_string())
                .ok_or_else(|| ContinuousError::NullKeyValue {
                    column: column.to_string(),
                    row,
                })
        })
        .collect()
}

/// Extract a numeric column as `f64`, nulls mapped to NaN.
pub(crate) fn numeric_values(df: &DataFrame, column: &str) -> Result<Vec<f64>, ContinuousError> {
    let col = df.column(column)?;
    ensure_numeric_dtype(column, col.dtype())?;
    let cast = col.cast(&DataType::Float64)?;
    let ca = cast.f64()?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Per-row adjustment factor basis: the mean of the factor-source columns.
pub(crate) fn factor_basis(
    df: &DataFrame,
    columns: &[&str],
) -> Result<Vec<f64>, ContinuousError> {
    let mut acc = vec![0.0f64; df.height()];
    for name in columns {
        let values = numeric_values(df, name)?;
        for (slot, v) in acc.iter_mut().zip(values) {
            *slot += v;
        }
    }
    let k = columns.len() as f64;
    Ok(acc.into_iter().map(|sum| sum / k).collect())
}
