use polars::prelude::PolarsError;
use thiserror::Error;

/// Structured error types for continuous-series construction.
///
/// Invalid-input variants are raised eagerly, before any algorithmic work.
/// Missing observations during the walk are never errors; the walk defers
/// or drops (see `adjust`), and only a degenerate ratio aborts it.
#[derive(Debug, Error)]
pub enum ContinuousError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("{list} must name at least one column")]
    EmptyColumnList { list: &'static str },

    #[error("column '{column}' must be numeric, got {dtype}")]
    NonNumericColumn { column: String, dtype: String },

    #[error("date column '{column}' has unorderable dtype {dtype}")]
    UnorderableDateColumn { column: String, dtype: String },

    #[error("null value in key column '{column}' at row {row}")]
    NullKeyValue { column: String, row: usize },

    #[error(
        "degenerate adjustment ratio on {date}: incoming contract '{incoming}' has a zero factor basis (outgoing '{outgoing}')"
    )]
    DegenerateRatio {
        date: String,
        outgoing: String,
        incoming: String,
    },

    #[error("dataframe error: {0}")]
    Frame(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
