use crate::error::ContinuousError;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Reader for raw per-contract tables (CSV and Parquet).
///
/// Assembling the correctly ordered table stays the caller's job; these
/// helpers only move bytes into a `DataFrame` (see
/// `ordering::sort_for_construction` for the ordering half).
pub struct TableReader;

impl TableReader {
    /// Read a CSV file with a header row, inferring the schema.
    pub fn read_csv(path: &Path) -> Result<DataFrame, ContinuousError> {
        let lf = LazyCsvReader::new(path).with_has_header(true).finish()?;
        Ok(lf.collect()?)
    }

    /// Read a Parquet file.
    pub fn read_parquet(path: &Path) -> Result<DataFrame, ContinuousError> {
        Ok(LazyFrame::scan_parquet(path, Default::default())?.collect()?)
    }
}

/// Write a frame out as CSV with a header row.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<(), ContinuousError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}
