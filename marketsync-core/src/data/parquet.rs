//! Parquet I/O helpers shared by the store, the calendar cache and the
//! securities cache.

use super::provider::DataError;
use polars::prelude::*;
use std::fs;
use std::path::Path;

/// Write a DataFrame to `path` atomically: write `{path}.tmp`, then rename.
pub fn write_atomic(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| DataError::IoError(format!("create dir {}: {e}", parent.display())))?;
    }

    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(|e| DataError::ParquetError(format!("create {}: {e}", tmp_path.display())))?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(DataError::ParquetError(format!("write parquet: {e}")));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::IoError(format!("atomic rename failed: {e}"))
    })
}

/// Read a whole Parquet file.
pub fn read(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path)
        .map_err(|e| DataError::ParquetError(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))
}

/// Build a `Datetime[ms]` column from epoch milliseconds.
pub fn millis_column(name: &str, millis: Vec<i64>) -> Result<Column, DataError> {
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| DataError::ParquetError(format!("{name} cast: {e}")))
}

/// Nullable variant of [`millis_column`].
pub fn optional_millis_column(name: &str, millis: Vec<Option<i64>>) -> Result<Column, DataError> {
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| DataError::ParquetError(format!("{name} cast: {e}")))
}

/// Epoch milliseconds of a `Date` or `Datetime` column (any unit).
pub fn millis_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, DataError> {
    let column = required(df, name)?;
    let scale: fn(i64) -> i64 = match column.dtype() {
        DataType::Date => |v| v * 86_400_000,
        DataType::Datetime(TimeUnit::Nanoseconds, _) => |v| v.div_euclid(1_000_000),
        DataType::Datetime(TimeUnit::Microseconds, _) => |v| v.div_euclid(1_000),
        DataType::Datetime(TimeUnit::Milliseconds, _) | DataType::Int64 => |v| v,
        other => {
            return Err(DataError::ParquetError(format!(
                "column '{name}' has type {other:?}, expected a date/time"
            )))
        }
    };
    let physical = column
        .cast(&DataType::Int64)
        .map_err(|e| DataError::ParquetError(format!("{name} cast: {e}")))?;
    let values = physical
        .i64()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(values.into_iter().map(|v| v.map(scale)).collect())
}

/// Values of a numeric column, widened to f64.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let column = required(df, name)?
        .cast(&DataType::Float64)
        .map_err(|e| DataError::ParquetError(format!("{name} cast: {e}")))?;
    let values = column
        .f64()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(values.into_iter().collect())
}

/// Values of a string column.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, DataError> {
    let values = required(df, name)?
        .str()
        .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// True for column types that can be widened to f64 without loss of meaning.
pub fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

fn required<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, DataError> {
    df.column(name)
        .map_err(|_| DataError::ParquetError(format!("missing column '{name}'")))
}
