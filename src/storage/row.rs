//! Validated row access. Every model is built field by field through these
//! helpers so that a schema mismatch surfaces as a typed
//! [`StorageError::Column`] instead of a malformed entity.

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, Value};

use super::StorageError;

/// Timestamps are stored as fixed-width RFC3339 UTC text so that SQL string
/// comparison orders chronologically.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn column_error(table: &'static str, column: &'static str, reason: String) -> StorageError {
    StorageError::Column { table, column, reason }
}

fn value(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<Value, StorageError> {
    row.get_value(idx)
        .map_err(|e| column_error(table, column, e.to_string()))
}

pub(crate) fn integer(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<i64, StorageError> {
    match value(row, table, column, idx)? {
        Value::Integer(v) => Ok(v),
        other => Err(column_error(
            table,
            column,
            format!("expected integer, got {:?}", other),
        )),
    }
}

pub(crate) fn opt_integer(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<Option<i64>, StorageError> {
    match value(row, table, column, idx)? {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v)),
        other => Err(column_error(
            table,
            column,
            format!("expected integer or null, got {:?}", other),
        )),
    }
}

pub(crate) fn text(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<String, StorageError> {
    match value(row, table, column, idx)? {
        Value::Text(v) => Ok(v),
        other => Err(column_error(
            table,
            column,
            format!("expected text, got {:?}", other),
        )),
    }
}

pub(crate) fn opt_text(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<Option<String>, StorageError> {
    match value(row, table, column, idx)? {
        Value::Null => Ok(None),
        Value::Text(v) => Ok(Some(v)),
        other => Err(column_error(
            table,
            column,
            format!("expected text or null, got {:?}", other),
        )),
    }
}

pub(crate) fn boolean(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<bool, StorageError> {
    Ok(integer(row, table, column, idx)? != 0)
}

pub(crate) fn timestamp(
    row: &Row,
    table: &'static str,
    column: &'static str,
    idx: i32,
) -> Result<DateTime<Utc>, StorageError> {
    let raw = text(row, table, column, idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| column_error(table, column, format!("bad timestamp {:?}: {}", raw, e)))
}
