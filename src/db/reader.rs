//! Forward-only row access.
//!
//! [`RowSource`] is the row abstraction the record mapper consumes: column
//! metadata plus values by ordinal. [`DataReader`] is the cursor returned by
//! `execute_reader`; it buffers the result set and owns the connection lease
//! of its call, so closing the reader closes a connection opened for it.

use crate::db::driver::{RowSet, RowShape};
use crate::db::lifecycle::ConnectionLease;
use crate::error::{DbError, DbResult};
use crate::models::{DbValue, FieldType};
use crate::orm::mapper::{ColumnBinding, build_bindings, materialize};
use crate::orm::record::Record;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Text layouts accepted when a date/time column arrives as text.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

// =============================================================================
// Row Source
// =============================================================================

/// A positioned row with column metadata.
///
/// Typed getters fail with `MappingConversion` naming the column when the
/// value cannot be represented in the requested type.
pub trait RowSource {
    fn shape(&self) -> &RowShape;

    /// Raw value of a column in the current row.
    fn value(&self, ordinal: usize) -> DbResult<&DbValue>;

    fn field_count(&self) -> usize {
        self.shape().len()
    }

    fn name(&self, ordinal: usize) -> DbResult<&str> {
        self.shape()
            .column(ordinal)
            .map(|c| c.name.as_str())
            .ok_or_else(|| out_of_range(ordinal))
    }

    /// Case-insensitive column lookup.
    fn ordinal(&self, name: &str) -> DbResult<usize> {
        self.shape()
            .ordinal(name)
            .ok_or_else(|| DbError::invalid_input(format!("Column not found: {}", name)))
    }

    fn field_type(&self, ordinal: usize) -> DbResult<FieldType> {
        self.shape()
            .column(ordinal)
            .map(|c| c.field_type)
            .ok_or_else(|| out_of_range(ordinal))
    }

    /// Declared type name as reported by the database.
    fn data_type_name(&self, ordinal: usize) -> DbResult<&str> {
        self.shape()
            .column(ordinal)
            .map(|c| c.type_name.as_str())
            .ok_or_else(|| out_of_range(ordinal))
    }

    fn is_null(&self, ordinal: usize) -> DbResult<bool> {
        Ok(self.value(ordinal)?.is_null())
    }

    fn get_string(&self, ordinal: usize) -> DbResult<String> {
        match self.value(ordinal)? {
            DbValue::Text(s) => Ok(s.clone()),
            other => Err(self.mismatch(ordinal, other, "string")),
        }
    }

    fn get_bool(&self, ordinal: usize) -> DbResult<bool> {
        match self.value(ordinal)? {
            DbValue::Bool(v) => Ok(*v),
            other => match integer(other) {
                Some(v) => Ok(v != 0),
                None => Err(self.mismatch(ordinal, other, "bool")),
            },
        }
    }

    fn get_byte(&self, ordinal: usize) -> DbResult<u8> {
        let value = self.value(ordinal)?;
        integer(value)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| self.mismatch(ordinal, value, "byte"))
    }

    fn get_i16(&self, ordinal: usize) -> DbResult<i16> {
        let value = self.value(ordinal)?;
        integer(value)
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(|| self.mismatch(ordinal, value, "i16"))
    }

    fn get_i32(&self, ordinal: usize) -> DbResult<i32> {
        let value = self.value(ordinal)?;
        integer(value)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| self.mismatch(ordinal, value, "i32"))
    }

    fn get_i64(&self, ordinal: usize) -> DbResult<i64> {
        let value = self.value(ordinal)?;
        integer(value).ok_or_else(|| self.mismatch(ordinal, value, "i64"))
    }

    fn get_f64(&self, ordinal: usize) -> DbResult<f64> {
        let value = self.value(ordinal)?;
        value
            .as_f64()
            .ok_or_else(|| self.mismatch(ordinal, value, "f64"))
    }

    fn get_decimal(&self, ordinal: usize) -> DbResult<Decimal> {
        let value = self.value(ordinal)?;
        let decimal = match value {
            DbValue::Text(s) => s.trim().parse::<Decimal>().ok(),
            other => other.as_decimal(),
        };
        decimal.ok_or_else(|| self.mismatch(ordinal, value, "decimal"))
    }

    fn get_datetime(&self, ordinal: usize) -> DbResult<NaiveDateTime> {
        let value = self.value(ordinal)?;
        let datetime = match value {
            DbValue::DateTime(v) => Some(*v),
            DbValue::Text(s) => parse_datetime(s),
            _ => None,
        };
        datetime.ok_or_else(|| self.mismatch(ordinal, value, "datetime"))
    }

    /// GUID value. Binary columns are read as the first 16 bytes.
    fn get_guid(&self, ordinal: usize) -> DbResult<Uuid> {
        let value = self.value(ordinal)?;
        guid(value).ok_or_else(|| self.mismatch(ordinal, value, "guid"))
    }

    fn get_bytes(&self, ordinal: usize) -> DbResult<Vec<u8>> {
        match self.value(ordinal)? {
            DbValue::Bytes(v) => Ok(v.clone()),
            DbValue::Guid(g) => Ok(g.as_bytes().to_vec()),
            other => Err(self.mismatch(ordinal, other, "bytes")),
        }
    }

    /// String value, `None` when null or not text.
    fn safe_string(&self, ordinal: usize) -> DbResult<Option<String>> {
        Ok(self.value(ordinal)?.as_str().map(str::to_string))
    }

    /// Raw value, `None` when null.
    fn safe_value(&self, ordinal: usize) -> DbResult<Option<DbValue>> {
        let value = self.value(ordinal)?;
        Ok((!value.is_null()).then(|| value.clone()))
    }

    /// Integer value, parsing text, or `default` when null or unreadable.
    fn safe_i32(&self, ordinal: usize, default: i32) -> i32 {
        match self.value(ordinal) {
            Ok(DbValue::Text(s)) => s.trim().parse().unwrap_or(default),
            Ok(value) => integer(value)
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(default),
            Err(_) => default,
        }
    }

    /// GUID value, nil when null.
    fn safe_guid(&self, ordinal: usize) -> DbResult<Uuid> {
        let value = self.value(ordinal)?;
        if value.is_null() {
            return Ok(Uuid::nil());
        }
        guid(value).ok_or_else(|| self.mismatch(ordinal, value, "guid"))
    }

    #[doc(hidden)]
    fn mismatch(&self, ordinal: usize, value: &DbValue, target: &str) -> DbError {
        let column = self.name(ordinal).unwrap_or("?");
        DbError::mapping_conversion(
            column,
            format!("cannot read {} value as {}", value.type_label(), target),
        )
    }
}

fn out_of_range(ordinal: usize) -> DbError {
    DbError::invalid_input(format!("Column ordinal {} is out of range", ordinal))
}

/// Integer view of integral values only.
fn integer(value: &DbValue) -> Option<i64> {
    match value {
        DbValue::Byte(_) | DbValue::Int16(_) | DbValue::Int32(_) | DbValue::Int64(_) => {
            value.as_i64()
        }
        _ => None,
    }
}

fn guid(value: &DbValue) -> Option<Uuid> {
    match value {
        DbValue::Guid(g) => Some(*g),
        DbValue::Bytes(b) if b.len() >= 16 => Uuid::from_slice(&b[..16]).ok(),
        DbValue::Text(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

// =============================================================================
// Data Reader
// =============================================================================

/// Buffered forward-only cursor over one result set.
pub struct DataReader {
    shape: Arc<RowShape>,
    rows: std::vec::IntoIter<Vec<DbValue>>,
    current: Option<Vec<DbValue>>,
    row_count: usize,
    lease: Option<ConnectionLease>,
}

impl DataReader {
    /// Reader over an already buffered result, owning no connection.
    pub fn from_row_set(row_set: RowSet) -> Self {
        Self::with_lease(row_set, None)
    }

    pub(crate) fn with_lease(row_set: RowSet, lease: Option<ConnectionLease>) -> Self {
        let row_count = row_set.rows.len();
        Self {
            shape: row_set.shape,
            rows: row_set.rows.into_iter(),
            current: None,
            row_count,
            lease,
        }
    }

    /// Advance to the next row. Returns `false` past the last row.
    pub fn read(&mut self) -> bool {
        self.current = self.rows.next();
        self.current.is_some()
    }

    /// Whether the result contained any row.
    pub fn has_rows(&self) -> bool {
        self.row_count > 0
    }

    /// Number of rows in the buffered result.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn shape_arc(&self) -> Arc<RowShape> {
        Arc::clone(&self.shape)
    }

    /// Values of the current row.
    pub fn current_row(&self) -> Option<&[DbValue]> {
        self.current.as_deref()
    }

    /// Map the remaining rows onto records, one result per row.
    ///
    /// Bindings are built once for the reader's shape. A failed row does not
    /// stop the iteration.
    pub fn records<T: Record>(&mut self) -> Records<'_, T> {
        let bindings = build_bindings::<T>(&self.shape);
        Records {
            reader: self,
            bindings: Arc::new(bindings),
        }
    }

    /// Map the remaining rows with prebuilt bindings.
    pub fn records_with<T: Record>(
        &mut self,
        bindings: Arc<Vec<ColumnBinding<T>>>,
    ) -> Records<'_, T> {
        Records {
            reader: self,
            bindings,
        }
    }

    /// Close the reader and release its connection.
    pub async fn close(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lease.is_none()
    }
}

impl RowSource for DataReader {
    fn shape(&self) -> &RowShape {
        &self.shape
    }

    fn value(&self, ordinal: usize) -> DbResult<&DbValue> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DbError::invalid_input("No current row; call read() first"))?;
        row.get(ordinal).ok_or_else(|| out_of_range(ordinal))
    }
}

impl std::fmt::Debug for DataReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("columns", &self.shape.column_names())
            .field("row_count", &self.row_count)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for DataReader {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if lease.plan().closes_on_release() {
                warn!(plan = ?lease.plan(), "Reader dropped without close - discarding its connection");
            }
        }
    }
}

/// Iterator of mapped records over a reader.
pub struct Records<'r, T: Record> {
    reader: &'r mut DataReader,
    bindings: Arc<Vec<ColumnBinding<T>>>,
}

impl<T: Record> Iterator for Records<'_, T> {
    type Item = DbResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.reader.read() {
            return None;
        }
        Some(materialize(self.bindings.as_slice(), &*self.reader))
    }
}
