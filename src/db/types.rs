//! Database-specific type mappings for the sqlx driver.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `classify_type` maps a column's declared type name to a `FieldType`
//! 2. Backend-specific decoders extract values as `DbValue`
//!
//! SQLite is dynamically typed, so its decoder reads the storage class of
//! every value and coerces it towards the column's declared field type.

use crate::db::driver::{ColumnInfo, DriverResult, RowSet};
use crate::db::macros::Backend;
use crate::models::{DbValue, FieldType};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Classify a database type name into a runtime field type.
pub fn classify_type(type_name: &str, backend: Backend) -> FieldType {
    let lower = type_name.trim().to_lowercase();
    let unsigned = lower.contains("unsigned");

    if lower.is_empty() || lower == "null" {
        return FieldType::Other;
    }

    // Contain "int" but are not integers
    if lower.starts_with("interval") || lower.contains("point") {
        return FieldType::Other;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") || lower == "money" {
        // SQLite's NUMERIC affinity stores floats
        if backend == Backend::SQLite {
            return FieldType::Double;
        }
        return FieldType::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return FieldType::Bool;
    }

    if lower.starts_with("tinyint") {
        return if unsigned {
            FieldType::Byte
        } else {
            FieldType::Int16
        };
    }

    if lower.starts_with("smallint") || lower == "int2" || lower == "smallserial" {
        return if unsigned {
            FieldType::Int32
        } else {
            FieldType::Int16
        };
    }

    if lower.starts_with("bigint") || lower == "int8" || lower == "bigserial" {
        return FieldType::Int64;
    }

    if lower.contains("int") || lower.contains("serial") {
        // SQLite integers are always 64-bit
        if backend == Backend::SQLite || unsigned {
            return FieldType::Int64;
        }
        return FieldType::Int32;
    }

    if lower == "float4" || (lower == "real" && backend == Backend::Postgres) {
        return FieldType::Float;
    }
    if lower.starts_with("float") && backend == Backend::MySql {
        return FieldType::Float;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return FieldType::Double;
    }

    if lower == "uuid" || lower == "uniqueidentifier" || lower == "guid" {
        return FieldType::Guid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return FieldType::Bytes;
    }

    if lower == "date"
        || lower.starts_with("datetime")
        || lower.starts_with("timestamp")
        || lower == "smalldatetime"
    {
        return FieldType::DateTime;
    }

    if lower.contains("char")
        || lower.contains("text")
        || lower.contains("clob")
        || lower == "string"
        || lower == "name"
        || lower == "json"
        || lower == "jsonb"
        || lower == "enum"
        || lower == "set"
        || lower == "time"
    {
        return FieldType::Text;
    }

    FieldType::Other
}

/// Coerce an integer towards a declared field type.
fn integer_value(v: i64, field_type: FieldType) -> DbValue {
    match field_type {
        FieldType::Bool => DbValue::Bool(v != 0),
        FieldType::Byte => u8::try_from(v).map_or(DbValue::Int64(v), DbValue::Byte),
        FieldType::Int16 => i16::try_from(v).map_or(DbValue::Int64(v), DbValue::Int16),
        FieldType::Int32 => i32::try_from(v).map_or(DbValue::Int64(v), DbValue::Int32),
        FieldType::Double => DbValue::Double(v as f64),
        FieldType::Decimal => DbValue::Decimal(rust_decimal::Decimal::from(v)),
        _ => DbValue::Int64(v),
    }
}

/// Coerce an unsigned integer; values above `i64::MAX` become exact decimals.
fn unsigned_value(v: u64, field_type: FieldType) -> DbValue {
    match i64::try_from(v) {
        Ok(v) => integer_value(v, field_type),
        Err(_) => DbValue::Decimal(rust_decimal::Decimal::from(v)),
    }
}

/// Build a buffered row set from decoded rows.
///
/// Columns whose type could not be classified take the type of their first
/// non-null value.
fn finish_row_set(mut columns: Vec<ColumnInfo>, rows: Vec<Vec<DbValue>>) -> RowSet {
    for (idx, column) in columns.iter_mut().enumerate() {
        if column.field_type != FieldType::Other {
            continue;
        }
        if let Some(value) = rows.iter().map(|r| &r[idx]).find(|v| !v.is_null()) {
            column.field_type = value.field_type();
        }
    }
    RowSet::new(columns, rows)
}

// =============================================================================
// Row Set Builders
// =============================================================================

pub fn mysql_row_set(rows: &[MySqlRow]) -> DriverResult<RowSet> {
    let Some(first) = rows.first() else {
        return Ok(RowSet::empty());
    };
    let columns = column_infos(first, Backend::MySql);
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            values.push(mysql::decode_column(row, idx, column)?);
        }
        data.push(values);
    }
    Ok(finish_row_set(columns, data))
}

pub fn postgres_row_set(rows: &[PgRow]) -> DriverResult<RowSet> {
    let Some(first) = rows.first() else {
        return Ok(RowSet::empty());
    };
    let columns = column_infos(first, Backend::Postgres);
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            values.push(postgres::decode_column(row, idx, column)?);
        }
        data.push(values);
    }
    Ok(finish_row_set(columns, data))
}

pub fn sqlite_row_set(rows: &[SqliteRow]) -> DriverResult<RowSet> {
    let Some(first) = rows.first() else {
        return Ok(RowSet::empty());
    };
    let columns = column_infos(first, Backend::SQLite);
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            values.push(sqlite::decode_column(row, idx, column)?);
        }
        data.push(values);
    }
    Ok(finish_row_set(columns, data))
}

fn column_infos<R: Row>(row: &R, backend: Backend) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| {
            let type_name = col.type_info().name();
            ColumnInfo::new(col.name(), classify_type(type_name, backend), type_name)
        })
        .collect()
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, column: &ColumnInfo) -> DriverResult<DbValue> {
        let value = match column.field_type {
            FieldType::Bool => DbValue::from(row.try_get::<Option<bool>, _>(idx)?),
            FieldType::Byte
            | FieldType::Int16
            | FieldType::Int32
            | FieldType::Int64 => decode_integer(row, idx, column.field_type)?,
            FieldType::Float => DbValue::from(row.try_get::<Option<f32>, _>(idx)?),
            FieldType::Double => DbValue::from(row.try_get::<Option<f64>, _>(idx)?),
            FieldType::Decimal => {
                DbValue::from(row.try_get::<Option<rust_decimal::Decimal>, _>(idx)?)
            }
            FieldType::DateTime => decode_datetime(row, idx, &column.type_name)?,
            FieldType::Bytes => DbValue::from(row.try_get::<Option<Vec<u8>>, _>(idx)?),
            FieldType::Text => DbValue::from(row.try_get::<Option<String>, _>(idx)?),
            FieldType::Guid | FieldType::Other => decode_fallback(row, idx, &column.type_name),
        };
        Ok(value)
    }

    fn decode_integer(
        row: &MySqlRow,
        idx: usize,
        field_type: FieldType,
    ) -> DriverResult<DbValue> {
        let signed = |v: i64| -> DriverResult<DbValue> { Ok(integer_value(v, field_type)) };
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return Ok(DbValue::Null);
        }
        // Try signed types
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return signed(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return signed(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return signed(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return signed(v);
        }
        // Try unsigned types
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return signed(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return signed(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return signed(v.into());
        }
        Ok(row
            .try_get::<Option<u64>, _>(idx)?
            .map_or(DbValue::Null, |v| unsigned_value(v, field_type)))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize, type_name: &str) -> DriverResult<DbValue> {
        if type_name.eq_ignore_ascii_case("date") {
            return Ok(DbValue::from(row.try_get::<Option<chrono::NaiveDate>, _>(idx)?));
        }
        Ok(DbValue::from(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(idx)?,
        ))
    }

    fn decode_fallback(row: &MySqlRow, idx: usize, type_name: &str) -> DbValue {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return DbValue::from(v);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return DbValue::from(v);
        }
        tracing::error!(type_name = %type_name, column = idx, "Failed to decode MySQL value");
        DbValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, column: &ColumnInfo) -> DriverResult<DbValue> {
        let value = match column.field_type {
            FieldType::Bool => DbValue::from(row.try_get::<Option<bool>, _>(idx)?),
            FieldType::Byte | FieldType::Int16 => {
                DbValue::from(row.try_get::<Option<i16>, _>(idx)?)
            }
            FieldType::Int32 => DbValue::from(row.try_get::<Option<i32>, _>(idx)?),
            FieldType::Int64 => DbValue::from(row.try_get::<Option<i64>, _>(idx)?),
            FieldType::Float => DbValue::from(row.try_get::<Option<f32>, _>(idx)?),
            FieldType::Double => DbValue::from(row.try_get::<Option<f64>, _>(idx)?),
            FieldType::Decimal => {
                DbValue::from(row.try_get::<Option<rust_decimal::Decimal>, _>(idx)?)
            }
            FieldType::DateTime => decode_datetime(row, idx, &column.type_name)?,
            FieldType::Guid => DbValue::from(row.try_get::<Option<uuid::Uuid>, _>(idx)?),
            FieldType::Bytes => DbValue::from(row.try_get::<Option<Vec<u8>>, _>(idx)?),
            FieldType::Text => DbValue::from(row.try_get::<Option<String>, _>(idx)?),
            FieldType::Other => decode_fallback(row, idx, &column.type_name),
        };
        Ok(value)
    }

    fn decode_datetime(row: &PgRow, idx: usize, type_name: &str) -> DriverResult<DbValue> {
        let lower = type_name.to_lowercase();
        if lower == "date" {
            return Ok(DbValue::from(row.try_get::<Option<chrono::NaiveDate>, _>(idx)?));
        }
        if lower == "timestamptz" {
            return Ok(DbValue::from(
                row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?,
            ));
        }
        Ok(DbValue::from(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(idx)?,
        ))
    }

    fn decode_fallback(row: &PgRow, idx: usize, type_name: &str) -> DbValue {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return DbValue::from(v);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return DbValue::from(v);
        }
        tracing::error!(type_name = %type_name, column = idx, "Failed to decode PostgreSQL value");
        DbValue::Null
    }
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    /// SQLite storage class of a single value.
    enum Storage {
        Null,
        Integer,
        Real,
        Text,
        Blob,
    }

    fn storage_class(row: &SqliteRow, idx: usize) -> DriverResult<Storage> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Storage::Null);
        }
        let storage = match raw.type_info().name() {
            "INTEGER" | "BOOLEAN" => Storage::Integer,
            "REAL" => Storage::Real,
            "BLOB" => Storage::Blob,
            _ => Storage::Text,
        };
        Ok(storage)
    }

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        column: &ColumnInfo,
    ) -> DriverResult<DbValue> {
        let value = match storage_class(row, idx)? {
            Storage::Null => DbValue::Null,
            Storage::Integer => {
                let v: i64 = row.try_get(idx)?;
                integer_value(v, column.field_type)
            }
            Storage::Real => {
                let v: f64 = row.try_get(idx)?;
                match column.field_type {
                    FieldType::Float => DbValue::Float(v as f32),
                    FieldType::Decimal => rust_decimal::Decimal::try_from(v)
                        .map_or(DbValue::Double(v), DbValue::Decimal),
                    _ => DbValue::Double(v),
                }
            }
            Storage::Text => decode_text(row, idx, column.field_type)?,
            Storage::Blob => {
                let v: Vec<u8> = row.try_get(idx)?;
                match column.field_type {
                    FieldType::Guid => uuid::Uuid::from_slice(&v)
                        .map_or(DbValue::Bytes(v.clone()), DbValue::Guid),
                    _ => DbValue::Bytes(v),
                }
            }
        };
        Ok(value)
    }

    fn decode_text(row: &SqliteRow, idx: usize, field_type: FieldType) -> DriverResult<DbValue> {
        if field_type == FieldType::DateTime {
            if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
                return Ok(DbValue::DateTime(v));
            }
            if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
                return Ok(DbValue::from(v));
            }
        }

        let text: String = row.try_get(idx)?;
        let value = match field_type {
            FieldType::Decimal => text
                .parse::<rust_decimal::Decimal>()
                .map_or(DbValue::Text(text), DbValue::Decimal),
            FieldType::Guid => uuid::Uuid::parse_str(&text)
                .map_or(DbValue::Text(text), DbValue::Guid),
            _ => DbValue::Text(text),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_integers() {
        assert_eq!(classify_type("INT", Backend::MySql), FieldType::Int32);
        assert_eq!(classify_type("INT4", Backend::Postgres), FieldType::Int32);
        assert_eq!(classify_type("INT2", Backend::Postgres), FieldType::Int16);
        assert_eq!(classify_type("BIGINT", Backend::MySql), FieldType::Int64);
        assert_eq!(classify_type("INTEGER", Backend::SQLite), FieldType::Int64);
        assert_eq!(classify_type("SERIAL", Backend::Postgres), FieldType::Int32);
        assert_eq!(classify_type("INT UNSIGNED", Backend::MySql), FieldType::Int64);
    }

    #[test]
    fn test_unsigned_values_above_i64_stay_exact() {
        assert_eq!(unsigned_value(42, FieldType::Int64), DbValue::Int64(42));
        assert_eq!(unsigned_value(7, FieldType::Int32), DbValue::Int32(7));

        let big = u64::MAX;
        assert_eq!(
            unsigned_value(big, FieldType::Int64),
            DbValue::Decimal(rust_decimal::Decimal::from(big))
        );
        let boundary = i64::MAX as u64 + 1;
        assert!(!unsigned_value(boundary, FieldType::Int64).is_null());
    }

    #[test]
    fn test_classify_small_and_tiny() {
        assert_eq!(classify_type("SMALLINT", Backend::MySql), FieldType::Int16);
        assert_eq!(classify_type("TINYINT", Backend::MySql), FieldType::Int16);
        assert_eq!(
            classify_type("TINYINT UNSIGNED", Backend::MySql),
            FieldType::Byte
        );
    }

    #[test]
    fn test_classify_decimal() {
        assert_eq!(classify_type("DECIMAL", Backend::MySql), FieldType::Decimal);
        assert_eq!(classify_type("NUMERIC", Backend::Postgres), FieldType::Decimal);
        // SQLite NUMERIC is a float
        assert_eq!(classify_type("numeric", Backend::SQLite), FieldType::Double);
    }

    #[test]
    fn test_classify_floats() {
        assert_eq!(classify_type("FLOAT4", Backend::Postgres), FieldType::Float);
        assert_eq!(classify_type("FLOAT8", Backend::Postgres), FieldType::Double);
        assert_eq!(classify_type("REAL", Backend::SQLite), FieldType::Double);
        assert_eq!(classify_type("FLOAT", Backend::MySql), FieldType::Float);
        assert_eq!(classify_type("DOUBLE", Backend::MySql), FieldType::Double);
    }

    #[test]
    fn test_classify_other_types() {
        assert_eq!(classify_type("BOOLEAN", Backend::MySql), FieldType::Bool);
        assert_eq!(classify_type("UUID", Backend::Postgres), FieldType::Guid);
        assert_eq!(classify_type("BYTEA", Backend::Postgres), FieldType::Bytes);
        assert_eq!(classify_type("BLOB", Backend::SQLite), FieldType::Bytes);
        assert_eq!(classify_type("TIMESTAMPTZ", Backend::Postgres), FieldType::DateTime);
        assert_eq!(classify_type("DATETIME", Backend::SQLite), FieldType::DateTime);
        assert_eq!(classify_type("VARCHAR", Backend::MySql), FieldType::Text);
        assert_eq!(classify_type("TEXT", Backend::SQLite), FieldType::Text);
        assert_eq!(classify_type("INTERVAL", Backend::Postgres), FieldType::Other);
        assert_eq!(classify_type("POINT", Backend::Postgres), FieldType::Other);
        assert_eq!(classify_type("NULL", Backend::SQLite), FieldType::Other);
    }

    #[test]
    fn test_integer_value_coercion() {
        assert_eq!(integer_value(1, FieldType::Bool), DbValue::Bool(true));
        assert_eq!(integer_value(7, FieldType::Int16), DbValue::Int16(7));
        assert_eq!(integer_value(70_000, FieldType::Int16), DbValue::Int64(70_000));
        assert_eq!(integer_value(200, FieldType::Byte), DbValue::Byte(200));
        assert_eq!(integer_value(5, FieldType::Other), DbValue::Int64(5));
    }

    #[test]
    fn test_finish_row_set_refines_unknown_columns() {
        let columns = vec![ColumnInfo::new("COUNT(*)", FieldType::Other, "NULL")];
        let rows = vec![vec![DbValue::Null], vec![DbValue::Int64(2)]];
        let set = finish_row_set(columns, rows);
        assert_eq!(set.shape.columns()[0].field_type, FieldType::Int64);
    }
}
