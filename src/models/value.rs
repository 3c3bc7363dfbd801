//! Provider-neutral values exchanged with drivers.
//!
//! `DbValue` is what parameters bind and what row cursors yield. Drivers
//! decode their native types into these variants so the mapper and the typed
//! scalar helpers only deal with one representation.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// Values
// =============================================================================

/// A single database value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DbValue {
    /// Database null
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    DateTime(NaiveDateTime),
    Guid(Uuid),
    Bytes(Vec<u8>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime field type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Null => FieldType::Other,
            Self::Bool(_) => FieldType::Bool,
            Self::Byte(_) => FieldType::Byte,
            Self::Int16(_) => FieldType::Int16,
            Self::Int32(_) => FieldType::Int32,
            Self::Int64(_) => FieldType::Int64,
            Self::Float(_) => FieldType::Float,
            Self::Double(_) => FieldType::Double,
            Self::Decimal(_) => FieldType::Decimal,
            Self::Text(_) => FieldType::Text,
            Self::DateTime(_) => FieldType::DateTime,
            Self::Guid(_) => FieldType::Guid,
            Self::Bytes(_) => FieldType::Bytes,
        }
    }

    /// Short type label used in conversion error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            other => other.field_type().name(),
        }
    }

    /// Integral view of the value. Fractional values are truncated; values
    /// outside the `i64` range yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::Float(v) => truncate_real(f64::from(*v)),
            Self::Double(v) => truncate_real(*v),
            Self::Decimal(v) => v.trunc().to_i64(),
            _ => None,
        }
    }

    /// Floating point view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Int16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Decimal(v) => v.to_f64(),
            _ => None,
        }
    }

    /// Exact decimal view of numeric values.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Byte(v) => Some(Decimal::from(*v)),
            Self::Int16(v) => Some(Decimal::from(*v)),
            Self::Int32(v) => Some(Decimal::from(*v)),
            Self::Int64(v) => Some(Decimal::from(*v)),
            Self::Float(v) => Decimal::try_from(*v).ok(),
            Self::Double(v) => Decimal::try_from(*v).ok(),
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as JSON. Binary data is base64 encoded.
    pub fn to_json(&self) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Byte(v) => JsonValue::Number((*v).into()),
            Self::Int16(v) => JsonValue::Number((*v).into()),
            Self::Int32(v) => JsonValue::Number((*v).into()),
            Self::Int64(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => float_json(f64::from(*v)),
            Self::Double(v) => float_json(*v),
            // Preserve exact representation
            Self::Decimal(v) => JsonValue::String(v.to_string()),
            Self::Text(v) => JsonValue::String(v.clone()),
            Self::DateTime(v) => JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::Guid(v) => JsonValue::String(v.to_string()),
            Self::Bytes(v) => JsonValue::String(STANDARD.encode(v)),
        }
    }
}

fn float_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

impl std::fmt::Display for DbValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::Decimal(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v),
            Self::Guid(v) => write!(f, "{}", v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for DbValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )+
    };
}

impl_from_value!(
    bool => Bool,
    u8 => Byte,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => Text,
    NaiveDateTime => DateTime,
    Uuid => Guid,
    Vec<u8> => Bytes,
);

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&[u8]> for DbValue {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for DbValue {
    fn from(v: NaiveDate) -> Self {
        Self::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<DateTime<Utc>> for DbValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v.naive_utc())
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// =============================================================================
// Field Types
// =============================================================================

/// Runtime type of a result column, as reported by the row source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Bool,
    Byte,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Decimal,
    DateTime,
    Guid,
    Bytes,
    /// Type could not be determined from column metadata
    Other,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::DateTime => "datetime",
            Self::Guid => "guid",
            Self::Bytes => "bytes",
            Self::Other => "object",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Self::Float | Self::Double | Self::Decimal)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Declared Parameter Types
// =============================================================================

/// Declared type of a command parameter.
///
/// Drivers use it to pick a typed null when the bound value is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbType {
    AnsiString,
    String,
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Date,
    DateTime,
    Guid,
    Binary,
    #[default]
    Object,
}

impl DbType {
    /// Infer the declared type from a value.
    pub fn for_value(value: &DbValue) -> Self {
        match value {
            DbValue::Null => Self::Object,
            DbValue::Bool(_) => Self::Boolean,
            DbValue::Byte(_) => Self::Byte,
            DbValue::Int16(_) => Self::Int16,
            DbValue::Int32(_) => Self::Int32,
            DbValue::Int64(_) => Self::Int64,
            DbValue::Float(_) => Self::Single,
            DbValue::Double(_) => Self::Double,
            DbValue::Decimal(_) => Self::Decimal,
            DbValue::Text(_) => Self::String,
            DbValue::DateTime(_) => Self::DateTime,
            DbValue::Guid(_) => Self::Guid,
            DbValue::Bytes(_) => Self::Binary,
        }
    }
}

/// Truncate towards zero, rejecting values an `i64` cannot hold.
fn truncate_real(v: f64) -> Option<i64> {
    let t = v.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    (t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64).then_some(t as i64)
}
