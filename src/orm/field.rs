//! Record field types.
//!
//! [`FieldValue`] is implemented by every type a record field may have. It
//! declares the target kind the mapper uses to pick a conversion, whether the
//! field accepts null, and how a converted value is stored.

use crate::db::reader::parse_datetime;
use crate::models::DbValue;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type of a record field, as seen by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
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
    /// Integer-backed enumeration declared with `db_enum!`
    Enum,
}

impl TargetKind {
    /// Integer targets, including enumerations.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Int16 | Self::Int32 | Self::Int64 | Self::Enum
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// A type that can be stored in a record field.
pub trait FieldValue: Sized {
    const KIND: TargetKind;

    /// Whether a database null can be stored.
    const NULLABLE: bool = false;

    /// Store a converted value. Errors carry a short reason.
    fn from_db_value(value: DbValue) -> Result<Self, String>;
}

fn unexpected(value: &DbValue, target: &str) -> String {
    format!("cannot assign {} value to {} field", value.type_label(), target)
}

fn integral(value: &DbValue) -> Option<i64> {
    match value {
        DbValue::Bool(_)
        | DbValue::Byte(_)
        | DbValue::Int16(_)
        | DbValue::Int32(_)
        | DbValue::Int64(_) => value.as_i64(),
        _ => None,
    }
}

impl FieldValue for String {
    const KIND: TargetKind = TargetKind::Text;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => Ok(s),
            other => Err(unexpected(&other, "string")),
        }
    }
}

impl FieldValue for bool {
    const KIND: TargetKind = TargetKind::Bool;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Bool(v) => Ok(v),
            other => integral(&other)
                .map(|v| v == 1)
                .ok_or_else(|| unexpected(&other, "bool")),
        }
    }
}

macro_rules! impl_integer_field {
    ($($ty:ty => $kind:ident),+ $(,)?) => {
        $(
            impl FieldValue for $ty {
                const KIND: TargetKind = TargetKind::$kind;

                fn from_db_value(value: DbValue) -> Result<Self, String> {
                    let v = integral(&value).ok_or_else(|| unexpected(&value, stringify!($ty)))?;
                    <$ty>::try_from(v)
                        .map_err(|_| format!("value {} is out of range for {}", v, stringify!($ty)))
                }
            }
        )+
    };
}

impl_integer_field!(u8 => Byte, i16 => Int16, i32 => Int32, i64 => Int64);

impl FieldValue for f64 {
    const KIND: TargetKind = TargetKind::Double;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        value.as_f64().ok_or_else(|| unexpected(&value, "f64"))
    }
}

impl FieldValue for f32 {
    const KIND: TargetKind = TargetKind::Float;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Float(v) => Ok(v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| unexpected(&other, "f32")),
        }
    }
}

impl FieldValue for Decimal {
    const KIND: TargetKind = TargetKind::Decimal;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("invalid decimal text: {}", e)),
            other => other.as_decimal().ok_or_else(|| unexpected(&other, "decimal")),
        }
    }
}

impl FieldValue for NaiveDateTime {
    const KIND: TargetKind = TargetKind::DateTime;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::DateTime(v) => Ok(v),
            DbValue::Text(s) => {
                parse_datetime(&s).ok_or_else(|| format!("invalid date/time text: {}", s))
            }
            other => Err(unexpected(&other, "datetime")),
        }
    }
}

impl FieldValue for Uuid {
    const KIND: TargetKind = TargetKind::Guid;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Guid(v) => Ok(v),
            DbValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|e| e.to_string()),
            other => Err(unexpected(&other, "guid")),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: TargetKind = TargetKind::Bytes;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        match value {
            DbValue::Bytes(v) => Ok(v),
            DbValue::Guid(g) => Ok(g.as_bytes().to_vec()),
            other => Err(unexpected(&other, "bytes")),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: TargetKind = T::KIND;
    const NULLABLE: bool = true;

    fn from_db_value(value: DbValue) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_fields_are_checked() {
        assert_eq!(i32::from_db_value(DbValue::Int64(7)), Ok(7));
        assert!(i16::from_db_value(DbValue::Int64(70_000)).is_err());
        assert!(u8::from_db_value(DbValue::Int32(-1)).is_err());
        assert!(i64::from_db_value(DbValue::Text("1".to_string())).is_err());
    }

    #[test]
    fn test_bool_field_uses_equals_one() {
        assert_eq!(bool::from_db_value(DbValue::Int32(1)), Ok(true));
        assert_eq!(bool::from_db_value(DbValue::Int32(2)), Ok(false));
        assert_eq!(bool::from_db_value(DbValue::Bool(true)), Ok(true));
    }

    #[test]
    fn test_option_field() {
        assert!(<Option<String>>::NULLABLE);
        assert_eq!(<Option<String> as FieldValue>::KIND, TargetKind::Text);
        assert_eq!(<Option<i32>>::from_db_value(DbValue::Null), Ok(None));
        assert_eq!(<Option<i32>>::from_db_value(DbValue::Int16(3)), Ok(Some(3)));
        assert!(!<i32 as FieldValue>::NULLABLE);
    }

    #[test]
    fn test_decimal_field_from_text() {
        assert_eq!(
            Decimal::from_db_value(DbValue::Text("12.50".to_string())),
            Ok(Decimal::new(1250, 2))
        );
    }
}
