//! Typed scalar conversion.
//!
//! `execute_scalar_as::<T>` converts the first value of a result in two
//! explicit steps: [`FromScalar::from_exact`] accepts the variant that
//! already matches `T`, and [`FromScalar::convert`] widens, narrows or parses
//! anything else. Null yields `T::default()`.

use crate::error::{DbError, DbResult};
use crate::models::DbValue;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Conversion of a scalar result into a Rust value.
pub trait FromScalar: Sized + Default {
    /// Name used in conversion errors.
    const TARGET: &'static str;

    /// Accept a value that already has the exact type.
    fn from_exact(value: &DbValue) -> Option<Self>;

    /// Generic fallback conversion.
    fn convert(value: &DbValue) -> Result<Self, String>;

    /// Run both steps. Null becomes the default value.
    fn from_scalar(value: DbValue) -> DbResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        if let Some(exact) = Self::from_exact(&value) {
            return Ok(exact);
        }
        Self::convert(&value).map_err(|message| DbError::scalar_conversion(Self::TARGET, message))
    }
}

fn cannot(value: &DbValue, target: &str) -> String {
    format!("{} value {} cannot be converted to {}", value.type_label(), value, target)
}

fn integer_of(value: &DbValue) -> Result<i64, String> {
    match value {
        DbValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("cannot parse '{}' as an integer: {}", s, e)),
        DbValue::Float(_) | DbValue::Double(_) | DbValue::Decimal(_) => {
            // Rounds to nearest, like a numeric cast in SQL. i64::MAX as f64
            // is 2^63, so the upper bound is exclusive.
            let rounded = value.as_f64().map(f64::round);
            rounded
                .filter(|v| v.is_finite() && *v >= i64::MIN as f64 && *v < i64::MAX as f64)
                .map(|v| v as i64)
                .ok_or_else(|| cannot(value, "an integer"))
        }
        other => other.as_i64().ok_or_else(|| cannot(other, "an integer")),
    }
}

macro_rules! impl_integer_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl FromScalar for $ty {
                const TARGET: &'static str = stringify!($ty);

                fn from_exact(value: &DbValue) -> Option<Self> {
                    match value {
                        DbValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }

                fn convert(value: &DbValue) -> Result<Self, String> {
                    let wide = integer_of(value)?;
                    <$ty>::try_from(wide)
                        .map_err(|_| format!("value {} is out of range for {}", wide, stringify!($ty)))
                }
            }
        )+
    };
}

impl_integer_scalar!(u8 => Byte, i16 => Int16, i32 => Int32, i64 => Int64);

impl FromScalar for f64 {
    const TARGET: &'static str = "f64";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("cannot parse '{}' as a number: {}", s, e)),
            DbValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            other => other.as_f64().ok_or_else(|| cannot(other, "f64")),
        }
    }
}

impl FromScalar for f32 {
    const TARGET: &'static str = "f32";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        f64::convert(value).map(|v| v as f32)
    }
}

impl FromScalar for bool {
    const TARGET: &'static str = "bool";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(cannot(value, "bool")),
            },
            other => other
                .as_i64()
                .map(|v| v != 0)
                .ok_or_else(|| cannot(other, "bool")),
        }
    }
}

impl FromScalar for String {
    const TARGET: &'static str = "String";

    fn from_exact(value: &DbValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Bytes(_) => Err(cannot(value, "String")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromScalar for Decimal {
    const TARGET: &'static str = "Decimal";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => s
                .trim()
                .parse()
                .map_err(|e| format!("cannot parse '{}' as a decimal: {}", s, e)),
            other => other.as_decimal().ok_or_else(|| cannot(other, "Decimal")),
        }
    }
}

impl FromScalar for NaiveDateTime {
    const TARGET: &'static str = "NaiveDateTime";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => crate::db::reader::parse_datetime(s)
                .ok_or_else(|| format!("cannot parse '{}' as a date/time", s)),
            other => Err(cannot(other, "NaiveDateTime")),
        }
    }
}

impl FromScalar for Uuid {
    const TARGET: &'static str = "Uuid";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Guid(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|e| e.to_string()),
            DbValue::Bytes(b) => Uuid::from_slice(b).map_err(|e| e.to_string()),
            other => Err(cannot(other, "Uuid")),
        }
    }
}

impl FromScalar for Vec<u8> {
    const TARGET: &'static str = "Vec<u8>";

    fn from_exact(value: &DbValue) -> Option<Self> {
        match value {
            DbValue::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        match value {
            DbValue::Guid(g) => Ok(g.as_bytes().to_vec()),
            DbValue::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(cannot(other, "Vec<u8>")),
        }
    }
}

impl<T: FromScalar> FromScalar for Option<T> {
    const TARGET: &'static str = T::TARGET;

    fn from_exact(value: &DbValue) -> Option<Self> {
        T::from_exact(value).map(Some)
    }

    fn convert(value: &DbValue) -> Result<Self, String> {
        T::convert(value).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_yields_default() {
        assert_eq!(i32::from_scalar(DbValue::Null).unwrap(), 0);
        assert_eq!(String::from_scalar(DbValue::Null).unwrap(), "");
        assert_eq!(<Option<i64>>::from_scalar(DbValue::Null).unwrap(), None);
        assert!(Uuid::from_scalar(DbValue::Null).unwrap().is_nil());
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(i64::from_scalar(DbValue::Int64(42)).unwrap(), 42);
        assert_eq!(
            String::from_scalar(DbValue::Text("x".to_string())).unwrap(),
            "x"
        );
    }

    #[test]
    fn test_generic_conversion() {
        assert_eq!(i32::from_scalar(DbValue::Int64(42)).unwrap(), 42);
        assert_eq!(i32::from_scalar(DbValue::Text(" 17 ".to_string())).unwrap(), 17);
        assert_eq!(i32::from_scalar(DbValue::Double(2.6)).unwrap(), 3);
        assert_eq!(f64::from_scalar(DbValue::Int32(3)).unwrap(), 3.0);
        assert!(bool::from_scalar(DbValue::Int64(1)).unwrap());
        assert_eq!(String::from_scalar(DbValue::Int32(5)).unwrap(), "5");
        assert_eq!(
            Decimal::from_scalar(DbValue::Text("1.25".to_string())).unwrap(),
            Decimal::new(125, 2)
        );
    }

    #[test]
    fn test_conversion_failure() {
        let err = i16::from_scalar(DbValue::Int64(100_000)).unwrap_err();
        assert!(matches!(err, DbError::ScalarConversion { .. }));
        assert!(err.to_string().contains("i16"));

        let err = i32::from_scalar(DbValue::Text("abc".to_string())).unwrap_err();
        assert!(matches!(err, DbError::ScalarConversion { .. }));
    }

    #[test]
    fn test_real_at_i64_upper_bound_is_rejected() {
        let two_pow_63 = 9_223_372_036_854_775_808.0_f64;
        let err = i64::from_scalar(DbValue::Double(two_pow_63)).unwrap_err();
        assert!(matches!(err, DbError::ScalarConversion { .. }));

        assert_eq!(
            i64::from_scalar(DbValue::Double(-two_pow_63)).unwrap(),
            i64::MIN
        );
    }
}
