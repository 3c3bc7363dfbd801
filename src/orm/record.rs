//! Record declarations.
//!
//! A record is a plain struct whose fields are filled from result columns.
//! The column map is declared at compile time with the [`record!`] macro:
//!
//! ```ignore
//! db_facade::record! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct Person as "PEOPLE" {
//!         pub id: i64,
//!         pub name: String,
//!         #[column = "IS_ACTIVE"]
//!         pub active: bool,
//!         pub nickname: Option<String>,
//!     }
//! }
//! ```
//!
//! Columns default to the uppercased field name. `#[column = "..."]` sets an
//! alias, and `as "TABLE"` records the table name. The macro derives
//! `Default`, so do not derive it again.

use crate::models::DbValue;
use crate::orm::field::TargetKind;

/// Stores a converted value into one field.
pub type FieldSetter<T> = fn(&mut T, DbValue) -> Result<(), String>;

/// Mapping of one record field to its column.
pub struct FieldMap<T> {
    pub field: &'static str,
    /// Uppercased column name the field is matched against
    pub column: String,
    pub kind: TargetKind,
    pub nullable: bool,
    pub setter: FieldSetter<T>,
}

impl<T> FieldMap<T> {
    pub fn new(
        field: &'static str,
        alias: Option<&'static str>,
        kind: TargetKind,
        nullable: bool,
        setter: FieldSetter<T>,
    ) -> Self {
        Self {
            field,
            column: alias.unwrap_or(field).to_uppercase(),
            kind,
            nullable,
            setter,
        }
    }
}

impl<T> std::fmt::Debug for FieldMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMap")
            .field("field", &self.field)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// A type result rows can be mapped onto.
pub trait Record: Default + Send + 'static {
    /// Table the record is stored in, when declared.
    fn table() -> Option<&'static str> {
        None
    }

    /// Field to column map, in declaration order.
    fn fields() -> Vec<FieldMap<Self>>;

    /// Look up a field map by uppercased column name.
    fn field_for_column(column: &str) -> Option<FieldMap<Self>> {
        let key = column.to_uppercase();
        Self::fields().into_iter().find(|f| f.column == key)
    }
}

/// Declare a record struct together with its column map.
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident $(as $table:literal)? {
            $(
                $(#[column = $column:literal])?
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Default)]
        $vis struct $name {
            $($fvis $field: $ty,)*
        }

        impl $crate::orm::Record for $name {
            fn table() -> Option<&'static str> {
                $crate::__record_name!($($table)?)
            }

            fn fields() -> Vec<$crate::orm::FieldMap<Self>> {
                vec![
                    $(
                        $crate::orm::FieldMap::new(
                            stringify!($field),
                            $crate::__record_name!($($column)?),
                            <$ty as $crate::orm::FieldValue>::KIND,
                            <$ty as $crate::orm::FieldValue>::NULLABLE,
                            |record: &mut Self, value: $crate::models::DbValue| {
                                record.$field = <$ty as $crate::orm::FieldValue>::from_db_value(value)?;
                                Ok(())
                            },
                        ),
                    )*
                ]
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __record_name {
    () => {
        None
    };
    ($name:literal) => {
        Some($name)
    };
}

/// Declare an integer-backed enumeration usable as a record field.
///
/// The first variant is the default. Integer columns map by discriminant; an
/// unknown discriminant is a conversion error.
#[macro_export]
macro_rules! db_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $first:ident = $first_value:literal
            $(, $variant:ident = $value:literal)* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $first = $first_value,
            $($variant = $value,)*
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$first
            }
        }

        impl $name {
            /// Variant with the given discriminant.
            pub fn from_discriminant(value: i64) -> Option<Self> {
                if value == Self::$first as i64 {
                    return Some(Self::$first);
                }
                $(
                    if value == Self::$variant as i64 {
                        return Some(Self::$variant);
                    }
                )*
                None
            }
        }

        impl $crate::orm::FieldValue for $name {
            const KIND: $crate::orm::TargetKind = $crate::orm::TargetKind::Enum;

            fn from_db_value(value: $crate::models::DbValue) -> Result<Self, String> {
                let discriminant = value
                    .as_i64()
                    .ok_or_else(|| format!("cannot assign {} value to {}", value.type_label(), stringify!($name)))?;
                Self::from_discriminant(discriminant).ok_or_else(|| {
                    format!("{} is not a valid {} value", discriminant, stringify!($name))
                })
            }
        }

        impl From<$name> for $crate::models::DbValue {
            fn from(value: $name) -> Self {
                $crate::models::DbValue::Int64(value as i64)
            }
        }
    };
}
