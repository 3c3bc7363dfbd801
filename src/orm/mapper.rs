//! Result to record mapping.
//!
//! Mapping runs in two phases. [`build_bindings`] walks the columns of a row
//! shape once and resolves, for every column that matches a record field, the
//! conversion to apply. [`materialize`] then replays those bindings for each
//! row. Bindings carry no per-row state, so one list serves a whole result
//! set, and [`BindingCache`] keeps them across queries per record type and
//! shape.
//!
//! # Null handling
//!
//! A null column sets an `Option` field to `None`. A non-nullable field is
//! left untouched and keeps the value it had in `T::default()`. Nothing
//! signals that the column was null in that case.

use crate::db::driver::{ColumnInfo, RowShape};
use crate::db::reader::RowSource;
use crate::error::{DbError, DbResult};
use crate::models::{DbValue, FieldType};
use crate::orm::field::TargetKind;
use crate::orm::record::{FieldSetter, Record};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Conversion applied to a column value before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Raw value, as read
    Direct,
    /// Text column
    Text,
    /// Integer column into a bool field: `value == 1`
    IntegerToBool,
    /// Integer column into an enum field, by discriminant
    IntegerToEnum,
    /// Integer column into a numeric field
    Integer,
    /// Real column into a bool field: truncate, then `== 1`
    RealToBool,
    /// Real column into an integer field, truncating
    RealToInteger,
    /// Exact decimal column into a floating point field
    DecimalToFloat,
    /// Real column into a real field
    Real,
    DateTime,
    /// Binary column into a GUID field, from the first 16 bytes
    BytesToGuid,
    Bytes,
    /// Single byte from a smallint/tinyint column, widened to 16 bits
    ByteToInt16,
}

impl Conversion {
    /// Choose the conversion for a column and a target field.
    pub fn choose(column: &ColumnInfo, target: TargetKind) -> Self {
        match column.field_type {
            FieldType::Text => Self::Text,
            FieldType::Int16 | FieldType::Int32 | FieldType::Int64 => match target {
                TargetKind::Bool => Self::IntegerToBool,
                TargetKind::Enum => Self::IntegerToEnum,
                _ => Self::Integer,
            },
            FieldType::Float | FieldType::Double | FieldType::Decimal => {
                if target == TargetKind::Bool {
                    Self::RealToBool
                } else if target.is_integer() {
                    Self::RealToInteger
                } else if target.is_float() && column.field_type == FieldType::Decimal {
                    Self::DecimalToFloat
                } else {
                    Self::Real
                }
            }
            FieldType::DateTime => Self::DateTime,
            FieldType::Bytes => {
                if target == TargetKind::Guid {
                    Self::BytesToGuid
                } else {
                    Self::Bytes
                }
            }
            FieldType::Byte => {
                let type_name = column.type_name.to_lowercase();
                if type_name.contains("smallint") || type_name.contains("tinyint") {
                    Self::ByteToInt16
                } else {
                    Self::Direct
                }
            }
            FieldType::Bool | FieldType::Guid | FieldType::Other => Self::Direct,
        }
    }

    /// Apply the conversion to a non-null value.
    pub fn apply(&self, value: DbValue) -> Result<DbValue, String> {
        match self {
            Self::IntegerToBool => value
                .as_i64()
                .map(|v| DbValue::Bool(v == 1))
                .ok_or_else(|| format!("expected an integer, got {}", value.type_label())),
            Self::IntegerToEnum => value
                .as_i64()
                .map(DbValue::Int64)
                .ok_or_else(|| format!("expected an integer, got {}", value.type_label())),
            Self::RealToBool => value
                .as_i64()
                .map(|v| DbValue::Bool(v == 1))
                .ok_or_else(|| format!("expected a number, got {}", value.type_label())),
            Self::RealToInteger => value
                .as_i64()
                .map(DbValue::Int64)
                .ok_or_else(|| {
                    format!("{} value {} does not fit an integer", value.type_label(), value)
                }),
            Self::DecimalToFloat => match value {
                DbValue::Decimal(_) => value
                    .as_f64()
                    .map(DbValue::Double)
                    .ok_or_else(|| "decimal is out of range for a float".to_string()),
                other => Ok(other),
            },
            Self::BytesToGuid => match value {
                DbValue::Bytes(bytes) => {
                    let head = bytes.get(..16).ok_or_else(|| {
                        format!("expected at least 16 bytes for a GUID, got {}", bytes.len())
                    })?;
                    Uuid::from_slice(head)
                        .map(DbValue::Guid)
                        .map_err(|e| e.to_string())
                }
                other => Ok(other),
            },
            Self::ByteToInt16 => match value {
                DbValue::Byte(v) => Ok(DbValue::Int16(i16::from(v))),
                other => Ok(other),
            },
            Self::Direct
            | Self::Text
            | Self::Integer
            | Self::Real
            | Self::DateTime
            | Self::Bytes => Ok(value),
        }
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// Resolved mapping of one column to one record field.
pub struct ColumnBinding<T> {
    pub ordinal: usize,
    /// Column name as reported by the row source
    pub column: String,
    pub field: &'static str,
    pub conversion: Conversion,
    nullable: bool,
    setter: FieldSetter<T>,
}

impl<T> ColumnBinding<T> {
    /// Store one column value into `record`.
    pub fn apply(&self, record: &mut T, value: &DbValue) -> DbResult<()> {
        if value.is_null() {
            if self.nullable {
                (self.setter)(record, DbValue::Null)
                    .map_err(|m| DbError::mapping_conversion(&self.column, m))?;
            }
            return Ok(());
        }

        let converted = self
            .conversion
            .apply(value.clone())
            .map_err(|m| DbError::mapping_conversion(&self.column, m))?;
        (self.setter)(record, converted).map_err(|m| DbError::mapping_conversion(&self.column, m))
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

impl<T> Clone for ColumnBinding<T> {
    fn clone(&self) -> Self {
        Self {
            ordinal: self.ordinal,
            column: self.column.clone(),
            field: self.field,
            conversion: self.conversion,
            nullable: self.nullable,
            setter: self.setter,
        }
    }
}

impl<T> std::fmt::Debug for ColumnBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnBinding")
            .field("ordinal", &self.ordinal)
            .field("column", &self.column)
            .field("field", &self.field)
            .field("conversion", &self.conversion)
            .finish()
    }
}

/// Resolve the bindings of a record type for a row shape.
///
/// Columns are visited by ordinal and matched on their uppercased name.
/// Columns without a matching field are skipped.
pub fn build_bindings<T: Record>(shape: &RowShape) -> Vec<ColumnBinding<T>> {
    let fields = T::fields();
    shape
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(ordinal, column)| {
            let key = column.name.to_uppercase();
            let field = fields.iter().find(|f| f.column == key)?;
            Some(ColumnBinding {
                ordinal,
                column: column.name.clone(),
                field: field.field,
                conversion: Conversion::choose(column, field.kind),
                nullable: field.nullable,
                setter: field.setter,
            })
        })
        .collect()
}

/// Build one record from the current row.
///
/// Bindings run in column order; the first failure aborts the record.
pub fn materialize<T, R>(bindings: &[ColumnBinding<T>], row: &R) -> DbResult<T>
where
    T: Record,
    R: RowSource + ?Sized,
{
    let mut record = T::default();
    for binding in bindings {
        let value = row.value(binding.ordinal)?;
        binding.apply(&mut record, value)?;
    }
    Ok(record)
}

// =============================================================================
// Cache
// =============================================================================

type CacheKey = (TypeId, Arc<RowShape>);

/// Binding lists keyed by record type and row shape.
#[derive(Default)]
pub struct BindingCache {
    entries: RwLock<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
}

impl BindingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindings of `T` for `shape`, built on first use.
    pub fn bindings_for<T: Record>(&self, shape: &Arc<RowShape>) -> Arc<Vec<ColumnBinding<T>>> {
        let key = (TypeId::of::<T>(), Arc::clone(shape));

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if let Ok(bindings) = Arc::clone(entry).downcast::<Vec<ColumnBinding<T>>>() {
                    return bindings;
                }
            }
        }

        let bindings = Arc::new(build_bindings::<T>(shape));
        debug!(
            record = std::any::type_name::<T>(),
            columns = shape.len(),
            bound = bindings.len(),
            "Built column bindings"
        );
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, Arc::clone(&bindings) as Arc<dyn Any + Send + Sync>);
        bindings
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingCache")
            .field("entries", &self.len())
            .finish()
    }
}
