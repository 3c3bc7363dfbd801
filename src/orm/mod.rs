//! Typed row mapping.
//!
//! Records are declared with [`record!`](crate::record) and enumerations with
//! [`db_enum!`](crate::db_enum). The mapper resolves column bindings once per
//! result shape, and the fluent builder in [`select`] produces paged queries.

pub mod field;
pub mod mapper;
pub mod query;
pub mod record;
pub mod select;

pub use field::{FieldValue, TargetKind};
pub use mapper::{BindingCache, ColumnBinding, Conversion, build_bindings, materialize};
pub use record::{FieldMap, FieldSetter, Record};
pub use select::{PagedList, SelectQuery, page_sql};
