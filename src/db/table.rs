//! In-memory result tables.
//!
//! `fill_table` buffers a whole result set into a [`DataTable`] that outlives
//! the connection it was read from.

use crate::db::driver::{RowSet, RowShape};
use crate::db::reader::RowSource;
use crate::error::{DbError, DbResult};
use crate::models::DbValue;
use crate::orm::mapper::{build_bindings, materialize};
use crate::orm::record::Record;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// A buffered result set.
#[derive(Debug, Clone, Default)]
pub struct DataTable {
    shape: Arc<RowShape>,
    rows: Vec<DataRow>,
}

/// One row of a [`DataTable`].
#[derive(Debug, Clone)]
pub struct DataRow {
    shape: Arc<RowShape>,
    values: Vec<DbValue>,
}

impl DataTable {
    pub fn from_row_set(row_set: RowSet) -> Self {
        let shape = row_set.shape;
        let rows = row_set
            .rows
            .into_iter()
            .map(|values| DataRow {
                shape: Arc::clone(&shape),
                values,
            })
            .collect();
        Self { shape, rows }
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub fn column_names(&self) -> Vec<String> {
        self.shape.column_names()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Map every row onto a record, failing on the first bad row.
    pub fn to_records<T: Record>(&self) -> DbResult<Vec<T>> {
        let bindings = build_bindings::<T>(&self.shape);
        self.rows
            .iter()
            .map(|row| materialize(&bindings, row))
            .collect()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.rows.iter().map(DataRow::to_json).collect())
    }
}

impl DataRow {
    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    /// Value of a column by name, case-insensitive.
    pub fn get(&self, column: &str) -> DbResult<&DbValue> {
        let ordinal = self.ordinal(column)?;
        self.value(ordinal)
    }

    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.values.len());
        for (column, value) in self.shape.columns().iter().zip(&self.values) {
            object.insert(column.name.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }
}

impl RowSource for DataRow {
    fn shape(&self) -> &RowShape {
        &self.shape
    }

    fn value(&self, ordinal: usize) -> DbResult<&DbValue> {
        self.values.get(ordinal).ok_or_else(|| {
            DbError::invalid_input(format!("Column ordinal {} is out of range", ordinal))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::ColumnInfo;
    use crate::models::FieldType;

    crate::record! {
        #[derive(Debug)]
        struct Item {
            id: i64,
            label: Option<String>,
        }
    }

    fn table() -> DataTable {
        DataTable::from_row_set(RowSet::new(
            vec![
                ColumnInfo::new("id", FieldType::Int64, "INTEGER"),
                ColumnInfo::new("label", FieldType::Text, "TEXT"),
                ColumnInfo::new("data", FieldType::Bytes, "BLOB"),
            ],
            vec![
                vec![
                    DbValue::Int64(1),
                    DbValue::Text("one".to_string()),
                    DbValue::Bytes(vec![1, 2, 3]),
                ],
                vec![DbValue::Int64(2), DbValue::Null, DbValue::Null],
            ],
        ))
    }

    #[test]
    fn test_table_rows() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["id", "label", "data"]);
        assert_eq!(table.rows()[1].get("ID").unwrap(), &DbValue::Int64(2));
        assert!(table.rows()[1].is_null(1).unwrap());
    }

    #[test]
    fn test_table_json() {
        let json = table().to_json();
        assert_eq!(json[0]["label"], "one");
        assert_eq!(json[0]["data"], "AQID");
        assert!(json[1]["label"].is_null());
    }

    #[test]
    fn test_table_records() {
        let items: Vec<Item> = table().to_records().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label.as_deref(), Some("one"));
        assert_eq!(items[1].id, 2);
        assert_eq!(items[1].label, None);
    }

    #[test]
    fn test_empty_table() {
        let table = DataTable::from_row_set(RowSet::empty());
        assert!(table.is_empty());
        assert_eq!(table.to_json(), JsonValue::Array(vec![]));
    }
}
