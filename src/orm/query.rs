//! Record queries on [`Database`].

use crate::db::database::Database;
use crate::error::DbResult;
use crate::models::Command;
use crate::orm::record::Record;

impl Database {
    /// Execute a query and map every row onto `T`.
    ///
    /// The first row that fails to map fails the whole query. Column bindings
    /// come from the database's binding cache.
    pub async fn query<T: Record>(&self, command: &Command) -> DbResult<Vec<T>> {
        self.with_reader(command, |reader| {
            let bindings = self.binding_cache().bindings_for::<T>(&reader.shape_arc());
            reader.records_with(bindings).collect()
        })
        .await
    }

    /// Like [`Database::query`], mapping only `take` rows after skipping
    /// `skip`. Skipped rows are never mapped.
    pub async fn query_paged<T: Record>(
        &self,
        command: &Command,
        skip: usize,
        take: usize,
    ) -> DbResult<Vec<T>> {
        self.with_reader(command, |reader| {
            for _ in 0..skip {
                if !reader.read() {
                    return Ok(Vec::new());
                }
            }
            let bindings = self.binding_cache().bindings_for::<T>(&reader.shape_arc());
            reader.records_with(bindings).take(take).collect()
        })
        .await
    }

    /// First mapped row, if any.
    pub async fn query_first<T: Record>(&self, command: &Command) -> DbResult<Option<T>> {
        self.with_reader(command, |reader| {
            let bindings = self.binding_cache().bindings_for::<T>(&reader.shape_arc());
            reader.records_with(bindings).next().transpose()
        })
        .await
    }
}
