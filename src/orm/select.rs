//! Fluent SELECT builder with paging.
//!
//! ```ignore
//! let page = db
//!     .select("ID, NAME")
//!     .from("PEOPLE")
//!     .where_clause("ACTIVE = @active")
//!     .order_by("NAME")
//!     .param("@active", 1)
//!     .to_paged_list::<Person>(20, 10)
//!     .await?;
//! ```
//!
//! Absent clauses are left out of the generated text. Paging runs a
//! `COUNT(*)` over the same FROM and WHERE clauses and then the page itself,
//! in the paging dialect of the engine.

use crate::db::database::Database;
use crate::error::DbResult;
use crate::models::{Command, DbValue, EngineKind, Parameter};
use crate::orm::record::Record;
use serde::Serialize;

/// One page of records plus the size of the whole result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub take: usize,
    pub skip: usize,
}

impl<T> Default for PagedList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            take: 0,
            skip: 0,
        }
    }
}

impl<T> PagedList<T> {
    /// Whether rows remain after this page.
    pub fn has_more(&self) -> bool {
        (self.skip + self.items.len()) < usize::try_from(self.total_count).unwrap_or(0)
    }
}

/// A SELECT statement under construction.
#[derive(Debug, Clone)]
pub struct SelectQuery<'db> {
    database: &'db Database,
    columns: String,
    from: Option<String>,
    where_clause: Option<String>,
    order_by: Option<String>,
    parameters: Vec<Parameter>,
}

impl Database {
    /// Start a SELECT of `columns`.
    pub fn select(&self, columns: &str) -> SelectQuery<'_> {
        SelectQuery {
            database: self,
            columns: columns.to_string(),
            from: None,
            where_clause: None,
            order_by: None,
            parameters: Vec::new(),
        }
    }
}

fn clause(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl<'db> SelectQuery<'db> {
    pub fn from(mut self, from: &str) -> Self {
        self.from = clause(from);
        self
    }

    pub fn where_clause(mut self, condition: &str) -> Self {
        self.where_clause = clause(condition);
        self
    }

    pub fn order_by(mut self, order: &str) -> Self {
        self.order_by = clause(order);
        self
    }

    /// Bind a parameter referenced by an `@name` marker in any clause.
    pub fn param(mut self, name: &str, value: impl Into<DbValue>) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    pub fn to_command_text(&self) -> String {
        let mut text = self.filtered_text(&self.columns);
        if let Some(order) = &self.order_by {
            text.push_str(" ORDER BY ");
            text.push_str(order);
        }
        text
    }

    pub fn to_count_command_text(&self) -> String {
        self.filtered_text("COUNT(*)")
    }

    pub fn to_command(&self) -> Command {
        self.command(self.to_command_text())
    }

    pub fn to_count_command(&self) -> Command {
        self.command(self.to_count_command_text())
    }

    /// Run the query and map every row onto `T`.
    pub async fn to_list<T: Record>(&self) -> DbResult<Vec<T>> {
        self.database.query(&self.to_command()).await
    }

    /// Run a count and one page of the query.
    pub async fn to_paged_list<T: Record>(&self, skip: usize, take: usize) -> DbResult<PagedList<T>> {
        let total_count: i64 = self
            .database
            .execute_scalar_as(&self.to_count_command())
            .await?;

        let text = page_sql(
            self.database.engine(),
            &self.to_command_text(),
            self.order_by.is_some(),
            skip,
            take,
        );
        let items = self.database.query(&self.command(text)).await?;

        Ok(PagedList {
            items,
            total_count,
            take,
            skip,
        })
    }

    /// SELECT, FROM and WHERE clauses.
    fn filtered_text(&self, columns: &str) -> String {
        let mut text = format!("SELECT {}", columns);
        if let Some(from) = &self.from {
            text.push_str(" FROM ");
            text.push_str(from);
        }
        if let Some(condition) = &self.where_clause {
            text.push_str(" WHERE ");
            text.push_str(condition);
        }
        text
    }

    fn command(&self, text: String) -> Command {
        let mut command = self.database.create_command(&text, false);
        for parameter in &self.parameters {
            command.push_parameter(parameter.clone());
        }
        command
    }
}

/// Append the paging clause of `engine` to a SELECT.
///
/// SQL Server-like engines require an ORDER BY before OFFSET, so an unordered
/// query gets `ORDER BY (SELECT NULL)`.
pub fn page_sql(engine: EngineKind, text: &str, ordered: bool, skip: usize, take: usize) -> String {
    match engine {
        EngineKind::SqlServerLike => {
            let order = if ordered { "" } else { " ORDER BY (SELECT NULL)" };
            format!(
                "{}{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                text, order, skip, take
            )
        }
        EngineKind::OracleLike => format!(
            "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            text, skip, take
        ),
        EngineKind::Other => format!("{} LIMIT {} OFFSET {}", text, take, skip),
    }
}
