//! Facade behaviour against a recording mock driver.
//!
//! Tests verify that:
//! - Engine classification and command adaptation reach the driver
//! - Each connection plan restores the connection state it found
//! - Readers release implicitly opened connections
//! - Driver failures are wrapped with provider and command text

mod common;

use common::mock_database;
use db_facade::db::{ColumnInfo, RowSet, RowSource};
use db_facade::models::{DbValue, DriverFamily, EngineKind, FieldType};
use db_facade::{DbError, record};
use std::sync::atomic::Ordering;
use tokio_test::assert_ok;

record! {
    #[derive(Debug, Clone, PartialEq)]
    struct Flagged {
        id: i64,
        enabled: bool,
    }
}

fn flag_rows() -> RowSet {
    RowSet::new(
        vec![
            ColumnInfo::new("ID", FieldType::Int64, "BIGINT"),
            ColumnInfo::new("ENABLED", FieldType::Int32, "INT"),
        ],
        vec![
            vec![DbValue::Int64(1), DbValue::Int32(1)],
            vec![DbValue::Int64(2), DbValue::Int32(0)],
            vec![DbValue::Int64(3), DbValue::Null],
        ],
    )
}

// =============================================================================
// Adaptation
// =============================================================================

#[tokio::test]
async fn test_sqlserver_keeps_named_markers() {
    let (db, stats) = mock_database(
        "System.Data.SqlClient.SqlClientFactory",
        DriverFamily::Named,
        "Initial Catalog=TestDB;Integrated Security=true",
    );
    assert_eq!(db.engine(), EngineKind::SqlServerLike);

    let command = db
        .create_command("SELECT ISNULL(NAME, '') FROM T WHERE ID = @id", false)
        .param("@id", 7);
    assert_ok!(db.execute_non_query(&command).await);

    let sent = stats.last_command().unwrap();
    assert_eq!(sent.text, "SELECT ISNULL(NAME, '') FROM T WHERE ID = @id");
    assert_eq!(sent.args.len(), 1);
}

#[tokio::test]
async fn test_oledb_fallback_classification() {
    let (db, _) = mock_database(
        "System.Data.OleDb.OleDbFactory",
        DriverFamily::Positional,
        "Provider=SQLOLEDB;Data Source=server",
    );
    assert_eq!(db.engine(), EngineKind::SqlServerLike);
}

#[tokio::test]
async fn test_oracle_positional_adaptation() {
    let (db, stats) = mock_database(
        "System.Data.OleDb.OleDbFactory",
        DriverFamily::Positional,
        "Provider=OraOLEDB.Oracle;Data Source=orcl",
    );
    assert_eq!(db.engine(), EngineKind::OracleLike);

    let command = db
        .create_command("SELECT ISNULL(col,0) FROM t WHERE x=@x", false)
        .param("@x", 5);
    assert_ok!(db.execute_scalar(&command).await);

    let sent = stats.last_command().unwrap();
    assert_eq!(sent.text, "SELECT NVL(col,0) FROM t WHERE x=?");
    assert_eq!(sent.args[0].value, DbValue::Int32(5));
}

#[tokio::test]
async fn test_same_command_adapts_identically_twice() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Numbered, "mock://db");
    let command = db
        .create_command("UPDATE T SET A = @a WHERE B = @b OR C = @a", false)
        .param("@a", 1)
        .param("@b", 2);

    assert_ok!(db.execute_non_query(&command).await);
    let first = stats.last_command().unwrap();
    assert_ok!(db.execute_non_query(&command).await);
    let second = stats.last_command().unwrap();

    assert_eq!(first, second);
    assert_eq!(first.text, "UPDATE T SET A = $1 WHERE B = $2 OR C = $1");
    assert_eq!(first.args.len(), 2);
    assert_eq!(command.text, "UPDATE T SET A = @a WHERE B = @b OR C = @a");
}

#[tokio::test]
async fn test_positional_binds_every_declared_parameter() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let command = db
        .create_command("SELECT * FROM T WHERE A = ? AND B = ?", false)
        .param("a", 1)
        .param("b", 2);

    assert_ok!(db.execute_non_query(&command).await);
    let sent = stats.last_command().unwrap();
    assert_eq!(sent.text, "SELECT * FROM T WHERE A = ? AND B = ?");
    let values: Vec<DbValue> = sent.args.into_iter().map(|a| a.value).collect();
    assert_eq!(values, vec![DbValue::Int32(1), DbValue::Int32(2)]);
}

#[tokio::test]
async fn test_positional_mismatch_fails_before_connecting() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let command = db
        .create_command("UPDATE T SET B = @b WHERE A = @a", false)
        .param("@a", 1)
        .param("@b", 2);

    let err = db.execute_non_query(&command).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));

    let command = db.create_command("SELECT ? + 1", false);
    let err = db.execute_scalar(&command).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));

    assert_eq!(stats.opened(), 0);
    assert!(stats.last_command().is_none());
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_transient_connection_is_closed() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let command = db.create_command("DELETE FROM T", false);

    assert_eq!(db.execute_non_query(&command).await.unwrap(), 1);
    assert_ok!(db.execute_scalar(&command).await);

    assert_eq!(stats.opened(), 2);
    assert_eq!(stats.live(), 0);
    assert!(command.connection.is_none());
}

#[tokio::test]
async fn test_closed_bound_connection_is_restored() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let command = db.create_command("DELETE FROM T", true);
    let connection = db.create_connection(true);

    assert_ok!(db.execute_non_query(&command).await);
    assert!(!connection.is_open().await);
    assert_ok!(db.execute_scalar(&command).await);
    assert!(!connection.is_open().await);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_open_bound_connection_stays_open() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let connection = db.create_connection(true);
    assert_ok!(connection.open().await);

    let command = db.create_command("DELETE FROM T", true);
    assert_ok!(db.execute_non_query(&command).await);
    assert_ok!(db.execute_scalar(&command).await);

    assert!(connection.is_open().await);
    assert_eq!(stats.opened(), 1);

    assert_ok!(db.close_default_connection().await);
    assert!(!connection.is_open().await);
    assert!(db.default_connection().unwrap().ptr_eq(&connection));
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_reader_close_releases_implicit_connection() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.set_result(flag_rows());

    let mut reader = db
        .execute_reader(&db.create_command("SELECT ID, ENABLED FROM T", false))
        .await
        .unwrap();
    assert_eq!(stats.live(), 1);
    assert!(reader.read());
    assert_eq!(reader.get_i64(0).unwrap(), 1);

    reader.close().await;
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_dropped_reader_discards_connection() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.set_result(flag_rows());

    let reader = db
        .execute_reader(&db.create_command("SELECT ID, ENABLED FROM T", false))
        .await
        .unwrap();
    drop(reader);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_with_reader_releases_on_error() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.set_result(flag_rows());
    let command = db.create_command("SELECT ID, ENABLED FROM T", false);

    let result: Result<(), DbError> = db
        .with_reader(&command, |reader| {
            reader.read();
            Err(DbError::invalid_input("callback failed"))
        })
        .await;

    assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_transaction_requires_open_connection() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let connection = db.create_connection(false);
    assert!(db.begin_transaction(&connection).await.is_err());

    assert_ok!(connection.open().await);
    let transaction = db.begin_transaction(&connection).await.unwrap();
    let mut command = db.create_command("DELETE FROM T", false).with_connection(connection.clone());
    command.enlist_transaction(&transaction);

    assert_ok!(db.execute_non_query(&command).await);
    assert_ok!(transaction.commit().await);
    assert_eq!(stats.committed.load(Ordering::SeqCst), 1);

    // The transaction is finished, so enlisted commands are refused
    let err = db.execute_non_query(&command).await.unwrap_err();
    assert!(matches!(err, DbError::Transaction { .. }));
}

// =============================================================================
// Errors and mapping
// =============================================================================

#[tokio::test]
async fn test_execution_failure_is_wrapped() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.fail_commands.store(true, Ordering::SeqCst);
    let command = db.create_command("SELECT * FROM T WHERE ID = @id", false).param("@id", 1);

    let err = db.execute_non_query(&command).await.unwrap_err();
    match &err {
        DbError::CommandExecution {
            message,
            provider,
            command_text,
            ..
        } => {
            assert_eq!(message, "Could not execute non-query command.");
            assert_eq!(provider, "mock");
            assert_eq!(command_text, "SELECT * FROM T WHERE ID = ?");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.driver_error().is_some());

    let err = db.execute_scalar(&command).await.unwrap_err();
    assert!(err.to_string().contains("ExecuteScalar"));
    let err = db.execute_reader(&command).await.unwrap_err();
    assert!(err.to_string().contains("ExecuteReader"));
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_open_failure_is_wrapped() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.fail_connect.store(true, Ordering::SeqCst);

    let err = db
        .execute_non_query(&db.create_command("DELETE FROM T", false))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConnectionOpen { .. }));
    assert!(err.suggestion().is_some());
    assert!(!err.to_string().contains("mock://db"));
}

#[tokio::test]
async fn test_query_maps_integer_flags() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.set_result(flag_rows());

    let rows: Vec<Flagged> = db
        .query(&db.create_command("SELECT ID, ENABLED FROM T", false))
        .await
        .unwrap();
    let flags: Vec<bool> = rows.iter().map(|r| r.enabled).collect();
    assert_eq!(flags, vec![true, false, false]);
    assert_eq!(db.binding_cache().len(), 1);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_empty_result_maps_to_empty_list() {
    let (db, _) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    let rows: Vec<Flagged> = db
        .query(&db.create_command("SELECT ID, ENABLED FROM T", false))
        .await
        .unwrap();
    assert!(rows.is_empty());

    let count: i64 = db
        .execute_scalar_as(&db.create_command("SELECT COUNT(*) FROM T", false))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_paged_list_on_sqlserver() {
    let (db, stats) = mock_database(
        "System.Data.SqlClient.SqlClientFactory",
        DriverFamily::Named,
        "Initial Catalog=TestDB",
    );
    stats.set_result(flag_rows());

    let page = db
        .select("ID, ENABLED")
        .from("T")
        .to_paged_list::<Flagged>(0, 3)
        .await
        .unwrap();

    let sent = stats.last_command().unwrap();
    assert_eq!(
        sent.text,
        "SELECT ID, ENABLED FROM T ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 3 ROWS ONLY"
    );
    // The mock answers the count with the first cell of its result
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn test_reader_metadata() {
    let (db, stats) = mock_database("MockFactory", DriverFamily::Positional, "mock://db");
    stats.set_result(flag_rows());

    db.with_reader(&db.create_command("SELECT ID, ENABLED FROM T", false), |reader| {
        assert_eq!(reader.field_count(), 2);
        assert_eq!(reader.ordinal("enabled")?, 1);
        assert_eq!(reader.field_type(1)?, FieldType::Int32);
        assert_eq!(reader.row_count(), 3);
        reader.read();
        reader.read();
        reader.read();
        assert!(reader.is_null(1)?);
        assert_eq!(reader.safe_i32(1, -1), -1);
        Ok(())
    })
    .await
    .unwrap();
}
