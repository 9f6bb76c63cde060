//! Fixes: changes applied to a database to remove the problems the lints find.

use std::path::PathBuf;

use rusqlite::params_from_iter;
use tracing::{debug, info};

use crate::columns::{collect_columns, Scope};
use crate::database::Database;
use crate::like_nulls::LikeNulls;
use crate::lint::contains_str_like_null;
use crate::migrate::{update_columns_to_nullable, MigrateOptions, MigrationOutcome};
use crate::{quote_identifier, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOptions {
    /// Destination of the schema-updated copy, when a schema update is needed.
    pub dest_path: Option<PathBuf>,
    pub scope: Scope,
    /// Replace the source database with the schema-updated copy.
    pub inplace: bool,
    pub like_nulls: LikeNulls,
}

impl Default for FixOptions {
    fn default() -> Self {
        FixOptions {
            dest_path: None,
            scope: Scope::default(),
            inplace: true,
            like_nulls: LikeNulls::default(),
        }
    }
}

/// Set text values that match one of `like_nulls` to `NULL`, in every column in `scope`.
/// All columns are updated in one transaction.  Returns the number of values changed.
///
/// The columns must already be nullable.  Writing `NULL` into a `NOT NULL` column fails with a
/// constraint violation, which is returned as is (see `Error::is_constraint_violation`) after the
/// transaction rolls back.
pub fn update_values_like_null_to_null(
    db: &mut Database,
    scope: &Scope,
    like_nulls: &LikeNulls,
) -> Result<usize> {
    info!(%like_nulls, "Updating column values with strings like NULL to NULL values.");
    if like_nulls.is_empty() {
        return Ok(0);
    }

    let columns = collect_columns(db, scope)?;
    let tx = db.connection_mut().transaction()?;
    let mut changed = 0;
    for col in columns {
        let column = quote_identifier(&col.column_name);
        let sql = format!(
            "UPDATE {} SET {} = NULL WHERE TYPEOF({}) = 'text' AND LOWER({}) IN ({})",
            quote_identifier(&col.table_name),
            column,
            column,
            column,
            like_nulls.placeholders()
        );
        let n = tx.execute(&sql, params_from_iter(like_nulls.tokens()))?;
        if n > 0 {
            debug!(table = %col.table_name, column = %col.column_name, rows = n, "Set null-like values to NULL.");
        }
        changed += n;
    }
    tx.commit()?;
    Ok(changed)
}

/// Update null-like text values to `NULL`, removing `NOT NULL` constraints where needed first.
///
/// A database without null-like values in scope is returned untouched.  Otherwise, when a column
/// in scope is `NOT NULL`, the schema is updated with `update_columns_to_nullable` and the fix
/// continues on the database it returns.  A schema update that rolls back ends the fix with
/// `Error::MigrationRolledBack`, leaving the values as they were.
pub fn clean_like_nulls(db: Database, options: &FixOptions) -> Result<Database> {
    info!("Updating column values with strings like NULL to NULL values, making schema changes where necessary.");

    if !contains_str_like_null(&db, &options.scope, &options.like_nulls)? {
        return Ok(db);
    }

    let mut db = db;
    let needs_nullable = collect_columns(&db, &options.scope)?
        .iter()
        .any(|c| c.not_null);
    if needs_nullable {
        let migration = update_columns_to_nullable(
            &db,
            &MigrateOptions {
                dest_path: options.dest_path.clone(),
                table_name: options.scope.table_name.clone(),
                inplace: options.inplace,
            },
        )?;
        // The columns in scope are still NOT NULL.
        if let MigrationOutcome::RolledBack { reason } = migration.outcome {
            return Err(Error::MigrationRolledBack(reason));
        }
        db = migration.database;
    }

    update_values_like_null_to_null(&mut db, &options.scope, &options.like_nulls)?;
    Ok(db)
}

#[test]
fn test_update_values_like_null_to_null_only_touches_text() {
    let mut db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE t (a TEXT, b BLOB, c REAL);
             INSERT INTO t VALUES ('None', 'keep', 1.5);
             INSERT INTO t VALUES ('sample', 'NULL', 'NaN');
             INSERT INTO t VALUES ('nan', X'6E756C6C', NULL);",
        )
        .unwrap();

    let n = update_values_like_null_to_null(&mut db, &Scope::all(), &LikeNulls::default()).unwrap();
    assert_eq!(n, 4);

    let nulls: i64 = db
        .connection()
        .query_row(
            "SELECT SUM(a IS NULL) + SUM(b IS NULL) + SUM(c IS NULL) FROM t",
            [],
            |r| r.get(0),
        )
        .unwrap();
    // Four rewritten values plus the NULL that was already there.
    assert_eq!(nulls, 5);
    // The blob spelling "null" is not text and stays.
    let blobs: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM t WHERE TYPEOF(b) = 'blob'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(blobs, 1);
}

#[test]
fn test_update_values_respects_scope() {
    let mut db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE t (a TEXT, b TEXT);
             INSERT INTO t VALUES ('null', 'null');",
        )
        .unwrap();
    let n = update_values_like_null_to_null(&mut db, &Scope::column("t", "a"), &LikeNulls::default())
        .unwrap();
    assert_eq!(n, 1);
    let (a, b): (Option<String>, Option<String>) = db
        .connection()
        .query_row("SELECT a, b FROM t", [], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap();
    assert_eq!(a, None);
    assert_eq!(b.as_deref(), Some("null"));
}

#[test]
fn test_update_values_into_not_null_column_is_a_constraint_violation() {
    let mut db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE t (b TEXT, a INTEGER NOT NULL);
             INSERT INTO t VALUES ('None', 'nan');",
        )
        .unwrap();
    let err = update_values_like_null_to_null(&mut db, &Scope::all(), &LikeNulls::default())
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");

    // The whole call rolled back, including the column that could have been updated.
    let b: String = db
        .connection()
        .query_row("SELECT b FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(b, "None");
}

#[test]
fn test_clean_like_nulls_stops_when_schema_update_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("check.sqlite");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        // A row that breaks its CHECK constraint fails the integrity check of the schema update.
        conn.execute_batch(
            "CREATE TABLE t (a INTEGER NOT NULL, b TEXT CHECK (b <> 'None'));
             PRAGMA ignore_check_constraints = ON;
             INSERT INTO t VALUES (1, 'None');",
        )
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let err = clean_like_nulls(db, &FixOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MigrationRolledBack(_)), "{err}");

    let conn = rusqlite::Connection::open(&path).unwrap();
    let b: String = conn.query_row("SELECT b FROM t", [], |r| r.get(0)).unwrap();
    assert_eq!(b, "None");
    let not_null: bool = conn
        .query_row("SELECT \"notnull\" FROM pragma_table_info('t') WHERE name = 'a'", [], |r| r.get(0))
        .unwrap();
    assert!(not_null);
    assert!(!crate::migrate::default_dest_path(&path).exists());
}
