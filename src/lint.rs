//! Lints: read-only checks for data problems in a database.
//!
//! Each lint walks the columns in scope and runs one `EXISTS` query per column, stopping at the
//! first column with a finding.  The checks look at the storage class of every stored value
//! (`typeof()`), not at the declared column type, because SQLite's flexible typing lets a column
//! hold values of any class.

use itertools::Itertools;
use rusqlite::params_from_iter;
use tracing::{info, warn};

use crate::affinity::Affinity;
use crate::columns::{collect_columns, Scope};
use crate::database::Database;
use crate::like_nulls::LikeNulls;
use crate::{quote_identifier, Result};

/// Detect values whose storage class conflicts with their column's affinity, for the entire
/// database, one table, or one column.
///
/// Returns `Err(Error::Affinity(..))` when a column in scope has a declared type with no known affinity.
pub fn contains_conflicting_aff_storage_class(db: &Database, scope: &Scope) -> Result<bool> {
    info!("Determining if SQLite database contains conflicting column affinity vs storage class values.");

    for col in collect_columns(db, scope)? {
        let affinity = Affinity::for_column(&col.table_name, &col.column_name, &col.declared_type)?;
        let accepted = affinity
            .storage_classes()
            .iter()
            .map(|sc| format!("'{}'", sc))
            .join(", ");
        let column = quote_identifier(&col.column_name);
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE TYPEOF({}) NOT IN ({}))",
            quote_identifier(&col.table_name),
            column,
            accepted
        );
        let found: bool = db.connection().query_row(&sql, [], |r| r.get(0))?;
        if found {
            warn!(
                table = %col.table_name,
                column = %col.column_name,
                affinity = %affinity,
                "Discovered conflicting column affinity type and storage class."
            );
            return Ok(true);
        }
    }

    info!("Found no conflicting affinity vs storage class data within provided database.");
    Ok(false)
}

/// Detect whether the given database, table, or column contains a text value which is similar
/// to NULL.  Text instead of a real `NULL` is read back as a value rather than as "no value".
pub fn contains_str_like_null(db: &Database, scope: &Scope, like_nulls: &LikeNulls) -> Result<bool> {
    info!(%like_nulls, "Determining if SQLite database contains string values like NULLs.");
    if like_nulls.is_empty() {
        return Ok(false);
    }

    for col in collect_columns(db, scope)? {
        let column = quote_identifier(&col.column_name);
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE TYPEOF({}) = 'text' AND LOWER({}) IN ({}))",
            quote_identifier(&col.table_name),
            column,
            column,
            like_nulls.placeholders()
        );
        let found: bool =
            db.connection()
                .query_row(&sql, params_from_iter(like_nulls.tokens()), |r| r.get(0))?;
        if found {
            warn!(
                table = %col.table_name,
                column = %col.column_name,
                "Discovered strings like nulls."
            );
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
fn lint_test_db() -> Database {
    let db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE tbl_a (col_integer INTEGER NOT NULL, col_text TEXT, col_real REAL, col_num NUMERIC);
             INSERT INTO tbl_a VALUES (1, 'sample', 0.5, 2);
             INSERT INTO tbl_a VALUES (2, NULL, NULL, 2.5);",
        )
        .unwrap();
    db
}

#[test]
fn test_conflicting_storage_class() {
    let db = lint_test_db();
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap());

    db.connection()
        .execute("INSERT INTO tbl_a VALUES ('nan', 'None', 'x', 3)", [])
        .unwrap();
    assert!(contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap());
    assert!(contains_conflicting_aff_storage_class(&db, &Scope::column("tbl_a", "col_integer")).unwrap());
    assert!(contains_conflicting_aff_storage_class(&db, &Scope::column("tbl_a", "col_real")).unwrap());
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::column("tbl_a", "col_text")).unwrap());
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::column("tbl_a", "col_num")).unwrap());
}

#[test]
fn test_unknown_declared_type_is_an_error() {
    let db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch("CREATE TABLE g (shape GEOMETRY); INSERT INTO g VALUES (1);")
        .unwrap();
    let err = contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap_err();
    assert!(matches!(err, crate::Error::Affinity(_)));
}

#[test]
fn test_str_like_null() {
    let db = lint_test_db();
    let like_nulls = LikeNulls::default();
    assert!(!contains_str_like_null(&db, &Scope::all(), &like_nulls).unwrap());

    db.connection()
        .execute("INSERT INTO tbl_a VALUES (3, 'NULL', 'NaN', 4)", [])
        .unwrap();
    assert!(contains_str_like_null(&db, &Scope::all(), &like_nulls).unwrap());
    assert!(contains_str_like_null(&db, &Scope::column("tbl_a", "col_text"), &like_nulls).unwrap());
    assert!(contains_str_like_null(&db, &Scope::column("tbl_a", "col_real"), &like_nulls).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::column("tbl_a", "col_num"), &like_nulls).unwrap());

    // Only the configured tokens count.
    let custom = LikeNulls::new(["n/a"]);
    assert!(!contains_str_like_null(&db, &Scope::all(), &custom).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::all(), &LikeNulls::new(Vec::<String>::new())).unwrap());
}

#[test]
fn test_lints_on_empty_database() {
    let db = Database::open(":memory:").unwrap();
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::all(), &LikeNulls::default()).unwrap());
}
