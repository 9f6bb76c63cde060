use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params, Connection};
use tempfile::TempDir;

use sqlite_clean::{
    clean_like_nulls, contains_conflicting_aff_storage_class, contains_str_like_null, dbheader,
    update_columns_to_nullable, update_values_like_null_to_null, Database, FixOptions, LikeNulls,
    MigrateOptions, MigrationOutcome, Scope,
};

/// Two tables with one column per affinity group.  Only `tbl_a.col_integer` is `NOT NULL`.
fn create_testdb(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("testdb.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tbl_a (
            col_integer INTEGER NOT NULL,
            col_text TEXT,
            col_blob BLOB,
            col_real REAL
        );
        CREATE TABLE tbl_b (
            col_integer INTEGER,
            col_text TEXT,
            col_blob BLOB,
            col_real REAL
        );",
    )
    .unwrap();
    for table in ["tbl_a", "tbl_b"] {
        conn.execute(
            &format!("INSERT INTO {table} VALUES (?1, ?2, ?3, ?4)"),
            params![1, "sample", b"sample_blob".to_vec(), 0.5],
        )
        .unwrap();
    }
    path
}

/// `create_testdb` plus a third table, so the schema version is 3 rather than 2.
fn create_testdb_with_extra_table(dir: &TempDir) -> PathBuf {
    let path = create_testdb(dir);
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tbl_c (col_text TEXT NOT NULL);
         INSERT INTO tbl_c VALUES ('sample');",
    )
    .unwrap();
    path
}

fn rows(path: &Path, table: &str) -> Vec<Vec<Value>> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {table} ORDER BY rowid"))
        .unwrap();
    let n = stmt.column_count();
    let rows = stmt
        .query_map([], |r| (0..n).map(|i| r.get(i)).collect::<rusqlite::Result<Vec<Value>>>())
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn not_null_flags(path: &Path, table: &str) -> Vec<(String, bool)> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")
        .unwrap();
    let rows = stmt
        .query_map([table], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

fn row_count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn test_clean_database_has_no_findings() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(create_testdb(&dir)).unwrap();
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::all(), &LikeNulls::default()).unwrap());
}

#[test]
fn test_conflicting_storage_class_detected_and_scoped() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_testdb(&dir);
    Connection::open(&path)
        .unwrap()
        .execute(
            "INSERT INTO tbl_b VALUES (1, 'sample', X'00', 'not a real')",
            [],
        )
        .unwrap();

    let db = Database::open(&path).unwrap();
    assert!(contains_conflicting_aff_storage_class(&db, &Scope::all()).unwrap());
    assert!(contains_conflicting_aff_storage_class(&db, &Scope::table("TBL_B")).unwrap());
    assert!(!contains_conflicting_aff_storage_class(&db, &Scope::table("tbl_a")).unwrap());
    assert!(
        !contains_conflicting_aff_storage_class(&db, &Scope::column("tbl_b", "col_text")).unwrap()
    );
}

#[test]
fn test_str_like_null_detected_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_testdb(&dir);
    Connection::open(&path)
        .unwrap()
        .execute("INSERT INTO tbl_a VALUES (2, 'NaN', NULL, NULL)", [])
        .unwrap();

    let db = Database::open(&path).unwrap();
    assert!(contains_str_like_null(&db, &Scope::all(), &LikeNulls::default()).unwrap());
    assert!(contains_str_like_null(&db, &Scope::column("tbl_a", "col_text"), &LikeNulls::default()).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::table("tbl_b"), &LikeNulls::default()).unwrap());
    assert!(!contains_str_like_null(&db, &Scope::all(), &"missing".parse().unwrap()).unwrap());
}

#[test]
fn test_update_columns_to_nullable_to_copy() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    let dest = dir.path().join("copy.sqlite");
    let version_before = dbheader::read_header(&src).unwrap().schema_cookie;

    let db = Database::open(&src).unwrap();
    let migration = update_columns_to_nullable(
        &db,
        &MigrateOptions {
            dest_path: Some(dest.clone()),
            table_name: None,
            inplace: false,
        },
    )
    .unwrap();
    assert_eq!(
        migration.outcome,
        MigrationOutcome::Applied {
            tables: vec!["tbl_a".to_string()],
            schema_version: version_before as i64 + 1,
        }
    );
    assert_eq!(migration.database.path(), Some(dest.as_path()));
    drop(migration);
    drop(db);

    // The copy is nullable, the source is untouched.
    assert!(not_null_flags(&dest, "tbl_a").iter().all(|(_, nn)| !nn));
    assert_eq!(not_null_flags(&src, "tbl_a")[0], ("col_integer".to_string(), true));
    assert_eq!(
        dbheader::read_header(&dest).unwrap().schema_cookie,
        version_before + 1
    );
    assert_eq!(dbheader::read_header(&src).unwrap().schema_cookie, version_before);
    assert_eq!(row_count(&dest, "tbl_a"), 1);
    assert_eq!(row_count(&dest, "tbl_b"), 1);
}

#[test]
fn test_update_columns_to_nullable_inplace() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    let version_before = dbheader::read_header(&src).unwrap().schema_cookie;

    let db = Database::open(&src).unwrap();
    let migration = update_columns_to_nullable(&db, &MigrateOptions::default()).unwrap();
    assert!(migration.outcome.is_applied());
    assert_eq!(migration.database.path(), Some(src.as_path()));
    drop(migration);
    drop(db);

    assert!(not_null_flags(&src, "tbl_a").iter().all(|(_, nn)| !nn));
    assert!(!sqlite_clean::migrate::default_dest_path(&src).exists());
    assert_eq!(
        dbheader::read_header(&src).unwrap().schema_cookie,
        version_before + 1
    );
    assert_eq!(row_count(&src, "tbl_a"), 1);

    // The rewritten schema still accepts NULLs and stays consistent.
    let conn = Connection::open(&src).unwrap();
    conn.execute("INSERT INTO tbl_a VALUES (NULL, NULL, NULL, NULL)", [])
        .unwrap();
    let check: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .unwrap();
    assert_eq!(check, "ok");
}

#[test]
fn test_update_columns_to_nullable_table_without_constraints() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    let version_before = dbheader::read_header(&src).unwrap().schema_cookie;

    let db = Database::open(&src).unwrap();
    let migration = update_columns_to_nullable(
        &db,
        &MigrateOptions {
            table_name: Some("tbl_b".to_string()),
            ..MigrateOptions::default()
        },
    )
    .unwrap();
    assert_eq!(migration.outcome, MigrationOutcome::NothingToRewrite);
    drop(migration);
    drop(db);

    assert_eq!(not_null_flags(&src, "tbl_a")[0].1, true);
    assert_eq!(dbheader::read_header(&src).unwrap().schema_cookie, version_before);
}

#[test]
fn test_normalizer_fails_on_not_null_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_testdb(&dir);
    Connection::open(&path)
        .unwrap()
        .execute("INSERT INTO tbl_a VALUES ('None', 'None', NULL, NULL)", [])
        .unwrap();

    let mut db = Database::open(&path).unwrap();
    let err = update_values_like_null_to_null(&mut db, &Scope::table("tbl_a"), &LikeNulls::default())
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");
    let nulls: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM tbl_a WHERE col_text IS NULL", [], |r| r.get(0))
        .unwrap();
    assert_eq!(nulls, 0);
}

#[test]
fn test_clean_like_nulls_without_findings_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    let version_before = dbheader::read_header(&src).unwrap().schema_cookie;

    let db = Database::open(&src).unwrap();
    let db = clean_like_nulls(db, &FixOptions::default()).unwrap();
    assert_eq!(db.path(), Some(src.as_path()));
    drop(db);

    assert_eq!(not_null_flags(&src, "tbl_a")[0].1, true);
    assert_eq!(dbheader::read_header(&src).unwrap().schema_cookie, version_before);
}

#[test]
fn test_clean_like_nulls_removes_constraint_and_nulls_values() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    Connection::open(&src)
        .unwrap()
        .execute("INSERT INTO tbl_a VALUES (2, 'None', NULL, NULL)", [])
        .unwrap();

    let db = Database::open(&src).unwrap();
    let db = clean_like_nulls(db, &FixOptions::default()).unwrap();
    assert!(!contains_str_like_null(&db, &Scope::all(), &LikeNulls::default()).unwrap());
    drop(db);

    let flags = not_null_flags(&src, "tbl_a");
    assert_eq!(flags[0], ("col_integer".to_string(), false));
    let conn = Connection::open(&src).unwrap();
    let text: Option<String> = conn
        .query_row("SELECT col_text FROM tbl_a WHERE col_integer = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(text, None);
    let sample: String = conn
        .query_row("SELECT col_text FROM tbl_a WHERE col_integer = 1", [], |r| r.get(0))
        .unwrap();
    assert_eq!(sample, "sample");
}

#[test]
fn test_clean_like_nulls_to_copy() {
    let dir = tempfile::tempdir().unwrap();
    let src = create_testdb(&dir);
    let dest = dir.path().join("fixed.sqlite");
    Connection::open(&src)
        .unwrap()
        .execute("INSERT INTO tbl_a VALUES (2, 'null', NULL, NULL)", [])
        .unwrap();

    let db = Database::open(&src).unwrap();
    let options = FixOptions {
        dest_path: Some(dest.clone()),
        inplace: false,
        ..FixOptions::default()
    };
    let db = clean_like_nulls(db, &options).unwrap();
    assert_eq!(db.path(), Some(dest.as_path()));
    drop(db);

    let source = Database::open(&src).unwrap();
    assert!(contains_str_like_null(&source, &Scope::all(), &LikeNulls::default()).unwrap());
    let fixed = Database::open(&dest).unwrap();
    assert!(!contains_str_like_null(&fixed, &Scope::all(), &LikeNulls::default()).unwrap());
    assert_eq!(not_null_flags(&dest, "tbl_a")[0].1, false);
}

#[test]
fn test_schema_version_moves_by_one_from_source() {
    for inplace in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let src = create_testdb_with_extra_table(&dir);
        let dest = dir.path().join("copy.sqlite");
        let version_before = dbheader::read_header(&src).unwrap().schema_cookie;
        assert_eq!(version_before, 3);

        let db = Database::open(&src).unwrap();
        let migration = update_columns_to_nullable(
            &db,
            &MigrateOptions {
                dest_path: Some(dest.clone()),
                table_name: None,
                inplace,
            },
        )
        .unwrap();
        assert_eq!(
            migration.outcome,
            MigrationOutcome::Applied {
                tables: vec!["tbl_a".to_string(), "tbl_c".to_string()],
                schema_version: 4,
            }
        );
        drop(migration);
        drop(db);

        if inplace {
            assert_eq!(dbheader::read_header(&src).unwrap().schema_cookie, 4);
            assert!(!dest.exists());
        } else {
            assert_eq!(dbheader::read_header(&dest).unwrap().schema_cookie, 4);
            assert_eq!(dbheader::read_header(&src).unwrap().schema_cookie, 3);
        }
    }
}

#[test]
fn test_migration_preserves_row_content() {
    for inplace in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let src = create_testdb_with_extra_table(&dir);
        Connection::open(&src)
            .unwrap()
            .execute(
                "INSERT INTO tbl_b VALUES (NULL, 'None', X'00FF', -2.25)",
                [],
            )
            .unwrap();
        let tables = ["tbl_a", "tbl_b", "tbl_c"];
        let before: Vec<Vec<Vec<Value>>> = tables.iter().map(|t| rows(&src, t)).collect();
        assert_eq!(before[0][0][2], Value::Blob(b"sample_blob".to_vec()));
        assert_eq!(before[0][0][3], Value::Real(0.5));

        let dest = dir.path().join("copy.sqlite");
        let db = Database::open(&src).unwrap();
        let migration = update_columns_to_nullable(
            &db,
            &MigrateOptions {
                dest_path: Some(dest.clone()),
                table_name: None,
                inplace,
            },
        )
        .unwrap();
        assert!(migration.outcome.is_applied());
        drop(migration);
        drop(db);

        let migrated = if inplace { &src } else { &dest };
        let after: Vec<Vec<Vec<Value>>> = tables.iter().map(|t| rows(migrated, t)).collect();
        assert_eq!(after, before, "inplace = {inplace}");
        if !inplace {
            let source_after: Vec<Vec<Vec<Value>>> = tables.iter().map(|t| rows(&src, t)).collect();
            assert_eq!(source_after, before);
        }
    }
}
