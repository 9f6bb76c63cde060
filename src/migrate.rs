//! Makes `NOT NULL` columns nullable by rewriting the stored table schema.
//!
//! SQLite has no `ALTER TABLE ... DROP NOT NULL`.  Instead, following
//! https://www.sqlite.org/lang_altertable.html#otheralter , the `CREATE TABLE` text in the schema
//! table is edited directly inside a transaction with `writable_schema` enabled, the schema version
//! is bumped so every connection reparses the schema, and `PRAGMA integrity_check` must pass before
//! the transaction commits.
//!
//! All of this happens on a copy made with the SQLite online backup API.  The source database is
//! only written to at the very end, by copying the updated file back, and only when the update
//! committed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::schema_text::strip_not_null;
use crate::{Error, Result, SCHEMA_TABLE_NAME};

/// Appended to the source path to name the working copy when no destination is given.
pub const DEST_SUFFIX: &str = "_column_update";

const BACKUP_PAGES_PER_STEP: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Where the updated copy is written.  Defaults to the source path plus `DEST_SUFFIX`.
    pub dest_path: Option<PathBuf>,
    /// Only update this table (case-insensitive).  All tables when `None`.
    pub table_name: Option<String>,
    /// Copy the result back over the source and remove the working copy.
    pub inplace: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        MigrateOptions {
            dest_path: None,
            table_name: None,
            inplace: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The schema text of `tables` was rewritten and the schema version is now `schema_version`.
    Applied {
        tables: Vec<String>,
        schema_version: i64,
    },
    /// No table in scope declared a `NOT NULL` constraint.
    NothingToRewrite,
    /// The update failed and was rolled back.  Nothing changed.
    RolledBack { reason: String },
}

impl MigrationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MigrationOutcome::Applied { .. })
    }
}

#[derive(Debug)]
pub struct Migration {
    /// The database after the update: the source path when in place, else the destination path.
    pub database: Database,
    pub outcome: MigrationOutcome,
}

/// Update database columns to nullable, for all tables or for `options.table_name` only.
///
/// Errors from SQLite during the schema transaction, including a failed integrity check, are
/// logged and rolled back, and reported as `MigrationOutcome::RolledBack`.  Errors before or
/// after the transaction (opening files, copying, an unparseable schema) are returned.
pub fn update_columns_to_nullable(db: &Database, options: &MigrateOptions) -> Result<Migration> {
    info!("Updating database columns to nullable for provided database.");

    let src_path = db.path().ok_or(Error::NoBackingFile)?.to_path_buf();
    let dest_path = match &options.dest_path {
        Some(p) => p.clone(),
        None => default_dest_path(&src_path),
    };
    if same_file(&src_path, &dest_path) {
        return Err(Error::DestinationIsSource(dest_path));
    }

    // Declared before the connections so it is dropped after they close.
    let working_file = WorkingFile::new(&dest_path, options.inplace);
    let mut source = Connection::open(&src_path)?;
    let mut dest = Connection::open(&dest_path)?;
    // The backup sets the copy's schema version from the copy's own previous value, so the base
    // version is read from the source.
    let schema_version: i64 = source.query_row("PRAGMA schema_version", [], |r| r.get(0))?;
    copy_database(&source, &mut dest)?;

    let rewrites = table_rewrites(&dest, options.table_name.as_deref())?;

    let outcome = if rewrites.is_empty() {
        info!("No NOT NULL constraints found, schema left as is.");
        MigrationOutcome::NothingToRewrite
    } else {
        apply_schema_rewrites(&mut dest, &rewrites, schema_version)?
    };

    if options.inplace {
        if outcome.is_applied() {
            copy_database(&dest, &mut source)?;
        }
        close(source)?;
        close(dest)?;
        working_file.remove()?;
        return Ok(Migration {
            database: Database::open(&src_path)?,
            outcome,
        });
    }

    close(source)?;
    close(dest)?;
    Ok(Migration {
        database: Database::open(&dest_path)?,
        outcome,
    })
}

/// The working copy of an in-place update.  Removed when dropped, so an early error return does
/// not leave it behind.  A copy written to a caller-chosen destination is never removed.
struct WorkingFile {
    path: PathBuf,
    remove_on_drop: bool,
}

impl WorkingFile {
    fn new(path: &Path, remove_on_drop: bool) -> Self {
        WorkingFile {
            path: path.to_path_buf(),
            remove_on_drop,
        }
    }

    fn remove(mut self) -> std::io::Result<()> {
        self.remove_on_drop = false;
        std::fs::remove_file(&self.path)
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        if !self.remove_on_drop {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove working copy.");
            }
        }
    }
}

pub fn default_dest_path(src_path: &Path) -> PathBuf {
    let mut p: OsString = src_path.as_os_str().to_os_string();
    p.push(DEST_SUFFIX);
    PathBuf::from(p)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn close(conn: Connection) -> Result<()> {
    conn.close().map_err(|(_, e)| Error::Sqlite(e))
}

/// Copy every page of `from` into `to`, replacing what `to` held.
fn copy_database(from: &Connection, to: &mut Connection) -> Result<()> {
    let backup = Backup::new(from, to)?;
    backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
    Ok(())
}

/// Read the `CREATE TABLE` text of the tables in scope, and return (name, new text) for every
/// table whose text changes when `NOT NULL` constraints are removed.
fn table_rewrites(conn: &Connection, table_name: Option<&str>) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT name, sql FROM {} WHERE type = 'table' AND (?1 IS NULL OR UPPER(name) = UPPER(?1)) ORDER BY name",
        SCHEMA_TABLE_NAME
    ))?;
    let rows = stmt.query_map([table_name], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
    })?;

    let mut rewrites = vec![];
    for row in rows {
        let (name, sql) = row?;
        let Some(sql) = sql else { continue };
        let stripped = strip_not_null(&sql)?;
        if stripped != sql {
            debug!(table = %name, sql = %stripped, "Prepared table schema without NOT NULL constraints.");
            rewrites.push((name, stripped));
        }
    }
    Ok(rewrites)
}

/// Write `rewrites` into the schema table of `conn` as one transaction and bump the schema version
/// from `schema_version`.  Rolls back when anything fails, including the integrity check.
pub(crate) fn apply_schema_rewrites(
    conn: &mut Connection,
    rewrites: &[(String, String)],
    schema_version: i64,
) -> Result<MigrationOutcome> {
    let tx = conn.transaction()?;
    match write_schema(&tx, rewrites, schema_version) {
        Ok(()) => {
            tx.commit()?;
            let tables: Vec<String> = rewrites.iter().map(|(name, _)| name.clone()).collect();
            info!(?tables, schema_version = schema_version + 1, "Updated table schemas to allow NULL values.");
            Ok(MigrationOutcome::Applied {
                tables,
                schema_version: schema_version + 1,
            })
        }
        Err(e) => {
            error!(error = %e, "Schema update failed, rolling back.");
            tx.rollback()?;
            Ok(MigrationOutcome::RolledBack {
                reason: e.to_string(),
            })
        }
    }
}

fn write_schema(tx: &Transaction, rewrites: &[(String, String)], schema_version: i64) -> Result<()> {
    tx.execute_batch("PRAGMA writable_schema = ON")?;
    let update = format!(
        "UPDATE {} SET sql = ?1 WHERE type = 'table' AND UPPER(name) = UPPER(?2)",
        SCHEMA_TABLE_NAME
    );
    for (name, sql) in rewrites {
        tx.execute(&update, params![sql, name])?;
    }
    // Changing the version makes every connection reparse the schema.
    tx.pragma_update(None, "schema_version", schema_version + 1)?;
    tx.execute_batch("PRAGMA writable_schema = OFF")?;

    let check: String = tx.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
    if check != "ok" {
        return Err(Error::IntegrityCheckFailed(check));
    }
    Ok(())
}

#[cfg(test)]
fn schema_sql(path: &Path, table: &str) -> String {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get(0),
    )
    .unwrap()
}

#[test]
fn test_default_dest_path() {
    assert_eq!(
        default_dest_path(Path::new("/tmp/data.sqlite")),
        PathBuf::from("/tmp/data.sqlite_column_update")
    );
}

#[test]
fn test_in_memory_database_is_rejected() {
    let db = Database::open(":memory:").unwrap();
    let err = update_columns_to_nullable(&db, &MigrateOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoBackingFile));
}

#[test]
fn test_destination_must_differ_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("same.sqlite");
    let db = Database::open(&path).unwrap();
    db.connection()
        .execute_batch("CREATE TABLE t (a INT NOT NULL)")
        .unwrap();
    let options = MigrateOptions {
        dest_path: Some(path.clone()),
        ..MigrateOptions::default()
    };
    let err = update_columns_to_nullable(&db, &options).unwrap_err();
    assert!(matches!(err, Error::DestinationIsSource(_)));
    assert_eq!(schema_sql(&path, "t"), "CREATE TABLE t (a INT NOT NULL)");
}

#[test]
fn test_apply_schema_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apply.sqlite");
    let mut conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE t (a INT NOT NULL, b TEXT); INSERT INTO t VALUES (1, 'x');",
    )
    .unwrap();
    let version: i64 = conn
        .query_row("PRAGMA schema_version", [], |r| r.get(0))
        .unwrap();
    let rewrites = table_rewrites(&conn, Some("T")).unwrap();
    assert_eq!(
        rewrites,
        vec![("t".to_string(), "CREATE TABLE t (a INT, b TEXT)".to_string())]
    );

    let outcome = apply_schema_rewrites(&mut conn, &rewrites, version).unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Applied {
            tables: vec!["t".to_string()],
            schema_version: version + 1
        }
    );
    conn.execute("INSERT INTO t VALUES (NULL, 'y')", []).unwrap();
    drop(conn);
    assert_eq!(schema_sql(&path, "t"), "CREATE TABLE t (a INT, b TEXT)");
}

#[test]
fn test_broken_rewrite_is_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rollback.sqlite");
    let mut conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE t (a INT NOT NULL); INSERT INTO t VALUES (1);")
        .unwrap();
    let version: i64 = conn
        .query_row("PRAGMA schema_version", [], |r| r.get(0))
        .unwrap();

    let broken = vec![("t".to_string(), "CREATE TABLE t (a INT NOT".to_string())];
    let outcome = apply_schema_rewrites(&mut conn, &broken, version).unwrap();
    assert!(matches!(outcome, MigrationOutcome::RolledBack { .. }));
    drop(conn);

    assert_eq!(schema_sql(&path, "t"), "CREATE TABLE t (a INT NOT NULL)");
    let conn = Connection::open(&path).unwrap();
    let after: i64 = conn
        .query_row("PRAGMA schema_version", [], |r| r.get(0))
        .unwrap();
    assert_eq!(after, version);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_working_file_removed_on_drop_only_when_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let working = dir.path().join("db.sqlite_column_update");
    let kept = dir.path().join("copy.sqlite");
    std::fs::write(&working, b"x").unwrap();
    std::fs::write(&kept, b"x").unwrap();

    drop(WorkingFile::new(&working, true));
    drop(WorkingFile::new(&kept, false));
    assert!(!working.exists());
    assert!(kept.exists());

    // Dropping after the file is already gone is quiet.
    drop(WorkingFile::new(&working, true));
}

#[test]
fn test_copy_keeps_source_schema_version_base() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("versioned.sqlite");
    let conn = Connection::open(&src).unwrap();
    conn.execute_batch(
        "CREATE TABLE a (x INT NOT NULL);
         CREATE TABLE b (y INT);
         CREATE TABLE c (z INT);
         CREATE TABLE d (w INT);",
    )
    .unwrap();
    let version: i64 = conn
        .query_row("PRAGMA schema_version", [], |r| r.get(0))
        .unwrap();
    drop(conn);
    assert_eq!(version, 4);

    let dest = dir.path().join("versioned_copy.sqlite");
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
            tables: vec!["a".to_string()],
            schema_version: version + 1,
        }
    );
    assert_eq!(migration.database.schema_version().unwrap(), version + 1);
    assert_eq!(db.schema_version().unwrap(), version);
}
