//! Defines `Database`, a handle on one SQLite database.
//!
//! A `Database` is opened at the start of an operation and dropped at the end of it.  Dropping it
//! closes the underlying connection.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::Result;

pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database file at `path`.  `":memory:"` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Ok(Database {
            conn,
            path: file_path(path),
        })
    }

    /// Adopt a connection someone else already opened.
    pub fn from_connection(conn: Connection) -> Self {
        let path = conn.path().and_then(|p| file_path(Path::new(p)));
        Database { conn, path }
    }

    /// The file backing this database, or `None` for in-memory and temporary databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// The schema version counter (`PRAGMA schema_version`), which SQLite bumps on every schema change.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("PRAGMA schema_version", [], |r| r.get(0))?)
    }
}

fn file_path(path: &Path) -> Option<PathBuf> {
    match path.to_str() {
        Some("") | Some(":memory:") => None,
        _ => Some(path.to_path_buf()),
    }
}

#[test]
fn test_in_memory_database_has_no_path() {
    let db = Database::open(":memory:").unwrap();
    assert!(db.path().is_none());
    assert_eq!(db.schema_version().unwrap(), 0);
    let adopted = Database::from_connection(Connection::open_in_memory().unwrap());
    assert!(adopted.path().is_none());
}

#[test]
fn test_adopted_connection_keeps_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("adopt.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE t (a INTEGER)").unwrap();
    let db = Database::from_connection(conn);
    let adopted = db.path().expect("file-backed connection should keep its path");
    assert_eq!(adopted.file_name(), path.file_name());
    assert_eq!(db.schema_version().unwrap(), 1);
}
