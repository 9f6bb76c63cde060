//! `sqlite_clean` lints and fixes SQLite database files.
//!
//! Two kinds of data problem are handled:
//!   - values whose runtime storage class does not fit the column's declared affinity
//!     (e.g. the text `'nan'` stored in an `INTEGER` column), and
//!   - text values that are "null-like" (`'null'`, `'None'`, `'NaN'`, ...) instead of real SQL `NULL`s.
//!
//! Lints are read-only predicates.  The fix rewrites null-like text to `NULL`, first removing
//! `NOT NULL` constraints from the stored table schema where that is needed.
//! See https://www.sqlite.org/datatype3.html for affinity vs. storage class.

pub mod affinity;
pub mod catalog;
pub mod columns;
pub mod database;
pub mod dbheader;
pub mod fix;
pub mod like_nulls;
pub mod lint;
pub mod logging;
pub mod migrate;
pub mod schema_text;
pub mod storage_class;

extern crate pest;
#[macro_use]
extern crate pest_derive;

pub use columns::{collect_columns, ColumnDescriptor, Scope};
pub use database::Database;
pub use fix::{clean_like_nulls, update_values_like_null_to_null, FixOptions};
pub use like_nulls::LikeNulls;
pub use lint::{contains_conflicting_aff_storage_class, contains_str_like_null};
pub use migrate::{update_columns_to_nullable, MigrateOptions, Migration, MigrationOutcome};

// The schema table is also reachable as `sqlite_schema` on newer SQLite versions.
// `sqlite_master` works on all of them.
const SCHEMA_TABLE_NAME: &str = "sqlite_master";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Error accessing database file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Affinity(#[from] affinity::Error),
    #[error(transparent)]
    SchemaText(#[from] schema_text::Error),
    #[error(transparent)]
    Header(#[from] dbheader::Error),
    #[error("The database is not backed by a file, so it cannot be copied for a schema update.")]
    NoBackingFile,
    #[error("The working copy path {0:?} is the database itself.")]
    DestinationIsSource(std::path::PathBuf),
    #[error("Integrity check failed after schema update: {0}")]
    IntegrityCheckFailed(String),
    #[error("Schema update to remove NOT NULL constraints was rolled back: {0}")]
    MigrationRolledBack(String),
    #[error("Catalog id {0} is registered more than once.")]
    DuplicateCatalogId(&'static str),
}

impl Error {
    /// true when the error is SQLite refusing a write because of a constraint, such as
    /// writing `NULL` into a column that is still `NOT NULL`.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Quote `name` as an SQL identifier so it can be spliced into a statement.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[test]
fn test_quote_identifier() {
    assert_eq!(quote_identifier("tbl_a"), "\"tbl_a\"");
    assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    assert_eq!(quote_identifier("with space"), "\"with space\"");
}
