//! Reads column descriptions from the schema table.

use crate::database::Database;
use crate::Result;

/// Narrows an operation to one table, or to one column of one table.
/// Names match case-insensitively, as SQLite identifiers do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
}

impl Scope {
    pub fn all() -> Self {
        Scope::default()
    }

    pub fn table(table_name: &str) -> Self {
        Scope {
            table_name: Some(table_name.to_string()),
            column_name: None,
        }
    }

    pub fn column(table_name: &str, column_name: &str) -> Self {
        Scope {
            table_name: Some(table_name.to_string()),
            column_name: Some(column_name.to_string()),
        }
    }
}

/// A snapshot of one column's definition, as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub table_name: String,
    pub column_name: String,
    pub declared_type: String,
    pub not_null: bool,
}

const COLLECT_COLUMNS_SQL: &str = r#"
    SELECT m.name, p.name, p.type, p."notnull"
    FROM sqlite_master AS m
    JOIN pragma_table_info(m.name) AS p
    WHERE m.type = 'table'
      AND m.name NOT LIKE 'sqlite\_%' ESCAPE '\'
      AND (?1 IS NULL OR UPPER(m.name) = UPPER(?1))
      AND (?2 IS NULL OR UPPER(p.name) = UPPER(?2))
    ORDER BY m.name, p.cid
"#;

/// Collect the columns of every user table in `db`, narrowed by `scope`.
/// Internal `sqlite_` tables are never included.
pub fn collect_columns(db: &Database, scope: &Scope) -> Result<Vec<ColumnDescriptor>> {
    let mut stmt = db.connection().prepare(COLLECT_COLUMNS_SQL)?;
    let rows = stmt.query_map(
        rusqlite::params![scope.table_name, scope.column_name],
        |r| {
            Ok(ColumnDescriptor {
                table_name: r.get(0)?,
                column_name: r.get(1)?,
                declared_type: r.get(2)?,
                not_null: r.get::<_, i64>(3)? != 0,
            })
        },
    )?;

    let mut columns = Vec::new();
    for col in rows {
        columns.push(col?);
    }
    Ok(columns)
}

#[test]
fn test_collect_columns() {
    let db = Database::open(":memory:").unwrap();
    db.connection()
        .execute_batch(
            "CREATE TABLE tbl_a (col_integer INTEGER NOT NULL, col_text TEXT);
             CREATE TABLE tbl_b (x VARCHAR(10));
             CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT);",
        )
        .unwrap();

    let all = collect_columns(&db, &Scope::all()).unwrap();
    let names: Vec<(&str, &str)> = all
        .iter()
        .map(|c| (c.table_name.as_str(), c.column_name.as_str()))
        .collect();
    // sqlite_sequence exists now, but is internal.
    assert_eq!(
        names,
        vec![
            ("seq", "id"),
            ("tbl_a", "col_integer"),
            ("tbl_a", "col_text"),
            ("tbl_b", "x"),
        ]
    );

    let one = collect_columns(&db, &Scope::column("TBL_A", "Col_Integer")).unwrap();
    assert_eq!(
        one,
        vec![ColumnDescriptor {
            table_name: "tbl_a".to_string(),
            column_name: "col_integer".to_string(),
            declared_type: "INTEGER".to_string(),
            not_null: true,
        }]
    );

    let b = collect_columns(&db, &Scope::table("tbl_b")).unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].declared_type, "VARCHAR(10)");
    assert!(!b[0].not_null);

    assert!(collect_columns(&db, &Scope::table("missing")).unwrap().is_empty());
}

#[test]
fn test_collect_columns_on_empty_database() {
    let db = Database::open(":memory:").unwrap();
    assert!(collect_columns(&db, &Scope::all()).unwrap().is_empty());
}
