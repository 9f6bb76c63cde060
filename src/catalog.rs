//! The catalog of lint and fix operations this crate provides, keyed by a stable id.
//!
//! The binary runs every registered lint for `lint` and every registered fix for `fix`.

use std::collections::HashSet;

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::columns::Scope;
use crate::database::Database;
use crate::fix::{clean_like_nulls, FixOptions};
use crate::like_nulls::LikeNulls;
use crate::lint::{contains_conflicting_aff_storage_class, contains_str_like_null};
use crate::{Error, Result};

pub type LintFn = fn(&Database, &Scope, &LikeNulls) -> Result<bool>;
pub type FixFn = fn(Database, &FixOptions) -> Result<Database>;

#[derive(Clone, Copy, EnumAsInner)]
pub enum Operation {
    Lint(LintFn),
    Fix(FixFn),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Lint,
    Fix,
}

pub struct CatalogEntry {
    pub id: &'static str,
    pub description: &'static str,
    /// Name of the library function behind the operation.
    pub function: &'static str,
    pub operation: Operation,
}

impl CatalogEntry {
    pub fn kind(&self) -> Kind {
        match self.operation {
            Operation::Lint(_) => Kind::Lint,
            Operation::Fix(_) => Kind::Fix,
        }
    }
}

fn lint_conflicting_storage_class(db: &Database, scope: &Scope, _: &LikeNulls) -> Result<bool> {
    contains_conflicting_aff_storage_class(db, scope)
}

pub static CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "L0001",
        description: "Contains conflicting column affinity type vs column data storage class. \
                      See https://www.sqlite.org/datatype3.html for more information.",
        function: "contains_conflicting_aff_storage_class",
        operation: Operation::Lint(lint_conflicting_storage_class),
    },
    CatalogEntry {
        id: "L0002",
        description: "Contains string data storage class values which appear to be null-like values. \
                      Consider using SQLite NULL values instead.",
        function: "contains_str_like_null",
        operation: Operation::Lint(contains_str_like_null),
    },
    CatalogEntry {
        id: "F0001",
        description: "Updated string values which appeared to be null-like values to SQLite NULL values, \
                      removing NOT NULL column constraints where necessary.",
        function: "clean_like_nulls",
        operation: Operation::Fix(clean_like_nulls),
    },
];

/// Check that no id is registered twice.
pub fn validate() -> Result<()> {
    let mut seen = HashSet::new();
    for entry in CATALOG.iter() {
        if !seen.insert(entry.id) {
            return Err(Error::DuplicateCatalogId(entry.id));
        }
    }
    Ok(())
}

pub fn find(id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.id == id)
}

pub fn lints() -> impl Iterator<Item = (&'static CatalogEntry, LintFn)> {
    CATALOG
        .iter()
        .filter_map(|e| e.operation.as_lint().map(|f| (e, *f)))
}

pub fn fixes() -> impl Iterator<Item = (&'static CatalogEntry, FixFn)> {
    CATALOG
        .iter()
        .filter_map(|e| e.operation.as_fix().map(|f| (e, *f)))
}

#[derive(Debug, Serialize)]
pub struct EntryListing {
    pub id: &'static str,
    pub desc: &'static str,
    #[serde(rename = "ref")]
    pub function: &'static str,
}

/// The catalog grouped by kind, shaped as `{"lint": [...], "fix": [...]}` when serialized.
#[derive(Debug, Serialize)]
pub struct CatalogListing {
    pub lint: Vec<EntryListing>,
    pub fix: Vec<EntryListing>,
}

pub fn listing() -> CatalogListing {
    let entry_listing = |e: &'static CatalogEntry| EntryListing {
        id: e.id,
        desc: e.description,
        function: e.function,
    };
    CatalogListing {
        lint: lints().map(|(e, _)| entry_listing(e)).collect(),
        fix: fixes().map(|(e, _)| entry_listing(e)).collect(),
    }
}

#[test]
fn test_catalog_ids_are_unique() {
    assert!(validate().is_ok());
    let ids: HashSet<&str> = CATALOG.iter().map(|e| e.id).collect();
    assert_eq!(ids.len(), CATALOG.len());
}

#[test]
fn test_catalog_kinds_match_id_prefix() {
    for entry in CATALOG.iter() {
        let expected = match entry.kind() {
            Kind::Lint => "L",
            Kind::Fix => "F",
        };
        assert!(entry.id.starts_with(expected), "{}", entry.id);
    }
    assert_eq!(lints().count(), 2);
    assert_eq!(fixes().count(), 1);
    assert_eq!(find("F0001").map(|e| e.function), Some("clean_like_nulls"));
    assert!(find("X9999").is_none());
}

#[test]
fn test_listing_json_shape() {
    let v = serde_json::to_value(listing()).unwrap();
    for kind in ["lint", "fix"] {
        let entries = v[kind].as_array().unwrap();
        assert!(!entries.is_empty());
        for e in entries {
            for key in ["id", "desc", "ref"] {
                assert!(e[key].is_string(), "{kind} entry missing {key}: {e}");
            }
        }
    }
}

#[test]
fn test_registered_lints_run() {
    let db = Database::open(":memory:").unwrap();
    for (entry, lint) in lints() {
        assert!(!lint(&db, &Scope::all(), &LikeNulls::default()).unwrap(), "{}", entry.id);
    }
}
