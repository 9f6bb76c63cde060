//! Maps declared column types to SQLite affinity groups.
//!
//! The declared type spellings follow the table at
//! https://www.sqlite.org/datatype3.html#affinity_name_examples .  Unlike SQLite itself we do not
//! fall back to the substring rules: a declared type that is not in the table is reported as an
//! error so that the caller can decide what to do about the column.

use std::collections::HashMap;
use std::str::FromStr;

use itertools::Itertools;

use crate::storage_class::StorageClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Declared type {declared_type:?} of column {table}.{column} has no known affinity.")]
    UnknownDeclaredType {
        table: String,
        column: String,
        declared_type: String,
    },
    #[error("Unable to parse affinity name: {0}.")]
    ParseAffinityError(String),
}

const AFFINITY_SPELLINGS: [(Affinity, &[&str]); 5] = [
    (
        Affinity::Integer,
        &[
            "INT",
            "INTEGER",
            "TINYINT",
            "SMALLINT",
            "MEDIUMINT",
            "BIGINT",
            "UNSIGNED BIG INT",
            "INT2",
            "INT8",
        ],
    ),
    (
        Affinity::Text,
        &[
            "CHARACTER",
            "VARCHAR",
            "VARYING CHARACTER",
            "NCHAR",
            "NATIVE CHARACTER",
            "NVARCHAR",
            "TEXT",
            "CLOB",
        ],
    ),
    // An empty declared type is the "no datatype specified" row of the reference table.
    (Affinity::Blob, &["BLOB", ""]),
    (
        Affinity::Real,
        &["REAL", "DOUBLE", "DOUBLE PRECISION", "FLOAT"],
    ),
    (
        Affinity::Numeric,
        &["NUMERIC", "DECIMAL", "BOOLEAN", "DATE", "DATETIME"],
    ),
];

lazy_static::lazy_static! {
    static ref AFFINITY_BY_SPELLING: HashMap<&'static str, Affinity> = {
        let mut m = HashMap::new();
        for (affinity, spellings) in AFFINITY_SPELLINGS.iter() {
            for s in spellings.iter() {
                m.insert(*s, *affinity);
            }
        }
        m
    };
}

impl Affinity {
    pub fn name(&self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Text => "TEXT",
            Affinity::Blob => "BLOB",
            Affinity::Real => "REAL",
            Affinity::Numeric => "NUMERIC",
        }
    }

    /// Declared type spellings that select this affinity.
    pub fn spellings(&self) -> &'static [&'static str] {
        AFFINITY_SPELLINGS
            .iter()
            .find(|(a, _)| a == self)
            .map(|(_, s)| *s)
            .unwrap_or(&[])
    }

    /// Storage classes a value may have in a column of this affinity without being a conflict.
    /// `NULL` is acceptable everywhere.
    pub fn storage_classes(&self) -> &'static [StorageClass] {
        use StorageClass::*;
        match self {
            Affinity::Integer => &[Integer, Null],
            Affinity::Text => &[Text, Null],
            Affinity::Blob => &[Blob, Null],
            Affinity::Real => &[Real, Null],
            Affinity::Numeric => &[Integer, Real, Null],
        }
    }

    /// Look up the affinity for a declared column type.
    ///
    /// The type is upper-cased, a parenthesised size such as `(255)` or `(10, 5)` is dropped and
    /// runs of whitespace are collapsed before the lookup.
    pub fn from_declared_type(declared_type: &str) -> Option<Affinity> {
        AFFINITY_BY_SPELLING
            .get(normalize_declared_type(declared_type).as_str())
            .copied()
    }

    /// Like `from_declared_type`, but names the column in the error.
    pub fn for_column(table: &str, column: &str, declared_type: &str) -> Result<Affinity, Error> {
        Affinity::from_declared_type(declared_type).ok_or_else(|| Error::UnknownDeclaredType {
            table: table.to_string(),
            column: column.to_string(),
            declared_type: declared_type.to_string(),
        })
    }
}

impl std::fmt::Display for Affinity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.name().fmt(f)
    }
}

impl FromStr for Affinity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INTEGER" => Ok(Affinity::Integer),
            "TEXT" => Ok(Affinity::Text),
            "BLOB" => Ok(Affinity::Blob),
            "REAL" => Ok(Affinity::Real),
            "NUMERIC" => Ok(Affinity::Numeric),
            x => Err(Error::ParseAffinityError(String::from(x))),
        }
    }
}

fn normalize_declared_type(declared_type: &str) -> String {
    let without_size = match declared_type.find('(') {
        Some(i) => &declared_type[..i],
        None => declared_type,
    };
    without_size
        .split_whitespace()
        .map(|w| w.to_uppercase())
        .join(" ")
}

#[test]
fn test_from_declared_type() {
    let cases = vec![
        ("INTEGER", Some(Affinity::Integer)),
        ("int", Some(Affinity::Integer)),
        ("unsigned   big int", Some(Affinity::Integer)),
        ("VARCHAR(255)", Some(Affinity::Text)),
        ("NATIVE CHARACTER (70)", Some(Affinity::Text)),
        ("decimal(10, 5)", Some(Affinity::Numeric)),
        ("DOUBLE PRECISION", Some(Affinity::Real)),
        ("", Some(Affinity::Blob)),
        ("BLOB", Some(Affinity::Blob)),
        ("STRING", None),
        ("JSON", None),
    ];
    for (declared, expected) in cases {
        assert_eq!(Affinity::from_declared_type(declared), expected, "{declared}");
    }
}

#[test]
fn test_every_spelling_maps_to_exactly_one_affinity() {
    let total: usize = AFFINITY_SPELLINGS.iter().map(|(_, s)| s.len()).sum();
    assert_eq!(AFFINITY_BY_SPELLING.len(), total);
    for (affinity, spellings) in AFFINITY_SPELLINGS.iter() {
        assert_eq!(affinity.spellings(), *spellings);
        for s in spellings.iter() {
            assert_eq!(Affinity::from_declared_type(s), Some(*affinity));
        }
    }
}

#[test]
fn test_for_column_reports_unknown_type() {
    let err = Affinity::for_column("t", "c", "GEOMETRY").unwrap_err();
    assert_eq!(
        err,
        Error::UnknownDeclaredType {
            table: "t".to_string(),
            column: "c".to_string(),
            declared_type: "GEOMETRY".to_string(),
        }
    );
}

#[test]
fn test_null_is_never_a_conflict() {
    for a in ["INTEGER", "TEXT", "BLOB", "REAL", "NUMERIC"] {
        let a = Affinity::from_str(a).unwrap();
        assert!(a.storage_classes().contains(&StorageClass::Null));
    }
}
