//! Defines an enum of the SQLite storage classes and routines for conversion to and from string.
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// These are the storage classes that a stored SQLite value can have.
/// They correspond to the possible return values of `typeof()` in sqlite3.
/// Notes:
///   - The storage class belongs to one value, not to a column.  A column with `INTEGER` affinity
///     may hold a `Text` value when the text could not be converted.
///   - In sqlite, `typeof(true)` is `integer`.
pub enum StorageClass {
    Integer,
    Text,
    Blob,
    Real,
    Null,
}

impl StorageClass {
    /// The string `typeof()` returns for values of this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Integer => "integer",
            StorageClass::Text => "text",
            StorageClass::Blob => "blob",
            StorageClass::Real => "real",
            StorageClass::Null => "null",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Unable to parse storage class from typeof() result: {0}.")]
    ParseStorageClassError(String),
}

impl FromStr for StorageClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(StorageClass::Integer),
            "text" => Ok(StorageClass::Text),
            "blob" => Ok(StorageClass::Blob),
            "real" => Ok(StorageClass::Real),
            "null" => Ok(StorageClass::Null),
            x => Err(Error::ParseStorageClassError(String::from(x))),
        }
    }
}

#[test]
fn test_storage_class_string_round_trip() {
    for sc in [
        StorageClass::Integer,
        StorageClass::Text,
        StorageClass::Blob,
        StorageClass::Real,
        StorageClass::Null,
    ] {
        assert_eq!(StorageClass::from_str(&sc.to_string()), Ok(sc));
    }
    assert_eq!(StorageClass::from_str("TEXT"), Ok(StorageClass::Text));
    assert!(StorageClass::from_str("int").is_err());
}
