//! The set of strings which are treated as meaning "no value".

use std::str::FromStr;

use itertools::Itertools;

/// Strings which may represent null values.
pub const LIKE_NULLS: [&str; 3] = ["null", "none", "nan"];

/// An ordered set of lower-cased, case-insensitive tokens.
///
/// Both the null-like detector and the normalizer compare `LOWER(value)` against these tokens, so
/// they are lower-cased on construction.  Duplicates are dropped, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeNulls {
    tokens: Vec<String>,
}

impl LikeNulls {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LikeNulls {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .unique()
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn matches(&self, value: &str) -> bool {
        let lowered = value.to_lowercase();
        self.tokens.iter().any(|t| *t == lowered)
    }

    /// `?, ?, ?` with one placeholder per token, for use in an SQL `IN (...)` list.
    pub(crate) fn placeholders(&self) -> String {
        self.tokens.iter().map(|_| "?").join(", ")
    }
}

impl Default for LikeNulls {
    fn default() -> Self {
        LikeNulls::new(LIKE_NULLS)
    }
}

impl std::fmt::Display for LikeNulls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.tokens.join(",").fmt(f)
    }
}

impl FromStr for LikeNulls {
    type Err = std::convert::Infallible;

    /// Parses a comma separated list.  Surrounding whitespace and empty items are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LikeNulls::new(
            s.split(',').map(str::trim).filter(|t| !t.is_empty()),
        ))
    }
}

#[test]
fn test_default_tokens() {
    let ln = LikeNulls::default();
    assert_eq!(ln.tokens(), &["null", "none", "nan"]);
    assert_eq!(ln.placeholders(), "?, ?, ?");
    assert_eq!(ln.to_string(), "null,none,nan");
}

#[test]
fn test_lowercases_and_dedups_in_order() {
    let ln = LikeNulls::new(["NaN", "n/a", "nan", "NULL"]);
    assert_eq!(ln.tokens(), &["nan", "n/a", "null"]);
    assert!(ln.matches("N/A"));
    assert!(ln.matches("Null"));
    assert!(!ln.matches("none"));
}

#[test]
fn test_parse_comma_separated() {
    let ln: LikeNulls = " null, None,,nan ".parse().unwrap();
    assert_eq!(ln, LikeNulls::default());
    let empty: LikeNulls = "".parse().unwrap();
    assert!(empty.is_empty());
}
