//! `schema_text` tokenizes the SQL text of `CREATE TABLE` statements stored in the schema table,
//! and rewrites that text to drop `NOT NULL` column constraints.
//!
//! The rewrite works on tokens rather than on raw text, so `NOT NULL` inside string literals,
//! quoted identifiers, comments and parenthesised expressions (`CHECK (a IS NOT NULL)`,
//! generated columns) is left alone.

use pest::Parser;

#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SqlLexer;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to tokenize schema text: {0}")]
    Parse(Box<pest::error::Error<Rule>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Space,
    Comment,
    StringLiteral,
    QuotedIdentifier,
    Word,
    Number,
    LParen,
    RParen,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    fn is_significant(&self) -> bool {
        !matches!(self.kind, TokenKind::Space | TokenKind::Comment)
    }

    fn is_word(&self, w: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(w)
    }

    fn is_name(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Word | TokenKind::QuotedIdentifier | TokenKind::StringLiteral
        )
    }
}

/// Split `sql` into tokens.  Concatenating the token texts gives back `sql`.
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, Error> {
    let pairs = SqlLexer::parse(Rule::statement, sql).map_err(|e| Error::Parse(Box::new(e)))?;
    let mut tokens = vec![];
    for statement in pairs {
        for pair in statement.into_inner() {
            let kind = match pair.as_rule() {
                Rule::space => TokenKind::Space,
                Rule::line_comment | Rule::block_comment => TokenKind::Comment,
                Rule::string_literal => TokenKind::StringLiteral,
                Rule::quoted_identifier => TokenKind::QuotedIdentifier,
                Rule::word => TokenKind::Word,
                Rule::number => TokenKind::Number,
                Rule::lparen => TokenKind::LParen,
                Rule::rparen => TokenKind::RParen,
                Rule::punct => TokenKind::Punct,
                Rule::EOI => continue,
                rule => unreachable!("tokenize expected a token, found {:?}", rule),
            };
            let span = pair.as_span();
            tokens.push(Token {
                kind,
                text: span.as_str(),
                start: span.start(),
                end: span.end(),
            });
        }
    }
    Ok(tokens)
}

/// Find `NOT NULL` column constraints.  Returns (first, last) token indexes, inclusive.
///
/// A constraint is `NOT NULL` at parenthesis depth 1, i.e. directly in the column definition list,
/// together with a leading `CONSTRAINT name` and a trailing `ON CONFLICT resolution` when present.
fn not_null_constraints(tokens: &[Token]) -> Vec<(usize, usize)> {
    // (token index, paren depth) of every significant token.
    let mut sig: Vec<(usize, usize)> = vec![];
    let mut depth = 0_usize;
    for (i, t) in tokens.iter().enumerate() {
        if !t.is_significant() {
            continue;
        }
        if t.kind == TokenKind::RParen {
            depth = depth.saturating_sub(1);
        }
        sig.push((i, depth));
        if t.kind == TokenKind::LParen {
            depth += 1;
        }
    }

    let at = |k: usize, w: &str| -> bool {
        k < sig.len() && sig[k].1 == 1 && tokens[sig[k].0].is_word(w)
    };

    let mut found = vec![];
    let mut k = 0;
    while k < sig.len() {
        if !(at(k, "NOT") && at(k + 1, "NULL")) {
            k += 1;
            continue;
        }
        let mut first = k;
        if k >= 2 && at(k - 2, "CONSTRAINT") && tokens[sig[k - 1].0].is_name() {
            first = k - 2;
        }
        let mut last = k + 1;
        if at(k + 2, "ON") && at(k + 3, "CONFLICT") && k + 4 < sig.len() && sig[k + 4].1 == 1
            && tokens[sig[k + 4].0].kind == TokenKind::Word
        {
            last = k + 4;
        }
        found.push((sig[first].0, sig[last].0));
        k = last + 1;
    }
    found
}

/// Remove every `NOT NULL` column constraint from a `CREATE TABLE` statement.
///
/// The whitespace directly in front of a removed constraint goes with it, so
/// `a INTEGER NOT NULL, b TEXT` becomes `a INTEGER, b TEXT`.
pub fn strip_not_null(sql: &str) -> Result<String, Error> {
    let tokens = tokenize(sql)?;
    let mut out = String::with_capacity(sql.len());
    let mut copied_to = 0;
    for (first, last) in not_null_constraints(&tokens) {
        let mut start = tokens[first].start;
        if first > 0 && tokens[first - 1].kind == TokenKind::Space {
            start = tokens[first - 1].start;
        }
        out.push_str(&sql[copied_to..start]);
        copied_to = tokens[last].end;
    }
    out.push_str(&sql[copied_to..]);
    Ok(out)
}

#[test]
fn test_tokenize_round_trips_text() {
    let cases = vec![
        "CREATE TABLE t (a int, b integer, c text, d string, e real)",
        "create table \"odd \"\"name\" ([x y] TEXT DEFAULT 'it''s', `z` BLOB) -- trailing",
        "CREATE TABLE t (a REAL DEFAULT -1.5e10 /* note */, b INT DEFAULT .5)",
        "CREATE TABLE ü (ß TEXT)",
    ];
    for case in cases {
        let tokens = tokenize(case).unwrap_or_else(|e| panic!("Error tokenizing [{}] : {}", case, e));
        let rebuilt: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, case);
    }
}

#[test]
fn test_tokenize_kinds() {
    let tokens = tokenize("a 'NOT NULL' \"b\" (1)").unwrap();
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    use TokenKind::*;
    assert_eq!(
        kinds,
        vec![Word, Space, StringLiteral, Space, QuotedIdentifier, Space, LParen, Number, RParen]
    );
}

#[test]
fn test_tokenize_rejects_unterminated_text() {
    let cases = vec![
        "CREATE TABLE t (a TEXT DEFAULT 'oops)",
        "CREATE TABLE \"t (a TEXT)",
        "CREATE TABLE [t (a TEXT)",
    ];
    for case in cases {
        assert!(tokenize(case).is_err(), "{}", case);
        assert!(strip_not_null(case).is_err(), "{}", case);
    }
}

#[test]
fn test_strip_not_null() {
    let cases = vec![
        (
            "CREATE TABLE t (a INTEGER NOT NULL, b TEXT)",
            "CREATE TABLE t (a INTEGER, b TEXT)",
        ),
        ("CREATE TABLE t (a int not  null)", "CREATE TABLE t (a int)"),
        (
            "CREATE TABLE t (a TEXT NOT NULL DEFAULT 'NOT NULL')",
            "CREATE TABLE t (a TEXT DEFAULT 'NOT NULL')",
        ),
        (
            "CREATE TABLE \"NOT NULL\" (\"NOT NULL\" TEXT NOT NULL)",
            "CREATE TABLE \"NOT NULL\" (\"NOT NULL\" TEXT)",
        ),
        (
            "CREATE TABLE t (a INT CHECK (a IS NOT NULL) NOT NULL)",
            "CREATE TABLE t (a INT CHECK (a IS NOT NULL))",
        ),
        (
            "CREATE TABLE t (a INT CONSTRAINT nn NOT NULL ON CONFLICT REPLACE, b INT)",
            "CREATE TABLE t (a INT, b INT)",
        ),
        ("CREATE TABLE t (a INT NOT /* keep */ NULL)", "CREATE TABLE t (a INT)"),
        (
            "CREATE TABLE t (a INT -- NOT NULL\n, b INT NOT NULL)",
            "CREATE TABLE t (a INT -- NOT NULL\n, b INT)",
        ),
        (
            "CREATE TABLE t (a INT NOT NULL, b INT NOT NULL, PRIMARY KEY (a, b))",
            "CREATE TABLE t (a INT, b INT, PRIMARY KEY (a, b))",
        ),
        (
            "CREATE TABLE t (a TEXT DEFAULT NULL NOT NULL)",
            "CREATE TABLE t (a TEXT DEFAULT NULL)",
        ),
        (
            "CREATE TABLE t (a INT, g INT GENERATED ALWAYS AS (a NOT NULL) NOT NULL)",
            "CREATE TABLE t (a INT, g INT GENERATED ALWAYS AS (a NOT NULL))",
        ),
        (
            "CREATE TABLE tbl_a (\n        col_integer INTEGER NOT NULL\n        ,col_text TEXT\n        )",
            "CREATE TABLE tbl_a (\n        col_integer INTEGER\n        ,col_text TEXT\n        )",
        ),
        ("CREATE TABLE t (a INT)", "CREATE TABLE t (a INT)"),
    ];
    for (input, expected) in cases {
        assert_eq!(strip_not_null(input).unwrap(), expected, "input: {}", input);
    }
}
