//! Candidate Query Guard
//!
//! A small SQL lexer and the checks built on it: the read-only guard run
//! before any learner query reaches the database, logical-to-physical table
//! rebinding, and detection of a top-level `ORDER BY`.
//!
//! The lexer understands enough PostgreSQL to never mistake text inside
//! literals, quoted identifiers or comments for keywords. It does not parse.

use crate::error::CandidateError;

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword.
    Word,
    /// `"quoted identifier"`.
    QuotedIdent,
    /// String, escape-string or dollar-quoted literal.
    Literal,
    /// Numeric literal.
    Number,
    /// Positional parameter such as `$1`.
    Param,
    Open,
    Close,
    Semicolon,
    /// Any other operator or punctuation character.
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }

    /// Identifier text with quoting removed.
    fn ident<'a>(&self, sql: &'a str) -> Option<std::borrow::Cow<'a, str>> {
        match self.kind {
            TokenKind::Word => Some(std::borrow::Cow::Borrowed(self.text(sql))),
            TokenKind::QuotedIdent => {
                let inner = &sql[self.start + 1..self.end - 1];
                Some(std::borrow::Cow::Owned(inner.replace("\"\"", "\"")))
            }
            _ => None,
        }
    }

    fn is_keyword(&self, sql: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(sql).eq_ignore_ascii_case(keyword)
    }
}

/// Keywords a read-only query may start with.
const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH", "VALUES", "TABLE"];

/// Words that never appear in a read-only query against a practice table.
const DENIED_WORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT",
    "REVOKE", "COPY", "CALL", "DO", "VACUUM", "ANALYZE", "LOCK", "SET", "RESET", "COMMENT",
    "REINDEX", "CLUSTER", "REFRESH", "LISTEN", "NOTIFY", "UNLISTEN", "PREPARE", "EXECUTE",
    "DEALLOCATE", "DISCARD", "IMPORT", "SECURITY", "INTO", "BEGIN", "COMMIT", "ROLLBACK",
    "SAVEPOINT", "SET_CONFIG", "NEXTVAL", "SETVAL", "PG_TERMINATE_BACKEND",
    "PG_CANCEL_BACKEND", "PG_READ_FILE", "PG_READ_BINARY_FILE", "PG_LS_DIR", "LO_IMPORT",
    "LO_EXPORT", "DBLINK", "DBLINK_EXEC",
];

fn unterminated(what: &str) -> CandidateError {
    CandidateError::invalid(format!("The query has an unterminated {}", what))
}

/// Split `sql` into tokens, skipping whitespace and comments.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, CandidateError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // -- line comment
        if c == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        // /* block comment */, nesting as PostgreSQL does
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let mut depth = 1;
            i += 2;
            while depth > 0 {
                match (bytes.get(i), bytes.get(i + 1)) {
                    (Some(b'/'), Some(b'*')) => {
                        depth += 1;
                        i += 2;
                    }
                    (Some(b'*'), Some(b'/')) => {
                        depth -= 1;
                        i += 2;
                    }
                    (Some(_), _) => i += 1,
                    (None, _) => return Err(unterminated("comment")),
                }
            }
            continue;
        }

        let kind = match c {
            b'\'' => {
                i = scan_quoted(bytes, i, b'\'', false).ok_or_else(|| unterminated("string"))?;
                TokenKind::Literal
            }
            b'"' => {
                i = scan_quoted(bytes, i, b'"', false).ok_or_else(|| unterminated("identifier"))?;
                TokenKind::QuotedIdent
            }
            b'$' => {
                if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                    TokenKind::Param
                } else if let Some(end) = scan_dollar_quoted(sql, i) {
                    i = end?;
                    TokenKind::Literal
                } else {
                    i += 1;
                    TokenKind::Symbol
                }
            }
            b'(' => {
                i += 1;
                TokenKind::Open
            }
            b')' => {
                i += 1;
                TokenKind::Close
            }
            b';' => {
                i += 1;
                TokenKind::Semicolon
            }
            c if c.is_ascii_digit()
                || (c == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)) =>
            {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
                TokenKind::Number
            }
            c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => {
                // E'...' escape strings
                if (c == b'e' || c == b'E') && bytes.get(i + 1) == Some(&b'\'') {
                    i = scan_quoted(bytes, i + 1, b'\'', true)
                        .ok_or_else(|| unterminated("string"))?;
                    TokenKind::Literal
                } else {
                    while i < bytes.len()
                        && (bytes[i] == b'_'
                            || bytes[i] == b'$'
                            || bytes[i].is_ascii_alphanumeric()
                            || bytes[i] >= 0x80)
                    {
                        i += 1;
                    }
                    TokenKind::Word
                }
            }
            _ => {
                // Advance by a whole character so slicing stays on boundaries.
                i += sql[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                TokenKind::Symbol
            }
        };

        tokens.push(Token {
            kind,
            start,
            end: i,
        });
    }

    Ok(tokens)
}

/// Scan a quoted run starting at `open`. Doubled quotes escape; with
/// `backslash` set, `\x` escapes too. Returns the index past the closing quote.
fn scan_quoted(bytes: &[u8], open: usize, quote: u8, backslash: bool) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Scan `$tag$ ... $tag$`. Returns `None` when `start` does not open a
/// dollar quote, `Some(Err)` when it opens one that never closes.
fn scan_dollar_quoted(sql: &str, start: usize) -> Option<Result<usize, CandidateError>> {
    let rest = &sql[start + 1..];
    let tag_len = rest
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(rest.len());
    if !rest[tag_len..].starts_with('$') {
        return None;
    }
    let delimiter = &sql[start..start + tag_len + 2];
    let body_start = start + delimiter.len();
    Some(
        sql[body_start..]
            .find(delimiter)
            .map(|pos| body_start + pos + delimiter.len())
            .ok_or_else(|| unterminated("dollar-quoted string")),
    )
}

/// Refuse anything that is not a single read-only query.
///
/// This runs before execution; the executor additionally runs candidates in
/// a read-only transaction.
pub fn check_read_only(sql: &str) -> Result<(), CandidateError> {
    let tokens = tokenize(sql)?;

    let Some(last) = tokens.last() else {
        return Err(CandidateError::disallowed("The query is empty"));
    };

    let body = if last.kind == TokenKind::Semicolon {
        &tokens[..tokens.len() - 1]
    } else {
        &tokens[..]
    };
    if body.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return Err(CandidateError::disallowed(
            "Only a single statement is allowed",
        ));
    }

    let leading = body.iter().find(|t| t.kind != TokenKind::Open);
    match leading {
        Some(t) if ALLOWED_LEADING.iter().any(|kw| t.is_keyword(sql, kw)) => {}
        Some(t) => {
            return Err(CandidateError::disallowed(format!(
                "Only SELECT queries are allowed, found {}",
                t.text(sql).to_uppercase()
            )))
        }
        None => return Err(CandidateError::disallowed("The query is empty")),
    }

    for token in body {
        if let Some(ident) = token.ident(sql) {
            if let Some(denied) = DENIED_WORDS
                .iter()
                .find(|kw| ident.eq_ignore_ascii_case(kw))
            {
                return Err(CandidateError::disallowed(format!(
                    "{} is not allowed in a read-only query",
                    denied
                )));
            }
        }
    }

    Ok(())
}

/// Replace every reference to the `logical` table name with `physical`.
///
/// Matching is case-insensitive for bare words and exact for quoted
/// identifiers; literals and comments are left alone. `physical` must
/// already be a validated identifier.
pub fn rebind_table(sql: &str, logical: &str, physical: &str) -> Result<String, CandidateError> {
    let tokens = tokenize(sql)?;
    let mut out = String::with_capacity(sql.len() + physical.len());
    let mut cursor = 0;

    for token in &tokens {
        let matches = match token.kind {
            TokenKind::Word => token.text(sql).eq_ignore_ascii_case(logical),
            TokenKind::QuotedIdent => token.ident(sql).is_some_and(|i| i == logical),
            _ => false,
        };
        if matches {
            out.push_str(&sql[cursor..token.start]);
            out.push_str(physical);
            cursor = token.end;
        }
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}

/// Whether `sql` names the identifier `name` anywhere outside literals and
/// comments. Bare words match case-insensitively, quoted identifiers exactly.
pub fn mentions_identifier(sql: &str, name: &str) -> bool {
    let Ok(tokens) = tokenize(sql) else {
        return false;
    };
    tokens.iter().any(|token| match token.kind {
        TokenKind::Word => token.text(sql).eq_ignore_ascii_case(name),
        TokenKind::QuotedIdent => token.ident(sql).is_some_and(|i| i == name),
        _ => false,
    })
}

/// Whether the statement orders its final result (an `ORDER BY` outside
/// any parentheses).
pub fn has_top_level_order_by(sql: &str) -> bool {
    let Ok(tokens) = tokenize(sql) else {
        return false;
    };
    let mut depth: i32 = 0;
    let mut previous_order = false;
    for token in &tokens {
        match token.kind {
            TokenKind::Open => depth += 1,
            TokenKind::Close => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            if previous_order && token.is_keyword(sql, "BY") {
                return true;
            }
            previous_order = token.is_keyword(sql, "ORDER");
        } else {
            previous_order = false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_skips_comments_and_literals() {
        let sql = "SELECT 'drop table x' -- delete\n FROM /* update /* nested */ */ t";
        assert_eq!(
            kinds(sql),
            vec![
                TokenKind::Word,
                TokenKind::Literal,
                TokenKind::Word,
                TokenKind::Word
            ]
        );
    }

    #[test]
    fn test_tokenize_dollar_and_escape_strings() {
        let sql = "SELECT $$it's; DROP$$, $tag$x$tag$, E'a\\'b', $1";
        let toks = tokenize(sql).unwrap();
        let literals = toks.iter().filter(|t| t.kind == TokenKind::Literal).count();
        assert_eq!(literals, 3);
        assert_eq!(toks.last().map(|t| t.kind), Some(TokenKind::Param));
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        assert!(matches!(
            tokenize("SELECT 'oops"),
            Err(CandidateError::InvalidQuery { .. })
        ));
        assert!(tokenize("SELECT /* never closed").is_err());
        assert!(tokenize("SELECT $a$ open").is_err());
    }

    #[test]
    fn test_mentions_identifier() {
        assert!(mentions_identifier("SELECT * FROM Quarry_Tasks", "quarry_tasks"));
        assert!(mentions_identifier("SELECT * FROM \"quarry_tasks\"", "quarry_tasks"));
        assert!(!mentions_identifier("SELECT 'quarry_tasks' FROM t", "quarry_tasks"));
        assert!(!mentions_identifier("SELECT 1 -- quarry_tasks", "quarry_tasks"));
    }

    #[test]
    fn test_read_only_accepts_queries() {
        for sql in [
            "SELECT * FROM employees",
            "select * from employees;",
            "  WITH x AS (SELECT 1) SELECT * FROM x",
            "(SELECT 1) UNION (SELECT 2)",
            "SELECT 'update' AS note FROM t WHERE name = 'DROP TABLE'",
            "VALUES (1), (2)",
            "TABLE employees",
        ] {
            assert_eq!(check_read_only(sql), Ok(()), "{}", sql);
        }
    }

    #[test]
    fn test_read_only_rejects_mutations() {
        for sql in [
            "DROP TABLE practice_1",
            "delete from employees",
            "SELECT 1; DROP TABLE employees",
            "WITH gone AS (DELETE FROM employees RETURNING *) SELECT * FROM gone",
            "SELECT * INTO copy FROM employees",
            "SELECT set_config('statement_timeout', '0', true)",
            "SELECT * FROM employees FOR UPDATE",
            "SELECT \"nextval\"('s')",
            "EXPLAIN ANALYZE DELETE FROM employees",
        ] {
            assert!(
                matches!(check_read_only(sql), Err(CandidateError::Disallowed { .. })),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_read_only_rejects_empty() {
        assert!(check_read_only("").is_err());
        assert!(check_read_only("  -- just a comment").is_err());
        assert!(check_read_only(";").is_err());
    }

    #[test]
    fn test_rebind_replaces_only_identifiers() {
        let sql = "SELECT e.salary FROM Employees e WHERE 'employees' <> \"employees\".x";
        let rebound = rebind_table(sql, "employees", "practice_42").unwrap();
        assert_eq!(
            rebound,
            "SELECT e.salary FROM practice_42 e WHERE 'employees' <> practice_42.x"
        );
    }

    #[test]
    fn test_rebind_leaves_physical_name() {
        let sql = "SELECT * FROM practice_42 WHERE rating > 3.7";
        assert_eq!(rebind_table(sql, "products", "practice_42").unwrap(), sql);
    }

    #[test]
    fn test_top_level_order_by() {
        assert!(has_top_level_order_by("SELECT * FROM t ORDER BY a"));
        assert!(has_top_level_order_by("select * from t order   by a desc limit 3"));
        assert!(!has_top_level_order_by("SELECT * FROM (SELECT * FROM t ORDER BY a) s"));
        assert!(!has_top_level_order_by(
            "SELECT rank() OVER (ORDER BY a) FROM t"
        ));
        assert!(!has_top_level_order_by("SELECT 'ORDER BY' FROM t"));
        assert!(!has_top_level_order_by("SELECT a AS \"order\", b AS by FROM t"));
    }

    proptest! {
        #[test]
        fn prop_tokenize_never_panics(sql in "\\PC{0,80}") {
            let _ = tokenize(&sql);
            let _ = check_read_only(&sql);
            let _ = has_top_level_order_by(&sql);
        }

        #[test]
        fn prop_literals_never_trip_the_guard(word in "(DROP|DELETE|UPDATE|INSERT|TRUNCATE)[ a-z]{0,20}") {
            let sql = format!("SELECT * FROM t WHERE name = '{}'", word);
            prop_assert_eq!(check_read_only(&sql), Ok(()));
        }
    }
}
