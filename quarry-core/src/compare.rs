//! Result-Set Equivalence
//!
//! Decides whether a candidate result matches the reference result. Both
//! sides arrive as text cells (the store's canonical output form) and are
//! normalized into comparable values first:
//!
//! - numbers compare numerically with a relative tolerance, so `4.50`,
//!   `4.5` and a float rendering of the same value are equal
//! - dates and timestamps compare as calendar values; a date equals the
//!   timestamp at its midnight
//! - column names are ignored, only arity and positional values matter
//!
//! Row order matters only when asked for (see [`Ordering`]).

use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering as CmpOrdering;

/// Relative tolerance for numeric equality.
pub const NUMERIC_TOLERANCE: f64 = 1e-9;

/// Raw query output: column names and text cells (`None` is SQL NULL).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Column count, taken from the header or, failing that, the first row.
    pub fn arity(&self) -> usize {
        if !self.columns.is_empty() {
            self.columns.len()
        } else {
            self.rows.first().map(Vec::len).unwrap_or(0)
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Normalized cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl Cell {
    pub fn parse(raw: Option<&str>) -> Cell {
        let Some(raw) = raw else {
            return Cell::Null;
        };
        let trimmed = raw.trim();
        if let Some(n) = parse_number(trimmed) {
            return Cell::Number(n);
        }
        if let Some(ts) = parse_temporal(trimmed) {
            return Cell::Timestamp(ts);
        }
        Cell::Text(raw.to_string())
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Number(_) => 1,
            Cell::Timestamp(_) => 2,
            Cell::Text(_) => 3,
        }
    }

    /// Equality under the comparison rule.
    pub fn equivalent(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Null, Cell::Null) => true,
            (Cell::Number(a), Cell::Number(b)) => numbers_equal(*a, *b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a == b,
            (Cell::Text(a), Cell::Text(b)) => a == b,
            _ => false,
        }
    }

    /// Total order used to canonicalize unordered results.
    fn total_cmp(&self, other: &Cell) -> CmpOrdering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    // Reject words f64 accepts ("inf", "NaN") unless they look numeric.
    let first = s.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_temporal(s: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    // Drop a trailing zone offset such as +00, -05 or +05:30.
    let body = match s.rfind(['+', '-', 'Z']) {
        Some(pos) if pos > 10 => &s[..pos],
        _ => s,
    };
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
}

fn numbers_equal(a: f64, b: f64) -> bool {
    let scale = 1.0_f64.max(a.abs()).max(b.abs());
    (a - b).abs() <= NUMERIC_TOLERANCE * scale
}

fn normalize(set: &ResultSet) -> Vec<Vec<Cell>> {
    set.rows
        .iter()
        .map(|row| row.iter().map(|c| Cell::parse(c.as_deref())).collect())
        .collect()
}

fn row_cmp(a: &[Cell], b: &[Cell]) -> CmpOrdering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != CmpOrdering::Equal)
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn rows_equivalent(a: &[Cell], b: &[Cell]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

/// Whether row order is part of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    /// Rows compare as a multiset.
    Unordered,
    /// Rows compare position by position.
    Ordered,
}

/// Outcome of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ColumnCount { expected: usize, actual: usize },
    RowCount { expected: usize, actual: usize },
    /// 1-based position of the first differing row (after canonical sorting
    /// for unordered comparisons).
    Row { position: usize },
}

impl Mismatch {
    /// Learner-facing explanation. Never echoes values.
    pub fn message(&self) -> String {
        match self {
            Mismatch::ColumnCount { expected, actual } => format!(
                "The result has {} column(s), expected {}",
                actual, expected
            ),
            Mismatch::RowCount { expected, actual } => {
                format!("The result has {} row(s), expected {}", actual, expected)
            }
            Mismatch::Row { position } => {
                format!("The result differs from the expected result at row {}", position)
            }
        }
    }
}

/// Compare `actual` against `expected`.
pub fn compare(expected: &ResultSet, actual: &ResultSet, ordering: Ordering) -> Result<(), Mismatch> {
    // A side with neither header nor rows has no knowable arity.
    let (want, got) = (expected.arity(), actual.arity());
    if want != got && want > 0 && got > 0 {
        return Err(Mismatch::ColumnCount {
            expected: want,
            actual: got,
        });
    }
    if expected.row_count() != actual.row_count() {
        return Err(Mismatch::RowCount {
            expected: expected.row_count(),
            actual: actual.row_count(),
        });
    }

    let mut left = normalize(expected);
    let mut right = normalize(actual);
    if ordering == Ordering::Unordered {
        left.sort_by(|a, b| row_cmp(a, b));
        right.sort_by(|a, b| row_cmp(a, b));
    }

    match left
        .iter()
        .zip(&right)
        .position(|(a, b)| !rows_equivalent(a, b))
    {
        Some(index) => Err(Mismatch::Row { position: index + 1 }),
        None => Ok(()),
    }
}
