//! Schema Catalog
//!
//! Fixed registry of table archetypes. Each archetype is an ordered list of
//! typed columns plus the generation policy for each column. The catalog is
//! pure data: it is built once at process start and never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TABLE KINDS
// ============================================================================

/// Closed enumeration of table archetypes known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Employees,
    Products,
    Orders,
    Customers,
}

impl TableKind {
    /// Every registered kind, in catalog order.
    pub const ALL: [TableKind; 4] = [
        TableKind::Employees,
        TableKind::Products,
        TableKind::Orders,
        TableKind::Customers,
    ];

    /// Logical table name shown to learners.
    pub fn logical_name(&self) -> &'static str {
        match self {
            TableKind::Employees => "employees",
            TableKind::Products => "products",
            TableKind::Orders => "orders",
            TableKind::Customers => "customers",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

impl FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableKind::ALL
            .into_iter()
            .find(|kind| kind.logical_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown table kind: {}", s))
    }
}

// ============================================================================
// COLUMN TYPES
// ============================================================================

/// Logical column type, independent of the backing store's type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Auto-generated primary key. Exactly one per archetype.
    Identifier,
    /// Bounded variable-length string.
    ShortText { max_len: u16 },
    /// Fixed-point amount with two fractional digits.
    Money,
    /// Non-negative integer.
    Integer,
    /// Small fixed-point value with two fractional digits, below 10.
    BoundedDecimal,
    /// Calendar date.
    Date,
    /// Date-time without zone.
    Timestamp,
}

impl LogicalType {
    /// PostgreSQL column type for this logical type.
    pub fn sql_type(&self) -> String {
        match self {
            LogicalType::Identifier => "SERIAL PRIMARY KEY".to_string(),
            LogicalType::ShortText { max_len } => format!("VARCHAR({})", max_len),
            LogicalType::Money => "DECIMAL(10,2)".to_string(),
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::BoundedDecimal => "DECIMAL(3,2)".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
        }
    }

    /// Whether values of this type are numeric once stored.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::Identifier
                | LogicalType::Money
                | LogicalType::Integer
                | LogicalType::BoundedDecimal
        )
    }
}

/// Historical window used for date and timestamp columns.
///
/// Each component is an exclusive upper bound; the generated value is
/// `now - years - months - days - seconds` with every component drawn
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub years: u32,
    pub months: u32,
    pub days: u32,
    pub seconds: u32,
}

/// Generation policy for a single column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueSource {
    /// Assigned by the backing store.
    Assigned,
    /// Uniform pick from a fixed word list.
    Words(&'static [&'static str]),
    /// Lower-cased `first.last@example.com` built from two earlier columns.
    EmailFrom {
        first: &'static str,
        last: &'static str,
    },
    /// Uniform decimal in `[lo, hi)`, rounded to two places.
    Decimal { lo: f64, hi: f64 },
    /// Uniform integer in `[lo, hi)`.
    Int { lo: i32, hi: i32 },
    /// `now` minus a random offset within the window.
    Past(HistoryWindow),
}

/// One column of an archetype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: LogicalType,
    pub nullable: bool,
    pub source: ValueSource,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, ty: LogicalType, source: ValueSource) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            source,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Column definition fragment for `CREATE TABLE`.
    pub fn definition(&self) -> String {
        if self.nullable || self.ty == LogicalType::Identifier {
            format!("{} {}", self.name, self.ty.sql_type())
        } else {
            format!("{} {} NOT NULL", self.name, self.ty.sql_type())
        }
    }

    pub fn is_identifier(&self) -> bool {
        self.ty == LogicalType::Identifier
    }
}

/// Blueprint of a generated table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableArchetype {
    pub kind: TableKind,
    pub columns: &'static [ColumnSpec],
}

impl TableArchetype {
    /// Columns the generator fills (everything except the identifier).
    pub fn insertable_columns(&self) -> impl Iterator<Item = &'static ColumnSpec> {
        self.columns.iter().filter(|c| !c.is_identifier())
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

// ============================================================================
// WORD LISTS
// ============================================================================

pub const FIRST_NAMES: &[&str] = &[
    "John", "Alice", "Bob", "Emma", "Michael", "Sarah", "David", "Lisa",
];
pub const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller",
];
pub const DEPARTMENTS: &[&str] = &["IT", "HR", "Sales", "Marketing", "Finance", "Operations"];
pub const PRODUCT_CATEGORIES: &[&str] =
    &["Electronics", "Books", "Clothing", "Food", "Sports", "Home"];
pub const PRODUCT_NAMES: &[&str] = &[
    "Laptop", "Smartphone", "Headphones", "Camera", "Tablet", "Watch",
];
pub const CITIES: &[&str] = &["Berlin", "Lisbon", "Oslo", "Prague", "Madrid", "Vienna", "Dublin"];
pub const ORDER_STATUSES: &[&str] = &["pending", "shipped", "delivered", "cancelled"];

// ============================================================================
// ARCHETYPES
// ============================================================================

const fn text(max_len: u16) -> LogicalType {
    LogicalType::ShortText { max_len }
}

const ID: ColumnSpec = ColumnSpec::new("id", LogicalType::Identifier, ValueSource::Assigned);

static EMPLOYEES: [ColumnSpec; 7] = [
    ID,
    ColumnSpec::new("first_name", text(50), ValueSource::Words(FIRST_NAMES)),
    ColumnSpec::new("last_name", text(50), ValueSource::Words(LAST_NAMES)),
    ColumnSpec::new(
        "email",
        text(100),
        ValueSource::EmailFrom {
            first: "first_name",
            last: "last_name",
        },
    ),
    ColumnSpec::new(
        "salary",
        LogicalType::Money,
        ValueSource::Decimal {
            lo: 30000.0,
            hi: 150000.0,
        },
    ),
    ColumnSpec::new("department", text(50), ValueSource::Words(DEPARTMENTS)),
    ColumnSpec::new(
        "hire_date",
        LogicalType::Date,
        ValueSource::Past(HistoryWindow {
            years: 5,
            months: 12,
            days: 28,
            seconds: 0,
        }),
    ),
];

static PRODUCTS: [ColumnSpec; 7] = [
    ID,
    ColumnSpec::new("name", text(100), ValueSource::Words(PRODUCT_NAMES)),
    ColumnSpec::new("category", text(50), ValueSource::Words(PRODUCT_CATEGORIES)),
    ColumnSpec::new(
        "price",
        LogicalType::Money,
        ValueSource::Decimal { lo: 10.0, hi: 1000.0 },
    ),
    ColumnSpec::new("stock", LogicalType::Integer, ValueSource::Int { lo: 0, hi: 1000 }),
    ColumnSpec::new(
        "rating",
        LogicalType::BoundedDecimal,
        ValueSource::Decimal { lo: 1.0, hi: 5.0 },
    )
    .nullable(),
    ColumnSpec::new(
        "created_at",
        LogicalType::Timestamp,
        ValueSource::Past(HistoryWindow {
            years: 0,
            months: 12,
            days: 28,
            seconds: 86_400,
        }),
    ),
];

static ORDERS: [ColumnSpec; 7] = [
    ID,
    ColumnSpec::new("customer_name", text(50), ValueSource::Words(LAST_NAMES)),
    ColumnSpec::new("product", text(100), ValueSource::Words(PRODUCT_NAMES)),
    ColumnSpec::new("quantity", LogicalType::Integer, ValueSource::Int { lo: 1, hi: 20 }),
    ColumnSpec::new(
        "unit_price",
        LogicalType::Money,
        ValueSource::Decimal { lo: 5.0, hi: 500.0 },
    ),
    ColumnSpec::new("status", text(20), ValueSource::Words(ORDER_STATUSES)),
    ColumnSpec::new(
        "ordered_at",
        LogicalType::Timestamp,
        ValueSource::Past(HistoryWindow {
            years: 0,
            months: 6,
            days: 28,
            seconds: 86_400,
        }),
    ),
];

static CUSTOMERS: [ColumnSpec; 7] = [
    ID,
    ColumnSpec::new("first_name", text(50), ValueSource::Words(FIRST_NAMES)),
    ColumnSpec::new("last_name", text(50), ValueSource::Words(LAST_NAMES)),
    ColumnSpec::new(
        "email",
        text(100),
        ValueSource::EmailFrom {
            first: "first_name",
            last: "last_name",
        },
    ),
    ColumnSpec::new("city", text(50), ValueSource::Words(CITIES)),
    ColumnSpec::new(
        "loyalty_points",
        LogicalType::Integer,
        ValueSource::Int { lo: 0, hi: 5000 },
    ),
    ColumnSpec::new(
        "signup_date",
        LogicalType::Date,
        ValueSource::Past(HistoryWindow {
            years: 3,
            months: 12,
            days: 28,
            seconds: 0,
        }),
    ),
];

static ARCHETYPES: [TableArchetype; 4] = [
    TableArchetype {
        kind: TableKind::Employees,
        columns: &EMPLOYEES,
    },
    TableArchetype {
        kind: TableKind::Products,
        columns: &PRODUCTS,
    },
    TableArchetype {
        kind: TableKind::Orders,
        columns: &ORDERS,
    },
    TableArchetype {
        kind: TableKind::Customers,
        columns: &CUSTOMERS,
    },
];

/// Look up the archetype for a kind. Total over [`TableKind`].
pub fn archetype(kind: TableKind) -> &'static TableArchetype {
    match kind {
        TableKind::Employees => &ARCHETYPES[0],
        TableKind::Products => &ARCHETYPES[1],
        TableKind::Orders => &ARCHETYPES[2],
        TableKind::Customers => &ARCHETYPES[3],
    }
}

/// All registered archetypes.
pub fn archetypes() -> &'static [TableArchetype] {
    &ARCHETYPES
}
