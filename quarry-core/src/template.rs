//! Task Template Catalog
//!
//! Fixed registry of parameterized tasks. Each template is bound to one
//! archetype and declares its parameter kind explicitly, so rendering never
//! has to guess whether a placeholder is present.
//!
//! Formats use two tokens: `{table}` (the physical table name, reference
//! query only) and `{param}` (the drawn parameter, both formats).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::schema::TableKind;

/// Token replaced by the physical table name.
pub const TABLE_TOKEN: &str = "{table}";
/// Token replaced by the rendered parameter.
pub const PARAM_TOKEN: &str = "{param}";

/// Task difficulty tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Unknown difficulty: {}", s)),
        }
    }
}

/// Parameter declared by a template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    None,
    /// Integer in `[lo, hi]` (inclusive).
    IntRange { lo: i64, hi: i64 },
    /// Decimal in `[lo, hi)`, rendered with one fractional digit.
    DecimalRange { lo: f64, hi: f64 },
}

/// A drawn parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Decimal(f64),
}

impl ParamValue {
    /// Text substituted for [`PARAM_TOKEN`] in both formats.
    pub fn render(&self) -> String {
        match self {
            ParamValue::Int(v) => v.to_string(),
            ParamValue::Decimal(v) => format!("{:.1}", v),
        }
    }
}

impl ParamKind {
    /// Draw a value from the declared range. `None` draws nothing.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ParamValue> {
        match *self {
            ParamKind::None => None,
            ParamKind::IntRange { lo, hi } => {
                let v = if hi > lo { rng.random_range(lo..=hi) } else { lo };
                Some(ParamValue::Int(v))
            }
            ParamKind::DecimalRange { lo, hi } => {
                let v = if hi > lo { rng.random_range(lo..hi) } else { lo };
                Some(ParamValue::Decimal(v))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamKind::None)
    }
}

/// A parameterized task bound to one archetype.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTemplate {
    /// Stable identifier, used in logs and metrics.
    pub key: &'static str,
    pub kind: TableKind,
    pub difficulty: Difficulty,
    pub description: &'static str,
    pub query: &'static str,
    pub required_columns: &'static [&'static str],
    pub param: ParamKind,
}

/// Rendered learner description and private reference query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub description: String,
    pub reference_query: String,
}

impl TaskTemplate {
    /// Substitute the table name and parameter into both formats.
    ///
    /// The same rendered parameter text lands in the description and the
    /// query, so what the learner reads is what the oracle filters on.
    pub fn render(&self, table: &str, param: Option<ParamValue>) -> RenderedTemplate {
        let param_text = param.map(|p| p.render()).unwrap_or_default();
        let mut description = self.description.to_string();
        let mut reference_query = self.query.replace(TABLE_TOKEN, table);
        if !self.param.is_none() {
            description = description.replace(PARAM_TOKEN, &param_text);
            reference_query = reference_query.replace(PARAM_TOKEN, &param_text);
        }
        RenderedTemplate {
            description,
            reference_query,
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

static TEMPLATES: [TaskTemplate; 11] = [
    TaskTemplate {
        key: "employees_above_average_salary",
        kind: TableKind::Employees,
        difficulty: Difficulty::Medium,
        description: "Find all employees whose salary is above the average salary.",
        query: "SELECT * FROM {table} WHERE salary > (SELECT AVG(salary) FROM {table})",
        required_columns: &["salary"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "employees_top_salaries",
        kind: TableKind::Employees,
        difficulty: Difficulty::Easy,
        description: "List the {param} employees with the highest salary, highest first.",
        query: "SELECT * FROM {table} ORDER BY salary DESC LIMIT {param}",
        required_columns: &["salary"],
        param: ParamKind::IntRange { lo: 3, hi: 7 },
    },
    TaskTemplate {
        key: "employees_headcount_by_department",
        kind: TableKind::Employees,
        difficulty: Difficulty::Easy,
        description: "Count the employees in each department. Return the department and the count, \
                      largest count first, ties broken by department name.",
        query: "SELECT department, COUNT(*) AS count FROM {table} GROUP BY department \
                ORDER BY count DESC, department",
        required_columns: &["department"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "employees_average_salary_by_department",
        kind: TableKind::Employees,
        difficulty: Difficulty::Medium,
        description: "Find the average salary in each department. Return the department and the \
                      average, highest average first.",
        query: "SELECT department, AVG(salary) AS avg_salary FROM {table} GROUP BY department \
                ORDER BY avg_salary DESC, department",
        required_columns: &["department", "salary"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "products_rating_above",
        kind: TableKind::Products,
        difficulty: Difficulty::Easy,
        description: "Find the products with a rating above {param}, highest rating first.",
        query: "SELECT * FROM {table} WHERE rating > {param} ORDER BY rating DESC",
        required_columns: &["rating"],
        param: ParamKind::DecimalRange { lo: 3.0, hi: 4.5 },
    },
    TaskTemplate {
        key: "products_stock_value_by_category",
        kind: TableKind::Products,
        difficulty: Difficulty::Hard,
        description: "Compute the total value of stock (price times stock) in each category. \
                      Return the category and the total, largest total first.",
        query: "SELECT category, SUM(price * stock) AS total_value FROM {table} \
                GROUP BY category ORDER BY total_value DESC, category",
        required_columns: &["category", "price", "stock"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "products_cheapest",
        kind: TableKind::Products,
        difficulty: Difficulty::Easy,
        description: "List the names and prices of the {param} cheapest products, cheapest first.",
        query: "SELECT name, price FROM {table} ORDER BY price, id LIMIT {param}",
        required_columns: &["name", "price", "id"],
        param: ParamKind::IntRange { lo: 3, hi: 7 },
    },
    TaskTemplate {
        key: "customers_loyal",
        kind: TableKind::Customers,
        difficulty: Difficulty::Easy,
        description: "Find the first name, last name and email of customers with more than \
                      {param} loyalty points.",
        query: "SELECT first_name, last_name, email FROM {table} WHERE loyalty_points > {param}",
        required_columns: &["first_name", "last_name", "email", "loyalty_points"],
        param: ParamKind::IntRange { lo: 1000, hi: 4000 },
    },
    TaskTemplate {
        key: "customers_by_city",
        kind: TableKind::Customers,
        difficulty: Difficulty::Medium,
        description: "Count the customers in each city that signed up in the last year. Return \
                      the city and the count, sorted by city name.",
        query: "SELECT city, COUNT(*) AS customer_count FROM {table} \
                WHERE signup_date >= CURRENT_DATE - INTERVAL '1 year' GROUP BY city ORDER BY city",
        required_columns: &["city", "signup_date"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "orders_by_status",
        kind: TableKind::Orders,
        difficulty: Difficulty::Easy,
        description: "Count the orders in each status. Return the status and the count.",
        query: "SELECT status, COUNT(*) FROM {table} GROUP BY status",
        required_columns: &["status"],
        param: ParamKind::None,
    },
    TaskTemplate {
        key: "orders_revenue_by_product",
        kind: TableKind::Orders,
        difficulty: Difficulty::Hard,
        description: "Compute the revenue (quantity times unit price) of each product over orders \
                      that were not cancelled. Return the product and the revenue, largest \
                      revenue first.",
        query: "SELECT product, SUM(quantity * unit_price) AS revenue FROM {table} \
                WHERE status <> 'cancelled' GROUP BY product ORDER BY revenue DESC, product",
        required_columns: &["product", "quantity", "unit_price", "status"],
        param: ParamKind::None,
    },
];

/// Every registered template.
pub fn templates() -> &'static [TaskTemplate] {
    &TEMPLATES
}

/// Templates bound to `kind`, in registry order.
pub fn compatible_templates(kind: TableKind) -> Vec<&'static TaskTemplate> {
    TEMPLATES.iter().filter(|t| t.kind == kind).collect()
}

/// Look up a template by key.
pub fn template(key: &str) -> Option<&'static TaskTemplate> {
    TEMPLATES.iter().find(|t| t.key == key)
}
