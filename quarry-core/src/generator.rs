//! Synthetic Data Generator
//!
//! Produces plausible random rows for an archetype. Generation is a pure
//! function of the archetype, the row count, the reference time and the
//! random source, so tests can pin all three.

use chrono::{Duration, Months, NaiveDateTime, Timelike, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::schema::{HistoryWindow, LogicalType, TableArchetype, ValueSource};
use crate::value::{Row, Value};

/// Generate `n` rows for `archetype` relative to the current time.
pub fn generate<R: Rng + ?Sized>(archetype: &TableArchetype, n: usize, rng: &mut R) -> Vec<Row> {
    generate_at(archetype, n, Utc::now().naive_utc(), rng)
}

/// Generate `n` rows for `archetype` relative to `now`.
///
/// Every row carries one value per insertable column, in archetype order.
/// Identifier columns are skipped; the backing store assigns them.
pub fn generate_at<R: Rng + ?Sized>(
    archetype: &TableArchetype,
    n: usize,
    now: NaiveDateTime,
    rng: &mut R,
) -> Vec<Row> {
    let width = archetype.insertable_columns().count();
    (0..n)
        .map(|_| {
            let mut row = Row::with_capacity(width);
            for column in archetype.insertable_columns() {
                let value = draw_value(column.ty, &column.source, &row, now, rng);
                row.push(column.name, value);
            }
            row
        })
        .collect()
}

fn draw_value<R: Rng + ?Sized>(
    ty: LogicalType,
    source: &ValueSource,
    row: &Row,
    now: NaiveDateTime,
    rng: &mut R,
) -> Value {
    match source {
        ValueSource::Assigned => Value::Int(0),
        ValueSource::Words(words) => Value::Text(words.choose(rng).copied().unwrap_or_default().to_string()),
        ValueSource::EmailFrom { first, last } => {
            let first = row.get(first).and_then(Value::as_text).unwrap_or_default();
            let last = row.get(last).and_then(Value::as_text).unwrap_or_default();
            Value::Text(format!("{}.{}@example.com", first, last).to_lowercase())
        }
        ValueSource::Decimal { lo, hi } => {
            // Draw whole cents so the stored value is exact and stays below `hi`.
            let lo_cents = (lo * 100.0).round() as i64;
            let hi_cents = (hi * 100.0).round() as i64;
            let cents = if hi_cents > lo_cents {
                rng.random_range(lo_cents..hi_cents)
            } else {
                lo_cents
            };
            Value::Decimal(cents as f64 / 100.0)
        }
        ValueSource::Int { lo, hi } => {
            let v = if hi > lo { rng.random_range(*lo..*hi) } else { *lo };
            Value::Int(v)
        }
        ValueSource::Past(window) => {
            let instant = past_instant(now, window, rng);
            match ty {
                LogicalType::Date => Value::Date(instant.date()),
                _ => Value::Timestamp(instant),
            }
        }
    }
}

fn below<R: Rng + ?Sized>(rng: &mut R, bound: u32) -> u32 {
    if bound == 0 {
        0
    } else {
        rng.random_range(0..bound)
    }
}

/// `now` minus an independently drawn offset per window component.
pub(crate) fn past_instant<R: Rng + ?Sized>(
    now: NaiveDateTime,
    window: &HistoryWindow,
    rng: &mut R,
) -> NaiveDateTime {
    let months = below(rng, window.years) * 12 + below(rng, window.months);
    let days = below(rng, window.days);
    let seconds = below(rng, window.seconds);

    let shifted = now
        .checked_sub_months(Months::new(months))
        .unwrap_or(now)
        - Duration::days(i64::from(days))
        - Duration::seconds(i64::from(seconds));
    shifted.with_nanosecond(0).unwrap_or(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{archetype, TableKind};
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap()
    }

    #[test]
    fn test_zero_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let rows = generate_at(archetype(TableKind::Employees), 0, fixed_now(), &mut rng);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_email_derived_from_names() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_at(archetype(TableKind::Employees), 20, fixed_now(), &mut rng);
        for row in rows {
            let first = row.get("first_name").and_then(Value::as_text).unwrap();
            let last = row.get("last_name").and_then(Value::as_text).unwrap();
            let email = row.get("email").and_then(Value::as_text).unwrap();
            assert_eq!(email, format!("{}.{}@example.com", first, last).to_lowercase());
        }
    }

    #[test]
    fn test_same_seed_same_rows() {
        let a = generate_at(
            archetype(TableKind::Products),
            10,
            fixed_now(),
            &mut StdRng::seed_from_u64(42),
        );
        let b = generate_at(
            archetype(TableKind::Products),
            10,
            fixed_now(),
            &mut StdRng::seed_from_u64(42),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_past_instant_with_empty_window_is_now() {
        let window = HistoryWindow {
            years: 0,
            months: 0,
            days: 0,
            seconds: 0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(past_instant(fixed_now(), &window, &mut rng), fixed_now());
    }

    proptest! {
        #[test]
        fn prop_rows_respect_column_policies(seed in any::<u64>(), n in 0usize..60, kind_idx in 0usize..4) {
            let kind = TableKind::ALL[kind_idx];
            let arch = archetype(kind);
            let now = fixed_now();
            let rows = generate_at(arch, n, now, &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(rows.len(), n);

            for row in &rows {
                prop_assert_eq!(row.len(), arch.insertable_columns().count());
                for column in arch.insertable_columns() {
                    let value = row.get(column.name);
                    prop_assert!(value.is_some(), "missing {}", column.name);
                    let value = value.unwrap();
                    match (&column.source, value) {
                        (ValueSource::Words(words), Value::Text(s)) => {
                            prop_assert!(words.contains(&s.as_str()));
                        }
                        (ValueSource::EmailFrom { .. }, Value::Text(s)) => {
                            prop_assert!(s.ends_with("@example.com"));
                        }
                        (ValueSource::Decimal { lo, hi }, Value::Decimal(v)) => {
                            prop_assert!(*v >= *lo && *v < *hi, "{} outside [{}, {})", v, lo, hi);
                            prop_assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6);
                        }
                        (ValueSource::Int { lo, hi }, Value::Int(v)) => {
                            prop_assert!(*v >= *lo && *v < *hi);
                        }
                        (ValueSource::Past(_), Value::Date(d)) => {
                            prop_assert!(*d <= now.date());
                        }
                        (ValueSource::Past(_), Value::Timestamp(t)) => {
                            prop_assert!(*t <= now);
                        }
                        (source, value) => {
                            prop_assert!(false, "unexpected {:?} for {:?}", value, source);
                        }
                    }
                    if let LogicalType::ShortText { max_len } = column.ty {
                        prop_assert!(value.to_string().len() <= max_len as usize);
                    }
                }
            }
        }
    }
}
