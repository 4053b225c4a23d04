//! Property-Based Tests for Comparison and Templates
//!
//! Result-set equivalence must be reflexive, blind to row order when asked
//! to be, and sensitive to arity even when no rows come back. Every template
//! compatible with a table kind must render to a complete statement.

use proptest::prelude::*;
use quarry_core::{compare, compatible_templates, Mismatch, Ordering, ResultSet};
use quarry_test_utils::fixtures::seeded_rng;
use quarry_test_utils::generators::{arb_cell, arb_result_set, arb_table_kind};

proptest! {
    #[test]
    fn prop_comparison_is_reflexive(rs in arb_result_set(4, 20)) {
        prop_assert_eq!(compare(&rs, &rs, Ordering::Ordered), Ok(()));
        prop_assert_eq!(compare(&rs, &rs, Ordering::Unordered), Ok(()));
    }

    #[test]
    fn prop_unordered_is_permutation_invariant(
        rs in arb_result_set(3, 20),
        rotate in 0usize..20,
    ) {
        let mut rows = rs.rows.clone();
        if !rows.is_empty() {
            let len = rows.len();
            rows.rotate_left(rotate % len);
        }
        rows.reverse();
        let shuffled = ResultSet::new(rs.columns.clone(), rows);
        prop_assert_eq!(compare(&rs, &shuffled, Ordering::Unordered), Ok(()));
    }

    #[test]
    fn prop_extra_column_is_a_column_mismatch(
        rs in arb_result_set(3, 10),
        extra in arb_cell(),
    ) {
        let mut columns = rs.columns.clone();
        columns.push("extra".to_string());
        let rows = rs
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.push(extra.clone());
                row
            })
            .collect();
        let widened = ResultSet::new(columns, rows);
        prop_assert_eq!(
            compare(&rs, &widened, Ordering::Unordered),
            Err(Mismatch::ColumnCount {
                expected: rs.columns.len(),
                actual: rs.columns.len() + 1,
            })
        );
    }

    #[test]
    fn prop_compatible_templates_render_completely(kind in arb_table_kind(), seed in any::<u64>()) {
        let templates = compatible_templates(kind);
        prop_assert!(!templates.is_empty());
        for template in templates {
            let param = template.param.draw(&mut seeded_rng(seed));
            let rendered = template.render("practice_1_0", param);
            prop_assert!(rendered.reference_query.contains("practice_1_0"));
            prop_assert!(!rendered.reference_query.contains('{'), "{}", rendered.reference_query);
            prop_assert!(!rendered.description.contains('{'), "{}", rendered.description);
            if let Some(param) = param {
                prop_assert!(rendered.description.contains(&param.render()));
                prop_assert!(rendered.reference_query.contains(&param.render()));
            }
        }
    }
}
