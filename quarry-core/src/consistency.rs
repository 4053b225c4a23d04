//! Startup consistency check
//!
//! Cross-checks the schema catalog against the template catalog. The service
//! refuses to start when anything is reported here.

use std::collections::HashSet;

use crate::error::CatalogError;
use crate::guard::check_read_only;
use crate::schema::{archetypes, LogicalType, TableArchetype, TableKind, ValueSource};
use crate::template::{templates, ParamKind, ParamValue, TaskTemplate, PARAM_TOKEN, TABLE_TOKEN};

/// Table name used to render references during the check.
const PROBE_TABLE: &str = "consistency_probe";

/// Check the built-in catalogs.
pub fn check_catalog() -> Vec<CatalogError> {
    check_catalog_with(archetypes(), templates())
}

/// Check an arbitrary pair of catalogs. Returns every problem found, in
/// catalog order; an empty vector means the catalogs are consistent.
pub fn check_catalog_with(
    archetypes: &[TableArchetype],
    templates: &[TaskTemplate],
) -> Vec<CatalogError> {
    let mut errors = Vec::new();

    for archetype in archetypes {
        check_archetype(archetype, &mut errors);
    }

    let mut keys = HashSet::new();
    for template in templates {
        if !keys.insert(template.key) {
            errors.push(CatalogError::DuplicateTemplate {
                template: template.key.to_string(),
            });
        }
        match archetypes.iter().find(|a| a.kind == template.kind) {
            Some(archetype) => check_template(archetype, template, &mut errors),
            None => errors.push(malformed(
                template,
                format!("bound to unregistered archetype {}", template.kind),
            )),
        }
    }

    for archetype in archetypes {
        if !templates.iter().any(|t| t.kind == archetype.kind) {
            errors.push(CatalogError::NoTemplates {
                kind: archetype.kind,
            });
        }
    }

    errors
}

fn check_archetype(archetype: &TableArchetype, errors: &mut Vec<CatalogError>) {
    let kind = archetype.kind;

    let identifiers = archetype.columns.iter().filter(|c| c.is_identifier()).count();
    if identifiers != 1 {
        errors.push(CatalogError::IdentifierCount {
            kind,
            count: identifiers,
        });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for column in archetype.columns {
        if !seen.insert(column.name) {
            errors.push(CatalogError::DuplicateColumn {
                kind,
                column: column.name.to_string(),
            });
            continue;
        }
        if let Err(reason) = check_policy(column.ty, &column.source, &seen, column.name) {
            errors.push(CatalogError::InvalidPolicy {
                kind,
                column: column.name.to_string(),
                reason,
            });
        }
    }
}

/// `earlier` holds the names of columns declared before this one (and the
/// column itself).
fn check_policy(
    ty: LogicalType,
    source: &ValueSource,
    earlier: &HashSet<&str>,
    name: &str,
) -> Result<(), String> {
    match (ty, source) {
        (LogicalType::Identifier, ValueSource::Assigned) => Ok(()),
        (_, ValueSource::Assigned) => Err("only identifiers are store-assigned".to_string()),
        (LogicalType::Identifier, _) => Err("identifiers must be store-assigned".to_string()),

        (LogicalType::ShortText { .. }, ValueSource::Words(words)) => {
            if words.is_empty() {
                Err("word list is empty".to_string())
            } else {
                Ok(())
            }
        }
        (LogicalType::ShortText { .. }, ValueSource::EmailFrom { first, last }) => {
            for source_column in [first, last] {
                if *source_column == name || !earlier.contains(source_column) {
                    return Err(format!(
                        "derives from {} which is not an earlier column",
                        source_column
                    ));
                }
            }
            Ok(())
        }
        (LogicalType::Money | LogicalType::BoundedDecimal, ValueSource::Decimal { lo, hi }) => {
            if lo < hi {
                Ok(())
            } else {
                Err(format!("empty decimal range [{}, {})", lo, hi))
            }
        }
        (LogicalType::Integer, ValueSource::Int { lo, hi }) => {
            if lo < hi {
                Ok(())
            } else {
                Err(format!("empty integer range [{}, {})", lo, hi))
            }
        }
        (LogicalType::Date | LogicalType::Timestamp, ValueSource::Past(_)) => Ok(()),
        (ty, source) => Err(format!(
            "{:?} cannot produce values for {}",
            source,
            ty.sql_type()
        )),
    }
}

fn check_template(
    archetype: &TableArchetype,
    template: &TaskTemplate,
    errors: &mut Vec<CatalogError>,
) {
    for column in template.required_columns {
        if !archetype.has_column(column) {
            errors.push(CatalogError::UnknownColumn {
                template: template.key.to_string(),
                kind: archetype.kind,
                column: column.to_string(),
            });
        }
    }

    if !template.query.contains(TABLE_TOKEN) {
        errors.push(malformed(template, "query never references the table"));
    }
    if template.description.contains(TABLE_TOKEN) {
        errors.push(malformed(template, "description exposes the table name"));
    }

    let probe = match template.param {
        ParamKind::None => {
            if template.query.contains(PARAM_TOKEN) || template.description.contains(PARAM_TOKEN) {
                errors.push(malformed(template, "uses a parameter but declares none"));
            }
            None
        }
        ParamKind::IntRange { lo, hi } => {
            if lo > hi {
                errors.push(malformed(template, format!("empty parameter range [{}, {}]", lo, hi)));
            }
            Some(ParamValue::Int(lo))
        }
        ParamKind::DecimalRange { lo, hi } => {
            if lo >= hi {
                errors.push(malformed(template, format!("empty parameter range [{}, {})", lo, hi)));
            }
            Some(ParamValue::Decimal(lo))
        }
    };
    if probe.is_some() && !template.query.contains(PARAM_TOKEN) {
        errors.push(malformed(template, "declares a parameter the query never uses"));
    }

    let rendered = template.render(PROBE_TABLE, probe);
    if let Err(e) = check_read_only(&rendered.reference_query) {
        errors.push(malformed(
            template,
            format!("reference query is not read-only: {}", e),
        ));
    }
}

fn malformed(template: &TaskTemplate, reason: impl Into<String>) -> CatalogError {
    CatalogError::MalformedTemplate {
        template: template.key.to_string(),
        reason: reason.into(),
    }
}

/// Kinds that would be eligible for composition.
pub fn composable_kinds() -> Vec<TableKind> {
    TableKind::ALL
        .into_iter()
        .filter(|kind| templates().iter().any(|t| t.kind == *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{archetype, ColumnSpec};
    use crate::template::Difficulty;

    const NO_WORDS: &[&str] = &[];

    static BROKEN_COLUMNS: [ColumnSpec; 4] = [
        ColumnSpec::new("id", LogicalType::Identifier, ValueSource::Assigned),
        ColumnSpec::new("name", LogicalType::ShortText { max_len: 20 }, ValueSource::Words(NO_WORDS)),
        ColumnSpec::new("name", LogicalType::ShortText { max_len: 20 }, ValueSource::Words(&["a"])),
        ColumnSpec::new(
            "email",
            LogicalType::ShortText { max_len: 80 },
            ValueSource::EmailFrom {
                first: "first_name",
                last: "name",
            },
        ),
    ];

    fn template_for(kind: TableKind) -> TaskTemplate {
        TaskTemplate {
            key: "probe",
            kind,
            difficulty: Difficulty::Easy,
            description: "List everything.",
            query: "SELECT * FROM {table}",
            required_columns: &[],
            param: ParamKind::None,
        }
    }

    #[test]
    fn test_builtin_catalog_is_consistent() {
        assert_eq!(check_catalog(), Vec::new());
        assert_eq!(composable_kinds().len(), TableKind::ALL.len());
    }

    #[test]
    fn test_archetype_without_templates() {
        let archetypes = [archetype(TableKind::Employees).clone(), archetype(TableKind::Orders).clone()];
        let errors = check_catalog_with(&archetypes, &[template_for(TableKind::Employees)]);
        assert_eq!(errors, vec![CatalogError::NoTemplates { kind: TableKind::Orders }]);
    }

    #[test]
    fn test_broken_archetype_reports_each_problem() {
        let broken = TableArchetype {
            kind: TableKind::Customers,
            columns: &BROKEN_COLUMNS,
        };
        let errors = check_catalog_with(&[broken], &[template_for(TableKind::Customers)]);
        assert!(errors.iter().any(|e| matches!(
            e,
            CatalogError::InvalidPolicy { column, .. } if column == "name"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            CatalogError::DuplicateColumn { column, .. } if column == "name"
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            CatalogError::InvalidPolicy { column, .. } if column == "email"
        )));
    }

    #[test]
    fn test_template_requiring_missing_column() {
        let mut template = template_for(TableKind::Products);
        template.required_columns = &["salary"];
        let errors = check_catalog_with(&[archetype(TableKind::Products).clone()], &[template]);
        assert_eq!(
            errors,
            vec![CatalogError::UnknownColumn {
                template: "probe".to_string(),
                kind: TableKind::Products,
                column: "salary".to_string(),
            }]
        );
    }

    #[test]
    fn test_malformed_templates() {
        let products = [archetype(TableKind::Products).clone()];

        let mut no_table = template_for(TableKind::Products);
        no_table.query = "SELECT 1";
        assert!(matches!(
            check_catalog_with(&products, &[no_table]).as_slice(),
            [CatalogError::MalformedTemplate { .. }]
        ));

        let mut undeclared = template_for(TableKind::Products);
        undeclared.query = "SELECT * FROM {table} WHERE price > {param}";
        assert!(!check_catalog_with(&products, &[undeclared]).is_empty());

        let mut writes = template_for(TableKind::Products);
        writes.query = "DELETE FROM {table}";
        assert!(!check_catalog_with(&products, &[writes]).is_empty());
    }

    #[test]
    fn test_duplicate_template_keys() {
        let products = [archetype(TableKind::Products).clone()];
        let t = template_for(TableKind::Products);
        let errors = check_catalog_with(&products, &[t.clone(), t]);
        assert_eq!(
            errors,
            vec![CatalogError::DuplicateTemplate {
                template: "probe".to_string()
            }]
        );
    }
}
