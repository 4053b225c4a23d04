//! Task planning
//!
//! The random half of task composition. A [`TaskPlan`] fixes the archetype,
//! template, parameter and row data before any I/O happens; the service
//! layer then provisions a table for the plan and renders it against the
//! physical name.

use chrono::NaiveDateTime;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::CompositionError;
use crate::generator::generate_at;
use crate::schema::{archetypes, TableArchetype};
use crate::template::{compatible_templates, ParamValue, RenderedTemplate, TaskTemplate};
use crate::value::Row;

/// Everything drawn for one task, ready to provision.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub archetype: &'static TableArchetype,
    pub template: &'static TaskTemplate,
    pub param: Option<ParamValue>,
    pub rows: Vec<Row>,
}

impl TaskPlan {
    /// Render the template against the provisioned physical table.
    pub fn render(&self, table: &str) -> RenderedTemplate {
        self.template.render(table, self.param)
    }
}

/// Uniform pick from a slice. `None` on an empty slice.
pub fn pick_uniform<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    items.choose(rng)
}

/// Draw a complete plan.
///
/// Only archetypes with at least one compatible template are candidates, so
/// a registered archetype without templates can never strand a caller with
/// a table it cannot ask anything about.
pub fn draw_plan<R: Rng + ?Sized>(
    rng: &mut R,
    row_count: usize,
    now: NaiveDateTime,
) -> Result<TaskPlan, CompositionError> {
    let eligible: Vec<&'static TableArchetype> = archetypes()
        .iter()
        .filter(|a| !compatible_templates(a.kind).is_empty())
        .collect();

    let archetype = *pick_uniform(&eligible, rng).ok_or(CompositionError::NoArchetypes)?;
    let templates = compatible_templates(archetype.kind);
    let template = *pick_uniform(&templates, rng).ok_or(CompositionError::NoArchetypes)?;
    let param = template.param.draw(rng);
    let rows = generate_at(archetype, row_count, now, rng);

    Ok(TaskPlan {
        archetype,
        template,
        param,
        rows,
    })
}
