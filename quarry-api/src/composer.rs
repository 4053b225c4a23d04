//! Task Composer
//!
//! Draws a plan, provisions its table, renders the template against the
//! physical name and records the task.

use chrono::Utc;
use quarry_core::{
    draw_plan, CompositionError, EngineConfig, InstanceProvisioner, Task, TaskId, TaskStore,
    TaskView,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::Instrument;

use crate::telemetry::METRICS;

/// Source of the random generator used for one composition.
pub type RngSource = dyn Fn() -> StdRng + Send + Sync;

pub struct TaskComposer {
    provisioner: Arc<dyn InstanceProvisioner>,
    store: Arc<dyn TaskStore>,
    config: EngineConfig,
    rng: Box<RngSource>,
}

impl TaskComposer {
    pub fn new(
        provisioner: Arc<dyn InstanceProvisioner>,
        store: Arc<dyn TaskStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provisioner,
            store,
            config,
            rng: Box::new(|| StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Replace the per-composition random source, e.g. with a seeded one.
    pub fn with_rng<F>(mut self, rng: F) -> Self
    where
        F: Fn() -> StdRng + Send + Sync + 'static,
    {
        self.rng = Box::new(rng);
        self
    }

    /// Compose one task and return its learner-facing view.
    ///
    /// The whole operation is bounded by the configured compose timeout. A
    /// table created before a timeout or store failure is left in place.
    pub async fn compose(&self) -> Result<TaskView, CompositionError> {
        let limit = self.config.compose_timeout;
        let span = tracing::info_span!("compose_task");
        match tokio::time::timeout(limit, self.compose_inner().instrument(span)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis(), "Task composition timed out");
                Err(CompositionError::Timeout(limit))
            }
        }
    }

    async fn compose_inner(&self) -> Result<TaskView, CompositionError> {
        let plan = {
            let mut rng = (self.rng)();
            draw_plan(&mut rng, self.config.row_count, Utc::now().naive_utc())?
        };

        let instance = self.provisioner.provision(plan.archetype, &plan.rows).await?;
        let rendered = plan.render(&instance.name);

        let task = Task {
            id: TaskId::generate(),
            description: rendered.description,
            table_name: instance.name,
            kind: instance.kind,
            template: plan.template.key.to_string(),
            difficulty: plan.template.difficulty,
            created_at: Utc::now(),
            reference_query: rendered.reference_query,
        };
        let view = task.view();

        tracing::info!(
            task_id = %task.id,
            table = %task.table_name,
            template = %task.template,
            difficulty = %task.difficulty,
            rows = instance.row_count,
            "Task composed"
        );

        let archetype = task.kind.to_string();
        let difficulty = task.difficulty.to_string();
        self.store.insert(task).await?;

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_task_composed(&archetype, &difficulty);
        }

        Ok(view)
    }
}
