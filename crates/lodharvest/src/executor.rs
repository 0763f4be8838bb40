//! Task executor: tasks -> subjects -> paths, one report per configuration run.
//!
//! Assertions within a task run on a bounded pool. The execution report is
//! persisted into the configuration's partition after every task, so an
//! interrupted run still leaves the completed tasks on record.

use crate::assertion::{AssertionArena, PathAssertion};
use crate::config::{Configuration, Task};
use crate::engine::AssertionEngine;
use crate::report::{ExecutionReport, TaskReport};
use futures::stream::{self, StreamExt};
use lodharvest_core::Result;
use tracing::{error, info, warn};

pub struct TaskExecutor {
    engine: AssertionEngine,
    concurrency: usize,
}

impl TaskExecutor {
    pub fn new(engine: AssertionEngine) -> Self {
        Self {
            engine,
            concurrency: 1,
        }
    }

    /// Number of assertions driven at once; 1 is strictly sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn engine(&self) -> &AssertionEngine {
        &self.engine
    }

    /// Run every task of `config`. A snoozed configuration runs nothing and
    /// yields `None`; nothing is persisted for it. Only store errors while
    /// persisting the report are fatal.
    pub async fn execute(&self, config: &Configuration) -> Result<Option<ExecutionReport>> {
        if config.is_snoozed() {
            info!(config = %config.name, "skipping snoozed configuration");
            return Ok(None);
        }

        let mut report = ExecutionReport::new(&config.name);
        info!(config = %config.name, run = %report.run_id, tasks = config.tasks.len(), "run started");

        for (index, task) in config.tasks.iter().enumerate() {
            if self.engine.cancellation().is_cancelled() {
                warn!(config = %config.name, remaining = config.tasks.len() - index, "cancelled, not starting further tasks");
                break;
            }
            let task_report = self.run_task(index, task).await;
            report.add_task(task_report);
            report.finalize();
            self.persist(&report).await?;
        }

        // a configuration without tasks still records that it ran
        if config.tasks.is_empty() {
            report.finalize();
            self.persist(&report).await?;
        }
        info!(config = %config.name, "{}", report.summary());
        Ok(Some(report))
    }

    pub async fn run_task(&self, index: usize, task: &Task) -> TaskReport {
        let subjects = match task.subjects.resolve(self.engine.store().as_ref()).await {
            Ok(subjects) => subjects,
            Err(e) => {
                error!(task = index, error = %e, "subject resolution failed");
                return TaskReport::failed(index, e.to_string());
            }
        };

        let mut arena = AssertionArena::new();
        for subject in &subjects {
            for path in &task.paths {
                arena.insert(PathAssertion::new(subject.clone(), path.clone()));
            }
        }
        info!(task = index, subjects = subjects.len(), assertions = arena.len(), "task started");

        let engine = &self.engine;
        stream::iter(arena.iter_mut())
            .for_each_concurrent(self.concurrency, |assertion| async move {
                if engine.cancellation().is_cancelled() {
                    assertion.abort("cancelled before start");
                    return;
                }
                engine.run(assertion).await;
            })
            .await;

        TaskReport::new(index, arena.into_reports())
    }

    /// Replace the configuration partition with the current report.
    async fn persist(&self, report: &ExecutionReport) -> Result<()> {
        let store = self.engine.store();
        let facts = report.to_facts()?;
        let count = facts.len();
        store.replace_partition(&report.config, facts).await?;
        info!(config = %report.config, facts = count, "report persisted");
        Ok(())
    }
}
