//! Execution reports: what a configuration run asserted and fetched.
//!
//! Reports serialize to YAML for humans and to facts for the store, where
//! they land in the configuration's own partition.

use chrono::{DateTime, Utc};
use lodharvest_core::vocab::{lh, prov, rdf, schema};
use lodharvest_core::{
    boolean_literal, fact, integer_literal, iri, timestamp_literal, Fact, Literal, NamedNode, Result,
};
use serde::{Deserialize, Serialize};

/// One dereference attempt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FetchReport {
    pub uri: String,
    /// Effective URI after redirects; absent when the fetch failed.
    pub source: Option<String>,
    pub media_type: Option<String>,
    pub triple_count: usize,
    pub success: bool,
    pub fetched_at: DateTime<Utc>,
}

impl FetchReport {
    pub fn failed(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            source: None,
            media_type: None,
            triple_count: 0,
            success: false,
            fetched_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PathAssertionReport {
    pub subject: String,
    pub path: String,
    pub asserted_depth: usize,
    pub max_depth: usize,
    pub bounced: bool,
    pub success: bool,
    pub message: String,
    pub fetches: Vec<FetchReport>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskReport {
    pub index: usize,
    /// Set when the task could not start, e.g. its subject query failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assertions: Vec<PathAssertionReport>,
}

impl TaskReport {
    pub fn new(index: usize, assertions: Vec<PathAssertionReport>) -> Self {
        Self {
            index,
            error: None,
            assertions,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            error: Some(error.into()),
            assertions: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.assertions.iter().filter(|a| a.success).count()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ExecutionReport {
    pub run_id: String,
    pub config: String,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub tasks: Vec<TaskReport>,
}

impl ExecutionReport {
    pub fn new(config: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            config: config.into(),
            started: Utc::now(),
            ended: None,
            tasks: Vec::new(),
        }
    }

    pub fn add_task(&mut self, task: TaskReport) {
        self.tasks.push(task);
    }

    pub fn finalize(&mut self) {
        self.ended = Some(Utc::now());
    }

    pub fn assertions(&self) -> impl Iterator<Item = &PathAssertionReport> {
        self.tasks.iter().flat_map(|t| t.assertions.iter())
    }

    pub fn succeeded(&self) -> usize {
        self.assertions().filter(|a| a.success).count()
    }

    pub fn failed(&self) -> usize {
        self.assertions().filter(|a| !a.success).count()
            + self.tasks.iter().filter(|t| t.error.is_some()).count()
    }

    pub fn fetch_count(&self) -> usize {
        self.assertions().map(|a| a.fetches.len()).sum()
    }

    pub fn triple_count(&self) -> usize {
        self.assertions()
            .flat_map(|a| a.fetches.iter())
            .map(|f| f.triple_count)
            .sum()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} task(s), {} assertion(s) ok, {} failed, {} fetch(es), {} triple(s)",
            self.config,
            self.tasks.len(),
            self.succeeded(),
            self.failed(),
            self.fetch_count(),
            self.triple_count(),
        )
    }

    pub fn node(&self) -> Result<NamedNode> {
        iri(&format!("{}{}", lh::RUN_PREFIX, self.run_id))
    }

    /// Facts describing this report, for the configuration partition.
    pub fn to_facts(&self) -> Result<Vec<Fact>> {
        let run = self.node()?;
        let mut facts = vec![
            fact(run.clone(), rdf::TYPE, lh::EXECUTION_REPORT.into_owned()),
            fact(run.clone(), schema::NAME, Literal::new_simple_literal(&self.config)),
            fact(run.clone(), prov::STARTED_AT_TIME, timestamp_literal(self.started)),
        ];
        if let Some(ended) = self.ended {
            facts.push(fact(run.clone(), prov::ENDED_AT_TIME, timestamp_literal(ended)));
        }

        for task in &self.tasks {
            let task_node = iri(&format!("{}/task/{}", run.as_str(), task.index))?;
            facts.push(fact(task_node.clone(), rdf::TYPE, lh::TASK_REPORT.into_owned()));
            facts.push(fact(task_node.clone(), lh::REPORT, run.clone()));
            facts.push(fact(task_node.clone(), lh::TASK_INDEX, integer_literal(task.index)));
            if let Some(error) = &task.error {
                facts.push(fact(task_node.clone(), schema::DESCRIPTION, Literal::new_simple_literal(error)));
            }

            for (j, a) in task.assertions.iter().enumerate() {
                let node = iri(&format!("{}/assertion/{j}", task_node.as_str()))?;
                facts.push(fact(node.clone(), rdf::TYPE, lh::PATH_ASSERTION.into_owned()));
                facts.push(fact(node.clone(), lh::TASK, task_node.clone()));
                facts.push(fact(node.clone(), lh::SUBJECT, iri(&a.subject)?));
                facts.push(fact(node.clone(), lh::PATH, Literal::new_simple_literal(&a.path)));
                facts.push(fact(node.clone(), lh::ASSERTED_DEPTH, integer_literal(a.asserted_depth)));
                facts.push(fact(node.clone(), lh::MAX_DEPTH, integer_literal(a.max_depth)));
                facts.push(fact(node.clone(), lh::BOUNCED, boolean_literal(a.bounced)));
                facts.push(fact(node.clone(), lh::SUCCESS, boolean_literal(a.success)));
                facts.push(fact(node.clone(), schema::DESCRIPTION, Literal::new_simple_literal(&a.message)));

                for (k, f) in a.fetches.iter().enumerate() {
                    let download = iri(&format!("{}/fetch/{k}", node.as_str()))?;
                    facts.push(fact(download.clone(), rdf::TYPE, schema::DATA_DOWNLOAD.into_owned()));
                    facts.push(fact(download.clone(), lh::TASK, task_node.clone()));
                    facts.push(fact(download.clone(), schema::CONTENT_URL, iri(f.source.as_deref().unwrap_or(&f.uri))?));
                    facts.push(fact(download.clone(), lh::TRIPLE_COUNT, integer_literal(f.triple_count)));
                    facts.push(fact(download.clone(), lh::SUCCESS, boolean_literal(f.success)));
                    facts.push(fact(download.clone(), schema::DATE_CREATED, timestamp_literal(f.fetched_at)));
                    if let Some(media_type) = &f.media_type {
                        facts.push(fact(download, schema::ENCODING_FORMAT, Literal::new_simple_literal(media_type)));
                    }
                }
            }
        }
        Ok(facts)
    }
}
