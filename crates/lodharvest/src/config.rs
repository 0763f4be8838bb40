//! Harvest configurations and the snooze gate.
//!
//! A configuration file names its prefixes, a snooze threshold and a list of
//! assert tasks. Before tasks are built, the gate compares the configuration's
//! own partition lastmod with the source mtime and the threshold; a fresh,
//! unedited configuration yields no tasks.

use crate::path::AssertPath;
use crate::prefix::PrefixMap;
use crate::subject::SubjectDefinition;
use chrono::{DateTime, Duration, Utc};
use lodharvest_core::{minutes_saturating, Error, Result};
use lodharvest_store::GraphStore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    snooze_till_graph_age_minutes: u64,
    #[serde(default)]
    prefix: BTreeMap<String, String>,
    assert: Option<Vec<RawTask>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
    subjects: RawSubjects,
    #[serde(default)]
    paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSubjects {
    literal: Option<Vec<String>>,
    #[serde(rename = "SPARQL", alias = "sparql", alias = "query")]
    sparql: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub subjects: SubjectDefinition,
    pub paths: Vec<AssertPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    /// No lastmod recorded for the configuration.
    NeverRun,
    /// The source was edited after the last recorded run.
    SourceChanged,
    /// The recorded run is older than the threshold.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed(GateReason),
    /// Recorded data is still fresh; `remaining` until the threshold passes.
    Snooze { age: Duration, remaining: Duration },
}

impl GateDecision {
    pub fn is_snoozed(&self) -> bool {
        matches!(self, Self::Snooze { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub name: String,
    pub prefixes: PrefixMap,
    pub snooze_minutes: u64,
    pub source_modified: Option<DateTime<Utc>>,
    pub gate: GateDecision,
    /// Empty when snoozed.
    pub tasks: Vec<Task>,
}

impl Configuration {
    pub fn is_snoozed(&self) -> bool {
        self.gate.is_snoozed()
    }
}

/// Builds configurations against a store, which backs the snooze gate.
pub struct ConfigBuilder {
    store: Arc<dyn GraphStore>,
    reference: Option<DateTime<Utc>>,
}

impl ConfigBuilder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store, reference: None }
    }

    /// Evaluate the gate as of `reference` instead of now.
    pub fn at(mut self, reference: DateTime<Utc>) -> Self {
        self.reference = Some(reference);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.reference.unwrap_or_else(Utc::now)
    }

    pub async fn gate(&self, name: &str, source_modified: Option<DateTime<Utc>>, snooze_minutes: u64) -> GateDecision {
        let lastmod = match self.store.lastmod(name).await {
            Ok(Some(ts)) => ts,
            Ok(None) => return GateDecision::Proceed(GateReason::NeverRun),
            Err(e) => {
                error!(config = name, error = %e, "lastmod lookup failed");
                return GateDecision::Proceed(GateReason::NeverRun);
            }
        };
        if source_modified.is_some_and(|m| m > lastmod) {
            return GateDecision::Proceed(GateReason::SourceChanged);
        }
        let reference = self.now();
        if !self.store.verify_max_age(name, snooze_minutes, reference).await {
            return GateDecision::Proceed(GateReason::Stale);
        }
        let age = (reference - lastmod).max(Duration::zero());
        GateDecision::Snooze {
            age,
            remaining: minutes_saturating(snooze_minutes) - age,
        }
    }

    pub async fn build_from_str(
        &self,
        name: &str,
        source: &str,
        source_modified: Option<DateTime<Utc>>,
    ) -> Result<Configuration> {
        let raw: RawConfig = serde_yaml::from_str(source)
            .map_err(|e| Error::config(format!("{name}: {e}")))?;
        let raw_tasks = raw
            .assert
            .ok_or_else(|| Error::config(format!("{name}: missing 'assert'")))?;

        let mut prefixes = PrefixMap::with_defaults();
        prefixes.extend(raw.prefix);

        let gate = self.gate(name, source_modified, raw.snooze_till_graph_age_minutes).await;
        let tasks = match gate {
            GateDecision::Snooze { age, remaining } => {
                info!(
                    config = name,
                    age_minutes = age.num_minutes(),
                    remaining_minutes = remaining.num_minutes(),
                    "snoozed: recorded data still fresh"
                );
                Vec::new()
            }
            GateDecision::Proceed(reason) => {
                debug!(config = name, ?reason, "gate passed");
                raw_tasks
                    .into_iter()
                    .enumerate()
                    .map(|(i, t)| build_task(name, i, t, &prefixes))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(Configuration {
            name: name.to_string(),
            prefixes,
            snooze_minutes: raw.snooze_till_graph_age_minutes,
            source_modified,
            gate,
            tasks,
        })
    }

    /// Name is the file stem; source time is the file mtime.
    pub async fn build_from_path(&self, path: &Path) -> Result<Configuration> {
        let name = config_name(path)?;
        let source = tokio::fs::read_to_string(path).await?;
        let modified = tokio::fs::metadata(path)
            .await?
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        self.build_from_str(&name, &source, modified).await
    }

    /// Every `*.yml` / `*.yaml` in `dir`, sorted by path. One bad file never
    /// affects the others.
    pub async fn build_from_dir(&self, dir: &Path) -> Result<Vec<(PathBuf, Result<Configuration>)>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));
            if is_yaml && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let built = self.build_from_path(&path).await;
            if let Err(e) = &built {
                error!(path = %path.display(), error = %e, "config skipped");
            }
            out.push((path, built));
        }
        Ok(out)
    }
}

pub fn config_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::config(format!("cannot derive a name from {}", path.display())))
}

fn build_task(name: &str, index: usize, raw: RawTask, prefixes: &PrefixMap) -> Result<Task> {
    let subjects = match (raw.subjects.literal, raw.subjects.sparql) {
        (Some(list), None) => SubjectDefinition::literal(list)?,
        (None, Some(query)) => {
            SubjectDefinition::query(format!("{}{}", prefixes.sparql_prologue(), query))
        }
        (Some(_), Some(_)) => {
            return Err(Error::config(format!(
                "{name}: task {index}: subjects must be either 'literal' or 'SPARQL', not both"
            )))
        }
        (None, None) => {
            return Err(Error::config(format!(
                "{name}: task {index}: subjects need 'literal' or 'SPARQL'"
            )))
        }
    };
    if raw.paths.is_empty() {
        return Err(Error::config(format!("{name}: task {index}: no paths")));
    }
    let paths = raw
        .paths
        .iter()
        .map(|p| AssertPath::parse(p, prefixes))
        .collect::<Result<Vec<_>>>()?;
    Ok(Task { subjects, paths })
}
