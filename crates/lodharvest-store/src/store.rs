//! Graph store contract shared by the in-memory and remote variants.

use crate::mapper::PartitionMapper;
use chrono::{DateTime, Duration, Utc};
use lodharvest_core::{minutes_saturating, Fact, Result, Term};
use std::collections::BTreeMap;

/// One solution row: variable name -> bound term. Unbound variables are absent.
pub type Row = BTreeMap<String, Term>;

/// Result of a read-only query.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultSet {
    Boolean(bool),
    Solutions { variables: Vec<String>, rows: Vec<Row> },
    Graph(Vec<Fact>),
}

impl ResultSet {
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Solutions { rows, .. } => rows,
            _ => &[],
        }
    }

    pub fn variables(&self) -> &[String] {
        match self {
            Self::Solutions { variables, .. } => variables,
            _ => &[],
        }
    }

    pub fn boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(_) => 1,
            Self::Solutions { rows, .. } => rows.len(),
            Self::Graph(facts) => facts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bindings of `variable` across all rows, skipping rows where it is unbound.
    pub fn column<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.rows().iter().filter_map(move |row| row.get(variable))
    }
}

/// Partitioned triple store with per-partition last-modified tracking.
///
/// Partition lastmods live in a reserved administrative partition, never in
/// the partition itself. `drop_partition` keeps the lastmod entry; only
/// `forget` removes it.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    fn mapper(&self) -> &PartitionMapper;

    fn is_read_only(&self) -> bool;

    /// Add facts, into `partition` when given. Refreshes the partition lastmod.
    async fn insert(&self, facts: Vec<Fact>, partition: Option<&str>) -> Result<()>;

    /// Run a read-only query, scoped to one partition or to the whole store.
    async fn select(&self, query: &str, partition: Option<&str>) -> Result<ResultSet>;

    /// Remove the partition's content. The lastmod entry stays (and is refreshed).
    async fn drop_partition(&self, key: &str) -> Result<()>;

    /// Swap the partition's content for `facts` and refresh its lastmod.
    ///
    /// Backends that can do so make the swap atomic for readers. The default
    /// is a drop followed by an insert, which leaves a short window where the
    /// partition looks empty.
    async fn replace_partition(&self, key: &str, facts: Vec<Fact>) -> Result<()> {
        self.drop_partition(key).await?;
        self.insert(facts, Some(key)).await
    }

    /// Remove the partition's lastmod entry. Content is untouched.
    async fn forget(&self, key: &str) -> Result<()>;

    /// Last-modified timestamp, `None` for unknown or forgotten keys.
    async fn lastmod(&self, key: &str) -> Result<Option<DateTime<Utc>>>;

    /// Every key with a live lastmod entry, content or not.
    async fn known_keys(&self) -> Result<Vec<String>>;

    async fn age_of(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .lastmod(key)
            .await?
            .map(|ts| (Utc::now() - ts).max(Duration::zero())))
    }

    /// True when the partition was modified less than `minutes` before
    /// `reference`. Unknown partitions and lookup failures yield false.
    async fn verify_max_age(&self, key: &str, minutes: u64, reference: DateTime<Utc>) -> bool {
        match self.lastmod(key).await {
            Ok(Some(ts)) => reference - ts < minutes_saturating(minutes),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(partition = key, error = %e, "lastmod lookup failed");
                false
            }
        }
    }
}
