//! Decorating store that cleans facts before they are inserted.

use crate::mapper::PartitionMapper;
use crate::store::{GraphStore, ResultSet};
use chrono::{DateTime, Utc};
use lodharvest_core::{Fact, Result, Term};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Wraps any [`GraphStore`]; drops facts with blank literal objects and
/// duplicate facts, then delegates. Everything else passes straight through.
pub struct CleaningStore {
    inner: Arc<dyn GraphStore>,
}

impl CleaningStore {
    pub fn new(inner: Arc<dyn GraphStore>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn GraphStore> {
        &self.inner
    }
}

pub fn clean(facts: Vec<Fact>) -> Vec<Fact> {
    let mut seen = HashSet::new();
    facts
        .into_iter()
        .filter(|f| !matches!(&f.object, Term::Literal(l) if l.value().trim().is_empty()))
        .filter(|f| seen.insert(f.clone()))
        .collect()
}

fn clean_logged(facts: Vec<Fact>) -> Vec<Fact> {
    let before = facts.len();
    let facts = clean(facts);
    if facts.len() != before {
        debug!(removed = before - facts.len(), "cleaned facts before insert");
    }
    facts
}

#[async_trait::async_trait]
impl GraphStore for CleaningStore {
    fn mapper(&self) -> &PartitionMapper {
        self.inner.mapper()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    async fn insert(&self, facts: Vec<Fact>, partition: Option<&str>) -> Result<()> {
        self.inner.insert(clean_logged(facts), partition).await
    }

    async fn replace_partition(&self, key: &str, facts: Vec<Fact>) -> Result<()> {
        self.inner.replace_partition(key, clean_logged(facts)).await
    }

    async fn select(&self, query: &str, partition: Option<&str>) -> Result<ResultSet> {
        self.inner.select(query, partition).await
    }

    async fn drop_partition(&self, key: &str) -> Result<()> {
        self.inner.drop_partition(key).await
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.inner.forget(key).await
    }

    async fn lastmod(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.lastmod(key).await
    }

    async fn known_keys(&self) -> Result<Vec<String>> {
        self.inner.known_keys().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodharvest_core::{fact, iri, Literal};

    #[test]
    fn removes_blank_literals_and_duplicates() {
        let s = iri("https://example.org/s").unwrap();
        let p = iri("https://example.org/p").unwrap();
        let facts = vec![
            fact(s.clone(), p.clone(), Literal::new_simple_literal("x")),
            fact(s.clone(), p.clone(), Literal::new_simple_literal("x")),
            fact(s.clone(), p.clone(), Literal::new_simple_literal("   ")),
            fact(s.clone(), p.clone(), iri("https://example.org/o").unwrap()),
        ];
        let cleaned = clean(facts);
        assert_eq!(cleaned.len(), 2);
    }
}
