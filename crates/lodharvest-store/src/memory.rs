//! In-memory graph store backed by an oxigraph dataset.
//!
//! Each partition is a named graph; the administrative registry is the
//! reserved admin graph. Writes to one partition (content and its lastmod
//! entry) happen under that partition's lock. Replacing a partition is a
//! single store transaction, so queries never observe it half-written.

use crate::mapper::PartitionMapper;
use crate::store::{GraphStore, ResultSet, Row};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lodharvest_core::vocab::{schema, ADMIN_PARTITION};
use lodharvest_core::{
    parse_quads, parse_timestamp, timestamp_literal, Error, Fact, NamedNode, RdfFormat, Result,
};
use oxigraph::model::{GraphName, GraphNameRef, Quad, Subject};
use oxigraph::sparql::{Query, QueryResults};
use oxigraph::store::{StorageError, Store};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct MemoryGraphStore {
    store: Store,
    mapper: PartitionMapper,
    read_only: bool,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryGraphStore {
    pub fn new() -> Result<Self> {
        Self::with_mapper(PartitionMapper::default())
    }

    pub fn with_mapper(mapper: PartitionMapper) -> Result<Self> {
        Ok(Self {
            store: Store::new().map_err(Error::store)?,
            mapper,
            read_only: false,
            locks: DashMap::new(),
        })
    }

    /// Reject every write from now on.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn partition_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn ensure_writable(&self, op: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly(format!("{op} rejected")));
        }
        Ok(())
    }

    fn admin_entries(&self, graph: Option<&NamedNode>) -> Result<Vec<Quad>> {
        self.store
            .quads_for_pattern(
                graph.map(|g| g.as_ref().into()),
                Some(schema::DATE_MODIFIED),
                None,
                Some(GraphNameRef::NamedNode(ADMIN_PARTITION)),
            )
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::store)
    }

    fn clear_admin_entry(&self, graph: &NamedNode) -> Result<()> {
        for quad in self.admin_entries(Some(graph))? {
            self.store.remove(&quad).map_err(Error::store)?;
        }
        Ok(())
    }

    fn admin_entry(graph: &NamedNode) -> Quad {
        Quad::new(
            graph.clone(),
            schema::DATE_MODIFIED,
            timestamp_literal(Utc::now()),
            NamedNode::from(ADMIN_PARTITION),
        )
    }

    fn touch(&self, graph: &NamedNode) -> Result<()> {
        self.clear_admin_entry(graph)?;
        self.store.insert(&Self::admin_entry(graph)).map_err(Error::store)?;
        Ok(())
    }

    /// Write the whole dataset, admin partition included, as N-Quads.
    pub fn dump_nquads(&self, mut out: impl Write) -> Result<usize> {
        let mut count = 0;
        for quad in self.store.iter() {
            let quad = quad.map_err(Error::store)?;
            writeln!(out, "{quad} .")?;
            count += 1;
        }
        Ok(count)
    }

    /// Load quads previously written by [`dump_nquads`](Self::dump_nquads).
    pub fn load_nquads(&self, bytes: &[u8]) -> Result<usize> {
        self.ensure_writable("load")?;
        let quads = parse_quads(bytes, RdfFormat::NQuads, None)?;
        for quad in &quads {
            self.store.insert(quad).map_err(Error::store)?;
        }
        Ok(quads.len())
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len().map_err(Error::store)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraphStore {
    fn mapper(&self) -> &PartitionMapper {
        &self.mapper
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn insert(&self, facts: Vec<Fact>, partition: Option<&str>) -> Result<()> {
        self.ensure_writable("insert")?;
        let Some(key) = partition else {
            for f in facts {
                let quad = Quad::new(f.subject, f.predicate, f.object, GraphName::DefaultGraph);
                self.store.insert(&quad).map_err(Error::store)?;
            }
            return Ok(());
        };

        let graph = self.mapper.key_to_node(key)?;
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;
        let count = facts.len();
        for f in facts {
            let quad = Quad::new(f.subject, f.predicate, f.object, graph.clone());
            self.store.insert(&quad).map_err(Error::store)?;
        }
        self.touch(&graph)?;
        debug!(partition = key, count, "inserted facts");
        Ok(())
    }

    async fn select(&self, query: &str, partition: Option<&str>) -> Result<ResultSet> {
        let mut parsed = Query::parse(query, None).map_err(Error::query)?;
        match partition {
            Some(key) => {
                let graph = self.mapper.key_to_node(key)?;
                parsed
                    .dataset_mut()
                    .set_default_graph(vec![GraphName::NamedNode(graph)]);
            }
            None => parsed.dataset_mut().set_default_graph_as_union(),
        }

        match self.store.query(parsed).map_err(Error::query)? {
            QueryResults::Boolean(b) => Ok(ResultSet::Boolean(b)),
            QueryResults::Solutions(solutions) => {
                let variables: Vec<String> = solutions
                    .variables()
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect();
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(Error::query)?;
                    let row: Row = solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), term.clone()))
                        .collect();
                    rows.push(row);
                }
                Ok(ResultSet::Solutions { variables, rows })
            }
            QueryResults::Graph(triples) => Ok(ResultSet::Graph(
                triples
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Error::query)?,
            )),
        }
    }

    async fn drop_partition(&self, key: &str) -> Result<()> {
        self.ensure_writable("drop")?;
        let graph = self.mapper.key_to_node(key)?;
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;
        self.store
            .clear_graph(GraphNameRef::NamedNode(graph.as_ref()))
            .map_err(Error::store)?;
        // Only tracked partitions get their lastmod refreshed; dropping an
        // unknown key must not start tracking it.
        if !self.admin_entries(Some(&graph))?.is_empty() {
            self.touch(&graph)?;
        }
        debug!(partition = key, "dropped partition");
        Ok(())
    }

    async fn replace_partition(&self, key: &str, facts: Vec<Fact>) -> Result<()> {
        self.ensure_writable("replace")?;
        let graph = self.mapper.key_to_node(key)?;
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;
        let stale = self.admin_entries(Some(&graph))?;
        let entry = Self::admin_entry(&graph);
        let quads: Vec<Quad> = facts
            .into_iter()
            .map(|f| Quad::new(f.subject, f.predicate, f.object, graph.clone()))
            .collect();
        self.store
            .transaction(|mut t| -> std::result::Result<(), StorageError> {
                t.clear_graph(GraphNameRef::NamedNode(graph.as_ref()))?;
                for quad in &stale {
                    t.remove(quad)?;
                }
                for quad in &quads {
                    t.insert(quad)?;
                }
                t.insert(&entry)?;
                Ok(())
            })
            .map_err(Error::store)?;
        debug!(partition = key, count = quads.len(), "replaced partition");
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.ensure_writable("forget")?;
        let graph = self.mapper.key_to_node(key)?;
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;
        self.clear_admin_entry(&graph)
    }

    async fn lastmod(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let graph = self.mapper.key_to_node(key)?;
        Ok(self
            .admin_entries(Some(&graph))?
            .iter()
            .filter_map(|q| parse_timestamp(&q.object))
            .max())
    }

    async fn known_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .admin_entries(None)?
            .into_iter()
            .filter_map(|q| match q.subject {
                Subject::NamedNode(n) => self.mapper.uri_to_key(n.as_str()),
                _ => None,
            })
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
