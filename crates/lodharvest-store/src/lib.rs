//! lodharvest store - partitioned triple stores with staleness tracking
//!
//! Two backends share the [`GraphStore`] contract: an in-memory dataset and a
//! remote SPARQL endpoint pair. [`CleaningStore`] decorates either one.

pub mod cleaning;
pub mod mapper;
pub mod memory;
pub mod sparql;
pub mod store;

pub use cleaning::CleaningStore;
pub use mapper::{PartitionMapper, DEFAULT_BASE};
pub use memory::MemoryGraphStore;
pub use sparql::{SparqlGraphStore, UnionGraph};
pub use store::{GraphStore, ResultSet, Row};
