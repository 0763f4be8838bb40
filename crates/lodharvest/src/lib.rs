//! lodharvest - configuration-driven linked-data harvesting
//!
//! Walks declared property paths from a set of subjects over a partitioned
//! graph store, dereferences resources on demand and records what it
//! confirmed and fetched.

pub mod assertion;
pub mod config;
pub mod engine;
pub mod executor;
pub mod path;
pub mod prefix;
pub mod report;
pub mod settings;
pub mod subject;

pub use assertion::{AssertionArena, AssertionId, FetchReason, PathAssertion, Step};
pub use config::{config_name, ConfigBuilder, Configuration, GateDecision, GateReason, Task};
pub use engine::AssertionEngine;
pub use executor::TaskExecutor;
pub use path::AssertPath;
pub use prefix::{PrefixMap, DEFAULT_PREFIXES};
pub use report::{ExecutionReport, FetchReport, PathAssertionReport, TaskReport};
pub use settings::{ExecutorSettings, FetchSettings, HarvestSettings, StoreSettings};
pub use subject::SubjectDefinition;
