//! lodharvest core - shared error type, facts and report vocabulary

pub mod error;
pub mod types;
pub mod vocab;

pub use error::{Error, Result};
pub use oxigraph::io::RdfFormat;
pub use oxigraph::model::{Literal, NamedNode, Term, Triple};
pub use types::*;
