//! Where a task's subjects come from.

use lodharvest_core::{iri, Error, NamedNode, Result, Term};
use lodharvest_store::GraphStore;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectDefinition {
    /// A fixed list of identifiers.
    Literal(Vec<NamedNode>),
    /// A query over the whole store; its first projected variable supplies
    /// the subjects. Carries its full text, prefix declarations included.
    Query(String),
}

impl SubjectDefinition {
    /// Validate a fixed list. Any non-absolute identifier is a configuration error.
    pub fn literal<I, S>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subjects = values
            .into_iter()
            .map(|v| iri(v.as_ref()).map_err(|e| Error::config(format!("invalid literal subject: {e}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Literal(subjects))
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self::Query(text.into())
    }

    /// Resolve to subject identifiers, in order, without duplicates. Query
    /// rows that do not hold an absolute identifier are dropped with a warning.
    pub async fn resolve(&self, store: &dyn GraphStore) -> Result<Vec<NamedNode>> {
        let query = match self {
            Self::Literal(subjects) => return Ok(dedup(subjects.clone())),
            Self::Query(query) => query,
        };

        let rs = store.select(query, None).await?;
        let Some(variable) = rs.variables().first() else {
            return Err(Error::query("subject query must project a variable"));
        };

        let mut subjects = Vec::new();
        for row in rs.rows() {
            match row.get(variable) {
                Some(Term::NamedNode(node)) => subjects.push(node.clone()),
                Some(Term::Literal(lit)) => match iri(lit.value()) {
                    Ok(node) => subjects.push(node),
                    Err(_) => warn!(value = lit.value(), "dropping subject: not an absolute identifier"),
                },
                Some(other) => warn!(value = %other, "dropping subject: not an identifier"),
                None => debug!(variable = %variable, "unbound subject row"),
            }
        }
        Ok(dedup(subjects))
    }
}

fn dedup(subjects: Vec<NamedNode>) -> Vec<NamedNode> {
    let mut seen = std::collections::HashSet::new();
    subjects.into_iter().filter(|s| seen.insert(s.clone())).collect()
}
