//! Error types for lodharvest

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("store is read-only: {0}")]
    ReadOnly(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("parse error: {format} - {message}")]
    Parse { format: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid path expression '{expr}': {reason}")]
    PathSyntax { expr: String, reason: String },

    #[error("invalid iri '{value}': {reason}")]
    InvalidIri { value: String, reason: String },

    #[error("fetch error: {uri} - {message}")]
    Fetch { uri: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn store(message: impl ToString) -> Self {
        Self::Store(message.to_string())
    }

    pub fn query(message: impl ToString) -> Self {
        Self::Query(message.to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn parse(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn path_syntax(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PathSyntax {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_iri(value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidIri {
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(uri: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            uri: uri.into(),
            message: message.to_string(),
        }
    }
}
