//! Pipeline errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A step failed; wraps the cause with the step number and file name
    #[error("##{index:02} {name}: {source}")]
    Step {
        index: usize,
        name: String,
        source: Box<Error>,
    },

    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("unknown action type: {0:?}")]
    UnknownAction(String),

    #[error("timeout waiting for {what} after {attempts} attempts: {last}")]
    Timeout {
        what: String,
        attempts: u32,
        last: String,
    },

    #[error("master vault {}: {message}", .path.display())]
    MasterVault { path: PathBuf, message: String },

    #[error("write output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Template(#[from] tmplkit::Error),

    #[error(transparent)]
    Cluster(#[from] kubekit::Error),

    #[error(transparent)]
    Prune(#[from] prune::Error),
}

impl Error {
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// Annotate with the step that produced this error.
    pub fn in_step(self, index: usize, name: &str) -> Self {
        Self::Step {
            index,
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
