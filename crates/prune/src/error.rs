//! Error types for pruning.

use kubekit::ResourceRef;
use thiserror::Error;

/// Errors that abort a prune.
#[derive(Debug, Error)]
pub enum Error {
    /// Deployed objects whose namespace does not fit their type's scope
    #[error("namespace does not match resource scope: {}", list(.0))]
    InvalidNamespace(Vec<ResourceRef>),

    /// No resource type on the cluster serves the object's group and kind
    #[error("no api-resource for {0}")]
    UnknownResourceType(ResourceRef),

    /// The store object exists but cannot be interpreted
    #[error("store {namespace}/{name}: {message}")]
    Store {
        /// Store namespace
        namespace: String,
        /// Store ConfigMap name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// Deleting an object failed; remaining deletions were not attempted
    #[error("delete {resource}: {source}")]
    Delete {
        /// The object that could not be deleted
        resource: ResourceRef,
        /// Cluster error
        source: kubekit::Error,
    },

    /// Other cluster errors
    #[error(transparent)]
    Cluster(#[from] kubekit::Error),
}

fn list(refs: &[ResourceRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for prune operations.
pub type Result<T> = std::result::Result<T, Error>;
