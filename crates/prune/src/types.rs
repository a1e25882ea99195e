//! Core types for pruning

use crate::planner::DeleteOrder;
use kubekit::ResourceRef;
use std::fmt;

/// Options for a prune run
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOptions {
    /// Don't change the cluster; deletions are skipped and the store write
    /// is a client-side dry run
    pub dry_run: bool,
    /// Skip deletions; the store write is a client-side dry run
    pub no_delete: bool,
    /// Order in which objects are deleted
    pub order: DeleteOrder,
}

impl PruneOptions {
    /// Whether deletions and the store write are only simulated.
    pub fn simulate(&self) -> bool {
        self.dry_run || self.no_delete
    }
}

/// Stages of a prune run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrunePhase {
    QueryResourceTypes,
    ValidateDeployedSet,
    ReadPreviousStore,
    ComputeDiff,
    OrderForDeletion,
    DeleteEach,
    WriteStore,
    Done,
}

impl fmt::Display for PrunePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QueryResourceTypes => "query resource types",
            Self::ValidateDeployedSet => "validate deployed set",
            Self::ReadPreviousStore => "read previous store",
            Self::ComputeDiff => "compute diff",
            Self::OrderForDeletion => "order for deletion",
            Self::DeleteEach => "delete",
            Self::WriteStore => "write store",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Summary of a prune run
#[derive(Debug, Clone, Default)]
pub struct PruneSummary {
    /// Objects applied more than once in this run
    pub duplicates: Vec<ResourceRef>,
    /// Number of objects in the previous store
    pub previous: usize,
    /// Objects in the previous store but not deployed now, in deletion order
    pub to_delete: Vec<ResourceRef>,
    /// Objects actually deleted
    pub deleted: Vec<ResourceRef>,
    /// Objects whose deletion was skipped (dry run / no delete)
    pub skipped: Vec<ResourceRef>,
    /// Whether the store was written for real (not as a dry run)
    pub store_written: bool,
}

impl PruneSummary {
    /// Whether the run changed the cluster.
    pub fn has_changes(&self) -> bool {
        !self.deleted.is_empty() || self.store_written
    }
}
