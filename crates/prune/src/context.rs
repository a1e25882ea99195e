//! Progress reporting
//!
//! The prune engine reports through this trait so it can be driven from a
//! terminal UI or silently from tests.

use crate::types::PrunePhase;
use kubekit::ResourceRef;

/// Progress callback for prune runs
pub trait ProgressCallback {
    /// Called when a phase starts
    fn on_phase(&mut self, phase: PrunePhase);

    /// Called for objects applied more than once
    fn on_duplicate(&mut self, resource: &ResourceRef);

    /// Called before an object is deleted (`index` is 1-based)
    fn on_delete(&mut self, index: usize, total: usize, resource: &ResourceRef);

    /// Called when a deletion is skipped
    fn on_skip(&mut self, resource: &ResourceRef);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase(&mut self, _phase: PrunePhase) {}
    fn on_duplicate(&mut self, _resource: &ResourceRef) {}
    fn on_delete(&mut self, _index: usize, _total: usize, _resource: &ResourceRef) {}
    fn on_skip(&mut self, _resource: &ResourceRef) {}
}

/// Progress callback writing to the log
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_phase(&mut self, phase: PrunePhase) {
        log::debug!("prune: {phase}");
    }

    fn on_duplicate(&mut self, resource: &ResourceRef) {
        log::warn!("prune: applied more than once: {resource}");
    }

    fn on_delete(&mut self, index: usize, total: usize, resource: &ResourceRef) {
        log::info!("prune: [{index}/{total}] delete {resource}");
    }

    fn on_skip(&mut self, resource: &ResourceRef) {
        log::warn!("prune: skip delete {resource}");
    }
}
