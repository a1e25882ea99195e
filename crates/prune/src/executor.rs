//! Prune engine - reconciles the deployed set against the previous run

use crate::context::ProgressCallback;
use crate::diff::{duplicates, invalid_namespace, subtract};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{PruneOptions, PrunePhase, PruneSummary};
use kubekit::{Catalog, Cluster, ResourceRef, apiresources};

/// Delete what the previous run deployed but `deployed` no longer holds,
/// then record `deployed` as the new previous set.
///
/// Runs the phases of [`PrunePhase`] in order. Validation failures abort
/// before anything is deleted; a failed deletion aborts the remaining
/// deletions and skips the store write.
///
/// # Arguments
/// * `cluster` - Cluster to query and modify
/// * `deployed` - Objects applied by this run, in apply order
/// * `store` - Where the previous set is recorded
/// * `opts` - Dry-run, no-delete and ordering options
/// * `progress` - Progress callback
pub fn prune<C, P>(
    cluster: &C,
    deployed: &[ResourceRef],
    store: &Store,
    opts: PruneOptions,
    progress: &mut P,
) -> Result<PruneSummary>
where
    C: Cluster + ?Sized,
    P: ProgressCallback,
{
    let mut summary = PruneSummary::default();

    progress.on_phase(PrunePhase::QueryResourceTypes);
    let catalog = Catalog::new(apiresources::filter_deployable(cluster.api_resources()?));

    progress.on_phase(PrunePhase::ValidateDeployedSet);
    summary.duplicates = duplicates(deployed);
    for r in &summary.duplicates {
        progress.on_duplicate(r);
    }
    let invalid = invalid_namespace(deployed, &catalog);
    if !invalid.is_empty() {
        return Err(Error::InvalidNamespace(invalid));
    }

    progress.on_phase(PrunePhase::ReadPreviousStore);
    let previous = store.read(cluster)?;
    summary.previous = previous.len();

    progress.on_phase(PrunePhase::ComputeDiff);
    let mut to_delete = subtract(&previous, deployed);

    progress.on_phase(PrunePhase::OrderForDeletion);
    opts.order.policy().order(&mut to_delete);
    let targets = to_delete
        .iter()
        .map(|r| {
            catalog
                .type_name(r)
                .ok_or_else(|| Error::UnknownResourceType(r.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    progress.on_phase(PrunePhase::DeleteEach);
    let total = to_delete.len();
    for (index, (r, resource_type)) in to_delete.iter().zip(&targets).enumerate() {
        if opts.simulate() {
            progress.on_skip(r);
            summary.skipped.push(r.clone());
            continue;
        }
        progress.on_delete(index + 1, total, r);
        cluster
            .delete(resource_type, &r.namespace, &r.name)
            .map_err(|source| Error::Delete {
                resource: r.clone(),
                source,
            })?;
        summary.deleted.push(r.clone());
    }
    summary.to_delete = to_delete;

    progress.on_phase(PrunePhase::WriteStore);
    store.write(cluster, deployed, opts.simulate())?;
    summary.store_written = !opts.simulate();

    progress.on_phase(PrunePhase::Done);
    Ok(summary)
}
