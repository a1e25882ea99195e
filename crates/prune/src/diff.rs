//! Set operations on resource references.
//!
//! All comparisons go through [`ResourceRef::key`], so an object applied
//! as `v1beta1` and stored as `v1` is still the same object.

use kubekit::{Catalog, ResourceRef};
use std::collections::{HashMap, HashSet};

/// `a - b`, keeping the order of `a`.
pub fn subtract(a: &[ResourceRef], b: &[ResourceRef]) -> Vec<ResourceRef> {
    let present: HashSet<_> = b.iter().map(ResourceRef::key).collect();
    a.iter()
        .filter(|r| !present.contains(&r.key()))
        .cloned()
        .collect()
}

/// Objects that occur more than once in `list`, each reported once in
/// order of first occurrence.
pub fn duplicates(list: &[ResourceRef]) -> Vec<ResourceRef> {
    let mut counts: HashMap<_, usize> = HashMap::new();
    for r in list {
        *counts.entry(r.key()).or_default() += 1;
    }

    let mut reported = HashSet::new();
    list.iter()
        .filter(|r| counts[&r.key()] > 1 && reported.insert(r.key()))
        .cloned()
        .collect()
}

/// Objects whose namespace does not fit their type: a namespaced type
/// without a namespace, or a cluster-scoped type with one.
///
/// Types missing from the catalog count as cluster-scoped.
pub fn invalid_namespace(list: &[ResourceRef], catalog: &Catalog) -> Vec<ResourceRef> {
    list.iter()
        .filter(|r| {
            let namespaced = catalog.is_namespaced(r).unwrap_or(false);
            namespaced == r.namespace.is_empty()
        })
        .cloned()
        .collect()
}
