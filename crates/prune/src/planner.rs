//! Deletion ordering.
//!
//! Objects to delete arrive in the order they were applied by the previous
//! run. A [`DeletePolicy`] rearranges them before deletion.

use kubekit::ResourceRef;
use std::fmt;
use std::str::FromStr;

/// Decides the order in which objects are deleted.
pub trait DeletePolicy {
    /// Reorder `list` in place. `list` starts in apply order.
    fn order(&self, list: &mut Vec<ResourceRef>);
}

/// Last applied, first deleted.
pub struct Lifo;

impl DeletePolicy for Lifo {
    fn order(&self, list: &mut Vec<ResourceRef>) {
        list.reverse();
    }
}

/// Delete by kind: webhook configurations first, namespaced objects before
/// cluster-scoped ones, traffic-facing objects before workloads.
///
/// The sort is stable, so objects of equal rank keep their apply order.
pub struct KindPriority;

const WEBHOOKS: &[&str] = &["MutatingWebhookConfiguration", "ValidatingWebhookConfiguration"];

const KIND_RANKS: &[&[&str]] = &[
    &["APIService", "Ingress", "Service"],
    &["CronJob", "Job", "StatefulSet"],
    &["HorizontalPodAutoscaler"],
    &["Deployment", "ReplicaSet", "ReplicationController", "Pod", "DaemonSet"],
];

fn kind_rank(kind: &str) -> usize {
    if kind == "CustomResourceDefinition" {
        return KIND_RANKS.len() + 1;
    }
    KIND_RANKS
        .iter()
        .position(|kinds| kinds.contains(&kind))
        .unwrap_or(KIND_RANKS.len())
}

impl DeletePolicy for KindPriority {
    fn order(&self, list: &mut Vec<ResourceRef>) {
        list.sort_by_key(|r| {
            (
                !WEBHOOKS.contains(&r.kind.as_str()),
                r.namespace.is_empty(),
                kind_rank(&r.kind),
            )
        });
    }
}

/// The built-in policies, selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteOrder {
    /// See [`Lifo`]
    #[default]
    Lifo,
    /// See [`KindPriority`]
    KindPriority,
}

impl DeleteOrder {
    /// The policy implementing this order.
    pub fn policy(self) -> &'static dyn DeletePolicy {
        match self {
            Self::Lifo => &Lifo,
            Self::KindPriority => &KindPriority,
        }
    }

    /// Names accepted by [`FromStr`].
    pub fn names() -> &'static [&'static str] {
        &["lifo", "kind-priority"]
    }
}

impl fmt::Display for DeleteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifo => write!(f, "lifo"),
            Self::KindPriority => write!(f, "kind-priority"),
        }
    }
}

impl FromStr for DeleteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lifo" => Ok(Self::Lifo),
            "kind-priority" => Ok(Self::KindPriority),
            other => Err(format!(
                "unknown delete order '{other}', expected one of: {}",
                Self::names().join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(kind: &str, ns: &str, name: &str) -> ResourceRef {
        ResourceRef::new("v1", kind, ns, name)
    }

    fn names(list: &[ResourceRef]) -> Vec<&str> {
        list.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_lifo_reverses_apply_order() {
        let mut list = vec![r("Namespace", "", "a"), r("ConfigMap", "a", "b"), r("Pod", "a", "c")];
        DeleteOrder::Lifo.policy().order(&mut list);
        assert_eq!(names(&list), ["c", "b", "a"]);
    }

    #[test]
    fn test_kind_priority() {
        let mut list = vec![
            r("CustomResourceDefinition", "", "crd"),
            r("Namespace", "", "ns"),
            r("Deployment", "ns", "deploy"),
            r("ConfigMap", "ns", "cm"),
            r("HorizontalPodAutoscaler", "ns", "hpa"),
            r("Service", "ns", "svc"),
            r("StatefulSet", "ns", "sts"),
            r("ValidatingWebhookConfiguration", "", "hook"),
            r("ClusterRole", "", "role"),
        ];
        DeleteOrder::KindPriority.policy().order(&mut list);
        assert_eq!(
            names(&list),
            ["hook", "svc", "sts", "hpa", "deploy", "cm", "ns", "role", "crd"]
        );
    }

    #[test]
    fn test_kind_priority_is_stable() {
        let mut list = vec![r("Pod", "ns", "first"), r("Pod", "ns", "second")];
        KindPriority.order(&mut list);
        assert_eq!(names(&list), ["first", "second"]);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("lifo".parse::<DeleteOrder>().unwrap(), DeleteOrder::Lifo);
        assert_eq!(
            "kind-priority".parse::<DeleteOrder>().unwrap(),
            DeleteOrder::KindPriority
        );
        assert!("random".parse::<DeleteOrder>().is_err());
        assert_eq!(DeleteOrder::KindPriority.to_string(), "kind-priority");
    }
}
