//! Core types for cluster operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Resource references
// ============================================================================

/// Identity of one cluster object.
///
/// Two references denote the same object when everything but `version`
/// matches; see [`ResourceRef::key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version within the group
    #[serde(default)]
    pub version: String,
    /// Object kind, e.g. `Deployment`
    pub kind: String,
    /// Namespace, empty for cluster-scoped objects
    #[serde(default)]
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ResourceRef {
    /// Build a reference from a manifest's `apiVersion` and `kind`.
    ///
    /// `"apps/v1"` yields group `apps`, `"v1"` the core group.
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// The `apiVersion` string for this reference.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Identity used for diffing and duplicate detection; ignores version.
    pub fn key(&self) -> (&str, &str, &str, &str) {
        (&self.group, &self.kind, &self.namespace, &self.name)
    }

    /// Whether two references address the same object.
    pub fn same_object(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.api_version(), self.kind)?;
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Split `group/version` into its parts; a bare version is the core group.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

// ============================================================================
// Resource types
// ============================================================================

/// A resource type as reported by `kubectl api-resources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResource {
    /// Plural resource name, e.g. `deployments`
    pub name: String,
    /// API group, empty for the core group
    pub group: String,
    /// Preferred version, empty when the table does not report one
    pub version: String,
    /// Kind served by this resource
    pub kind: String,
    /// Whether objects of this type live in a namespace
    pub namespaced: bool,
}

impl ApiResource {
    /// Name accepted by `kubectl delete`/`get`: `name` or `name.group`.
    pub fn type_name(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.group)
        }
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// When a retry loop gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// After this many attempts (including the first)
    Attempts(u32),
    /// Once this much time has passed since the first attempt
    Deadline(Duration),
}

/// Exponential backoff schedule shared by every retrying call site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay after the first failed attempt
    pub initial: Duration,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// When to give up
    pub bound: Bound,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            bound: Bound::Attempts(10),
        }
    }
}

impl Backoff {
    /// Default schedule bounded by an attempt count.
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            bound: Bound::Attempts(max_attempts),
            ..Default::default()
        }
    }

    /// Default schedule bounded by elapsed time.
    pub fn deadline(deadline: Duration) -> Self {
        Self {
            bound: Bound::Deadline(deadline),
            ..Default::default()
        }
    }

    /// Replace the initial delay.
    #[must_use]
    pub fn with_initial(mut self, initial: Duration) -> Self {
        self.initial = initial;
        self
    }

    /// Replace the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// A schedule that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::attempts(1)
    }

    /// Calculate the delay after a failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial.as_nanos() as f64 * self.factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_nanos() as f64);
        Duration::from_nanos(capped as u64)
    }
}
