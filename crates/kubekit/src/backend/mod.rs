//! Backend abstraction for cluster operations.
//!
//! The [`Cluster`] trait is the seam between the deployment logic and the
//! cluster CLI, allowing for different implementations (real `kubectl`,
//! fakes for testing).

pub mod kubectl;

use crate::error::Result;
use crate::tunnel::CancelToken;
use crate::types::ApiResource;

/// Backend trait for cluster operations.
pub trait Cluster: Send + Sync {
    /// Apply one manifest document; returns kubectl's stdout.
    ///
    /// With `dry_run` the server state is left untouched.
    fn apply(&self, manifest: &str, dry_run: bool) -> Result<String>;

    /// Delete one object. `resource_type` is a name accepted by kubectl,
    /// e.g. `deployments.apps`; `namespace` is empty for cluster-scoped types.
    fn delete(&self, resource_type: &str, namespace: &str, name: &str) -> Result<()>;

    /// Fetch one object as JSON.
    ///
    /// A missing object is reported as [`crate::Error::NotFound`].
    fn get(&self, resource_type: &str, namespace: &str, name: &str)
    -> Result<serde_json::Value>;

    /// List the resource types served by the cluster.
    fn api_resources(&self) -> Result<Vec<ApiResource>>;

    /// Run one `kubectl wait` with the given flags; returns its stdout.
    fn wait(&self, flags: &str) -> Result<String>;

    /// Run `kubectl port-forward` with the given flags until the process
    /// exits or `cancel` fires.
    fn port_forward(&self, flags: &str, cancel: &CancelToken) -> Result<()>;
}

/// Get the default backend (`kubectl` on the PATH).
pub fn default_backend() -> kubectl::Kubectl {
    kubectl::Kubectl::new("kubectl")
}
