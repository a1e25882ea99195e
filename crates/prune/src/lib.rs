//! # Prune
//!
//! Removal of objects that an earlier deployment created and the current
//! one no longer produces.
//!
//! Every run records the objects it applied in a [`Store`] ConfigMap. The
//! next run compares its own set against that record and deletes the
//! difference, then overwrites the record.
//!
//! ## Core Concepts
//!
//! - **Deployed set**: the [`kubekit::ResourceRef`]s applied by this run, in apply order
//! - **Store**: the ConfigMap holding the previous run's deployed set
//! - **Delete order**: a [`DeletePolicy`] arranging the objects to delete
//! - **Phases**: the fixed stages of a run, see [`PrunePhase`]
//!
//! ## Example
//!
//! ```no_run
//! use kubekit::{ResourceRef, backend::kubectl::Kubectl};
//! use prune::{LogProgress, PruneOptions, Store, prune};
//!
//! let kubectl = Kubectl::new("kubectl");
//! let deployed = vec![ResourceRef::new("v1", "Namespace", "", "web")];
//! let store = Store::new("default", "web-deployed");
//!
//! let summary = prune(&kubectl, &deployed, &store, PruneOptions::default(), &mut LogProgress)?;
//! println!("deleted {} objects", summary.deleted.len());
//! # Ok::<(), prune::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`kubekit::Cluster`]: the cluster being pruned
//! - [`ProgressCallback`]: receives progress updates
//! - [`DeletePolicy`]: orders deletions

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod planner;
pub mod store;
pub mod types;

pub use context::{LogProgress, NoProgress, ProgressCallback};
pub use error::{Error, Result};
pub use executor::prune;
pub use planner::{DeleteOrder, DeletePolicy, KindPriority, Lifo};
pub use store::Store;
pub use types::{PruneOptions, PrunePhase, PruneSummary};
