//! # kubekit
//!
//! Pure Rust library for driving a cluster through `kubectl`.
//!
//! This crate provides functionality for:
//! - Applying, fetching, deleting and waiting on objects via the [`Cluster`] trait
//! - Parsing `kubectl api-resources` output into a resource-type [`Catalog`]
//! - Splitting multi-document manifests and stamping labels on them
//! - Retrying with an explicit [`Backoff`] policy
//! - Keeping a `kubectl port-forward` tunnel alive in the background
//!
//! ## Example
//!
//! ```no_run
//! use kubekit::{Cluster, backend::kubectl::Kubectl, manifest};
//!
//! let kubectl = Kubectl::new("kubectl").with_context(Some("staging".to_string()));
//! let text = "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: web\n";
//! for doc in manifest::split_documents(text) {
//!     if !manifest::is_empty_document(&doc) {
//!         kubectl.apply(&doc, true).expect("apply failed");
//!     }
//! }
//! ```
//!
//! ## Retry Logic
//!
//! Polling loops take a [`Backoff`]: 100 ms initial delay doubling up to
//! 10 s, bounded by an attempt count or a deadline.
//!
//! ```
//! use kubekit::{Backoff, retry};
//! use std::time::Duration;
//!
//! let policy = Backoff::attempts(3).with_initial(Duration::from_millis(1));
//! let result = retry::with_retry(&policy, None, || Ok::<_, String>("ready"));
//! assert_eq!(result.unwrap(), "ready");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apiresources;
pub mod backend;
pub mod error;
pub mod manifest;
pub mod retry;
pub mod tunnel;
pub mod types;

pub use apiresources::Catalog;
pub use backend::Cluster;
pub use error::{Error, ErrorCategory, Result};
pub use tunnel::{CancelToken, Tunnel, TunnelReport};
pub use types::{ApiResource, Backoff, Bound, ResourceRef};
