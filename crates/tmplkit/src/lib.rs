//! # tmplkit
//!
//! Layered values and template expansion for manifest generation.
//!
//! - [`values`]: nested value scopes and their precedence-ordered merge
//! - [`Renderer`]: strict template expansion binding `Values`, `Get` and `Files`
//! - [`SecretBackend`]: the `vault(key, field)` lookup behind templates
//!
//! ## Example
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//! use tmplkit::{Renderer, secrets::NoSecrets, values};
//!
//! let defaults = values::from_yaml("audience: all").unwrap();
//! let step = values::from_yaml("team: {lead: pipo}").unwrap();
//! let merged = values::merge(&defaults, &[&step]);
//!
//! let renderer = Renderer::new(Arc::new(NoSecrets));
//! let out = renderer
//!     .render(
//!         Path::new("tpl/hello.txt"),
//!         "{{ Values.team.lead }} says hello {{ Values.audience }}!",
//!         &merged,
//!         &values::Values::new(),
//!     )
//!     .unwrap();
//! assert_eq!(out, "pipo says hello all!");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod expand;
pub mod files;
pub mod functions;
pub mod secrets;
pub mod values;

pub use error::{Error, Result};
pub use expand::Renderer;
pub use secrets::{FileVault, SecretBackend};
pub use values::Values;
