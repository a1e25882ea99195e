//! Persistence of the deployed set.
//!
//! The set is kept as a JSON array in the `deployed` field of a ConfigMap.
//! Extra caller-supplied fields are stored next to it but never replace it.

use crate::error::{Error, Result};
use kubekit::{Cluster, ResourceRef};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// ConfigMap field holding the deployed set.
pub const DEPLOYED_FIELD: &str = "deployed";

/// Location of the deployed-set record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Namespace of the ConfigMap
    pub namespace: String,
    /// Name of the ConfigMap
    pub name: String,
    /// Extra string fields stored alongside the deployed set
    #[serde(default, rename = "x")]
    pub extra: BTreeMap<String, String>,
}

impl Store {
    /// Create a store without extra fields.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            extra: BTreeMap::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Store {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            message: message.into(),
        }
    }

    /// Read the deployed set of the previous run.
    ///
    /// A missing ConfigMap means there was no previous run.
    pub fn read<C: Cluster + ?Sized>(&self, cluster: &C) -> Result<Vec<ResourceRef>> {
        let object = match cluster.get("configmap", &self.namespace, &self.name) {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                log::debug!("store {}/{} not found", self.namespace, self.name);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let text = object
            .get("data")
            .and_then(|d| d.get(DEPLOYED_FIELD))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| self.error(format!("no field '{DEPLOYED_FIELD}'")))?;

        serde_json::from_str(text).map_err(|e| self.error(format!("field '{DEPLOYED_FIELD}': {e}")))
    }

    /// The ConfigMap manifest recording `deployed`.
    pub fn manifest(&self, deployed: &[ResourceRef]) -> Result<String> {
        let encoded = serde_json::to_string(deployed).map_err(|e| self.error(e.to_string()))?;

        let mut data = BTreeMap::from([(DEPLOYED_FIELD.to_string(), encoded)]);
        for (key, value) in &self.extra {
            data.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let config_map = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
            },
            "data": data,
        });
        serde_json::to_string_pretty(&config_map).map_err(|e| self.error(e.to_string()))
    }

    /// Record `deployed` in the cluster.
    pub fn write<C: Cluster + ?Sized>(
        &self,
        cluster: &C,
        deployed: &[ResourceRef],
        dry_run: bool,
    ) -> Result<()> {
        let manifest = self.manifest(deployed)?;
        let stdout = cluster.apply(&manifest, dry_run)?;
        log::debug!("store: {}", stdout.trim());
        Ok(())
    }
}
