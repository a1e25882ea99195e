//! Secret backends reachable from templates through `vault(key, field)`.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Read access to a secret store.
pub trait SecretBackend: Send + Sync {
    /// Return the secret named `key`.
    ///
    /// With an empty `field` the raw value is returned. Otherwise the value
    /// must be a flat JSON object and `field` names one of its members.
    fn get(&self, key: &str, field: &str) -> Result<String>;
}

/// Backend used when no master vault is configured; every lookup fails.
pub struct NoSecrets;

impl SecretBackend for NoSecrets {
    fn get(&self, key: &str, _field: &str) -> Result<String> {
        Err(Error::secret(key, "no master vault configured"))
    }
}

/// Extract `field` from the raw secret value `raw`.
pub fn select_field(key: &str, raw: &str, field: &str) -> Result<String> {
    if field.is_empty() {
        return Ok(raw.to_string());
    }

    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| Error::secret(key, format!("value is not a JSON object: {e}")))?;

    match object.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(Error::secret(key, format!("field not found: {field}"))),
    }
}

/// Secrets held in memory, typically read from a directory where each file
/// is one secret.
#[derive(Debug, Clone, Default)]
pub struct FileVault {
    entries: BTreeMap<String, String>,
}

impl FileVault {
    /// Create a vault from name/value pairs.
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    /// Load every regular file in `dir` except `skip` as a secret named
    /// after the file.
    pub fn from_dir(dir: &Path, skip: &[&str]) -> Result<Self> {
        let read_err = |path: &Path, source| Error::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut entries = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(|e| read_err(dir, e))? {
            let entry = entry.map_err(|e| read_err(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if skip.contains(&name.as_str()) {
                continue;
            }
            let value = fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
            entries.insert(name, value);
        }

        log::debug!("file vault {}: {} secrets", dir.display(), entries.len());
        Ok(Self { entries })
    }

    /// Names of the secrets in the vault.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl SecretBackend for FileVault {
    fn get(&self, key: &str, field: &str) -> Result<String> {
        let raw = self
            .entries
            .get(key)
            .ok_or_else(|| Error::secret(key, "not found"))?;
        select_field(key, raw, field)
    }
}
