//! Master vault backends
//!
//! A master vault is a directory holding a `type` file:
//! - `file`: every other file in the directory is a secret
//! - `azure-key-vault`: files `URL` and `token` address an Azure Key Vault

use crate::error::{Error, Result};
use kubekit::Backoff;
use kubekit::retry::{LogCallback, with_retry};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tmplkit::secrets::{NoSecrets, select_field};
use tmplkit::{FileVault, SecretBackend};

const API_VERSION: &str = "7.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Open the master vault configured in `dir`; no directory means no secrets.
pub fn open_master_vault(dir: Option<&str>) -> Result<Arc<dyn SecretBackend>> {
    let Some(dir) = dir.filter(|d| !d.is_empty()) else {
        return Ok(Arc::new(NoSecrets));
    };
    let dir = PathBuf::from(shellexpand::tilde(dir).as_ref());

    let kind = read_setting(&dir, "type")?;
    match kind.as_str() {
        "file" => {
            let vault = FileVault::from_dir(&dir, &["type"])?;
            log::debug!("master vault {}: file, {} secrets", dir.display(), vault.keys().count());
            Ok(Arc::new(vault))
        }
        "azure-key-vault" => {
            let url = read_setting(&dir, "URL")?;
            let token = read_setting(&dir, "token")?;
            log::debug!("master vault {}: azure-key-vault {url}", dir.display());
            Ok(Arc::new(AzureKeyVault::new(&url, &token)))
        }
        other => Err(Error::MasterVault {
            path: dir.join("type"),
            message: format!("must be one of [azure-key-vault, file], got: {other:?}"),
        }),
    }
}

/// Read the trimmed, non-empty content of `dir/name`.
fn read_setting(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    let text = fs::read_to_string(&path).map_err(|source| Error::Read {
        path: path.clone(),
        source,
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::MasterVault {
            path,
            message: "is empty".to_string(),
        });
    }
    Ok(text.to_string())
}

// ============================================================================
// Azure Key Vault
// ============================================================================

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Reads secrets through the Key Vault REST API with a bearer token.
pub struct AzureKeyVault {
    agent: ureq::Agent,
    url: String,
    token: String,
    backoff: Backoff,
}

impl AzureKeyVault {
    pub fn new(url: &str, token: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            backoff: Backoff::attempts(10),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}/secrets/{name}?api-version={API_VERSION}", self.url)
    }

    fn fetch(&self, name: &str) -> std::result::Result<String, String> {
        let mut response = self
            .agent
            .get(&self.secret_url(name))
            .header("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.body_mut().read_to_string().unwrap_or_default();
            return Err(format!("status {status}: {}", text.trim()));
        }
        response
            .body_mut()
            .read_json::<SecretBundle>()
            .map(|bundle| bundle.value)
            .map_err(|e| e.to_string())
    }
}

impl SecretBackend for AzureKeyVault {
    fn get(&self, key: &str, field: &str) -> tmplkit::Result<String> {
        let label = format!("azure-key-vault {key}");
        let raw = with_retry(&self.backoff, Some(&LogCallback(&label)), || self.fetch(key))
            .map_err(|e| tmplkit::Error::secret(key, e.to_string()))?;
        select_field(key, &raw, field)
    }
}
