//! Vault HTTP API client
//!
//! Only the three calls setVault needs: health, logical write and ACL
//! policy write.

use super::set_vault::SetVault;
use crate::error::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ureq::tls::{Certificate, RootCerts, TlsConfig};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response of `GET /v1/sys/health`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub sealed: bool,
}

/// The subset of the Vault API used by setVault.
pub trait VaultApi {
    fn health(&self) -> Result<Health>;

    /// Write `data` to the logical path `path` (e.g. `secret/data/app`).
    fn write(&self, path: &str, data: &serde_json::Value) -> Result<()>;

    /// Create or replace ACL policy `name`.
    fn put_policy(&self, name: &str, rule: &str) -> Result<()>;
}

/// Creates a client for the Vault described by a setVault action.
pub trait VaultConnector {
    fn connect(&self, action: &SetVault) -> Result<Box<dyn VaultApi>>;
}

/// Connects over HTTP(S).
pub struct HttpConnector;

impl VaultConnector for HttpConnector {
    fn connect(&self, action: &SetVault) -> Result<Box<dyn VaultApi>> {
        Ok(Box::new(HttpVault::new(
            &action.url,
            &action.token,
            action.tls_skip_verify,
            &action.ca,
        )?))
    }
}

pub struct HttpVault {
    agent: ureq::Agent,
    url: String,
    token: String,
}

impl HttpVault {
    /// `ca` is an optional PEM bundle to trust instead of the system roots.
    pub fn new(url: &str, token: &str, tls_skip_verify: bool, ca: &str) -> Result<Self> {
        let mut tls = TlsConfig::builder().disable_verification(tls_skip_verify);
        if !ca.trim().is_empty() {
            let cert = Certificate::from_pem(ca.as_bytes()).map_err(|e| http_error(None, &e))?;
            tls = tls.root_certs(RootCerts::Specific(Arc::new(vec![cert])));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .tls_config(tls.build())
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            agent,
            url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.url, path.trim_start_matches('/'))
    }

    fn put(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let url = self.endpoint(path);
        log::debug!("vault: PUT {url}");
        let mut response = self
            .agent
            .put(&url)
            .header("X-Vault-Token", &self.token)
            .send_json(body)
            .map_err(|e| http_error(None, &e))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let text = response.body_mut().read_to_string().unwrap_or_default();
        Err(http_error(Some(status), &format!("PUT {path}: {}", text.trim())))
    }
}

fn http_error(status: Option<u16>, message: &dyn std::fmt::Display) -> crate::error::Error {
    kubekit::Error::Http {
        status,
        message: message.to_string(),
    }
    .into()
}

impl VaultApi for HttpVault {
    fn health(&self) -> Result<Health> {
        // Sealed and uninitialized vaults answer with 5xx codes and a
        // regular health body.
        let mut response = self
            .agent
            .get(&self.endpoint("sys/health"))
            .call()
            .map_err(|e| http_error(None, &e))?;
        let status = response.status().as_u16();
        response
            .body_mut()
            .read_json::<Health>()
            .map_err(|e| http_error(Some(status), &e))
    }

    fn write(&self, path: &str, data: &serde_json::Value) -> Result<()> {
        self.put(path, data)
    }

    fn put_policy(&self, name: &str, rule: &str) -> Result<()> {
        self.put(&format!("sys/policies/acl/{name}"), &json!({ "policy": rule }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let vault = HttpVault::new("https://localhost:8200/", "t", true, "").unwrap();
        assert_eq!(vault.endpoint("sys/health"), "https://localhost:8200/v1/sys/health");
        assert_eq!(vault.endpoint("/secret/data/x"), "https://localhost:8200/v1/secret/data/x");
    }

    #[test]
    fn test_health_defaults() {
        let health: Health = serde_json::from_str(r#"{"sealed": true}"#).unwrap();
        assert!(!health.initialized);
        assert!(health.sealed);
    }

    #[test]
    fn test_unreachable_vault_is_http_error() {
        let vault = HttpVault::new("http://127.0.0.1:1", "t", false, "").unwrap();
        let err = vault.health().unwrap_err();
        assert!(err.to_string().starts_with("http"), "{err}");
    }
}
