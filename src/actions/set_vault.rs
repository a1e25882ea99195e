//! setVault - write secrets and policies to a Vault in the cluster
//!
//! ```yaml
//! type: setVault
//! url: https://localhost:8200
//! tlsSkipVerify: "true"
//! token: "{{ Get.secret.vault['vault-unseal-keys'].data['vault-root'] | b64dec }}"
//! config:
//!   logicals:
//!   - path: secret/data/test
//!     data:
//!       data:
//!         USER: superman
//!   policies:
//!   - name: secret_allow
//!     rule: path "secret/*" { capabilities = ["read"] }
//! ```
//!
//! With a `portForward` on the step, a port-forward runs for the duration
//! of the action and the Vault is polled until it reports initialized.

use super::vault::VaultApi;
use crate::error::{Error, Result};
use kubekit::retry::{LogCallback, with_retry};
use kubekit::{Backoff, CancelToken, Cluster, Tunnel};
use serde::{Deserialize, Deserializer};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVault {
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub tls_skip_verify: bool,
    /// PEM encoded CA certificate
    #[serde(default)]
    pub ca: String,
    #[serde(default)]
    pub config: VaultConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    logicals: Option<Vec<Logical>>,
    /// Older name of `logicals`
    #[serde(default)]
    kv: Option<Vec<Logical>>,
    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl VaultConfig {
    /// `logicals`, or `kv` when `logicals` is absent.
    pub fn logicals(&self) -> &[Logical] {
        self.logicals
            .as_deref()
            .or(self.kv.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logical {
    pub path: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
    pub name: String,
    #[serde(alias = "rules")]
    pub rule: String,
}

fn bool_or_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}

/// Retry schedules of a setVault run.
#[derive(Debug, Clone, Copy)]
pub struct VaultSchedule {
    /// Polling for an initialized Vault behind a port-forward
    pub health: Backoff,
    /// Each logical or policy write
    pub write: Backoff,
    /// Restarting the port-forward
    pub tunnel: Backoff,
    /// How long the port-forward may live
    pub tunnel_lifetime: Duration,
}

impl Default for VaultSchedule {
    fn default() -> Self {
        Self {
            health: Backoff::deadline(Duration::from_secs(600)),
            write: Backoff::attempts(10),
            tunnel: Backoff::default(),
            tunnel_lifetime: Duration::from_secs(600),
        }
    }
}

pub fn run<C: Cluster + ?Sized>(
    args: &SetVault,
    vault: &dyn VaultApi,
    cluster: &C,
    port_forward: Option<&str>,
    schedule: &VaultSchedule,
) -> Result<()> {
    let Some(flags) = port_forward else {
        return configure(args, vault, schedule);
    };

    thread::scope(|scope| {
        let token = CancelToken::with_timeout(schedule.tunnel_lifetime);
        let tunnel = Tunnel::spawn(scope, cluster, flags, token, schedule.tunnel);

        let result = wait_until_initialized(vault, &schedule.health)
            .and_then(|()| configure(args, vault, schedule));

        let report = tunnel.stop();
        if report.restarts > 0 {
            log::debug!(
                "setVault: port-forward restarted {} times (last error: {})",
                report.restarts,
                report.last_error.as_deref().unwrap_or("none")
            );
        }
        result
    })
}

fn wait_until_initialized(vault: &dyn VaultApi, policy: &Backoff) -> Result<()> {
    with_retry(policy, Some(&LogCallback("setVault: health")), || -> Result<()> {
        let health = vault.health()?;
        if health.initialized {
            Ok(())
        } else {
            Err(Error::parse("vault health", "not initialized"))
        }
    })
    .map_err(|e| Error::Timeout {
        what: "vault to become initialized".to_string(),
        attempts: e.attempts,
        last: e.last.to_string(),
    })
}

fn configure(args: &SetVault, vault: &dyn VaultApi, schedule: &VaultSchedule) -> Result<()> {
    for logical in args.config.logicals() {
        log::info!("setVault: write {}", logical.path);
        retry_write(&schedule.write, &logical.path, || vault.write(&logical.path, &logical.data))?;
    }
    for policy in &args.config.policies {
        log::info!("setVault: policy {}", policy.name);
        retry_write(&schedule.write, &policy.name, || vault.put_policy(&policy.name, &policy.rule))?;
    }
    Ok(())
}

fn retry_write(policy: &Backoff, what: &str, op: impl FnMut() -> Result<()>) -> Result<()> {
    let label = format!("setVault: {what}");
    with_retry(policy, Some(&LogCallback(&label)), op).map_err(|e| Error::Timeout {
        what: format!("vault write {what}"),
        attempts: e.attempts,
        last: e.last.to_string(),
    })
}
