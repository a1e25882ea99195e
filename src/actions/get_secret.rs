//! getSecret - read a Secret, optionally waiting for a postcondition
//!
//! ```yaml
//! type: getSecret
//! namespace: vault
//! name: vault-unseal-keys
//! postCondition: data['vault-root'] is defined
//! ```
//!
//! The Secret's `data` is passed on to later steps as
//! `Get.secret.<namespace>.<name>.data`.

use crate::error::{Error, Result};
use kubekit::retry::{LogCallback, with_retry};
use kubekit::{Backoff, Cluster};
use serde::Deserialize;
use serde_json::json;
use tmplkit::{Renderer, Values, values};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSecret {
    pub namespace: String,
    pub name: String,
    /// Expression (no delimiters) evaluated against the fetched Secret;
    /// the action succeeds once it is `true`. Empty means always true.
    #[serde(default)]
    pub post_condition: String,
}

pub fn run<C: Cluster + ?Sized>(
    args: &GetSecret,
    cluster: &C,
    renderer: &Renderer,
    policy: &Backoff,
    passed: &mut Values,
) -> Result<()> {
    let label = format!("getSecret {}/{}", args.namespace, args.name);

    let secret = with_retry(policy, Some(&LogCallback(&label)), || -> Result<serde_json::Value> {
        let secret = cluster.get("secret", &args.namespace, &args.name)?;
        if renderer.evaluate(&args.post_condition, &secret)? {
            Ok(secret)
        } else {
            Err(Error::parse("postCondition", "evaluated to false"))
        }
    })
    .map_err(|e| Error::Timeout {
        what: format!("postCondition '{}' of secret {}/{}", args.post_condition, args.namespace, args.name),
        attempts: e.attempts,
        last: e.last.to_string(),
    })?;

    let data = secret.get("data").cloned().unwrap_or_else(|| json!({}));
    let update = values::from_value(json!({
        "secret": { &args.namespace: { &args.name: { "data": data } } }
    }))?;
    values::merge_into(passed, &update);

    log::info!("{label}: {} fields", secret["data"].as_object().map_or(0, |d| d.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubekit::{ApiResource, CancelToken};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tmplkit::secrets::NoSecrets;

    /// Serves one Secret whose `token` field appears after `ready_after` gets.
    struct SlowSecret {
        gets: AtomicU32,
        ready_after: u32,
    }

    impl SlowSecret {
        fn new(ready_after: u32) -> Self {
            Self {
                gets: AtomicU32::new(0),
                ready_after,
            }
        }
    }

    impl Cluster for SlowSecret {
        fn apply(&self, _: &str, _: bool) -> kubekit::Result<String> {
            Ok(String::new())
        }
        fn delete(&self, _: &str, _: &str, _: &str) -> kubekit::Result<()> {
            Ok(())
        }
        fn get(&self, resource_type: &str, _: &str, name: &str) -> kubekit::Result<serde_json::Value> {
            assert_eq!(resource_type, "secret");
            if name != "keys" {
                return Err(kubekit::Error::NotFound {
                    what: name.to_string(),
                });
            }
            let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                Ok(json!({"data": {"token": "czNjcjN0"}}))
            } else {
                Ok(json!({"data": {}}))
            }
        }
        fn api_resources(&self) -> kubekit::Result<Vec<ApiResource>> {
            Ok(Vec::new())
        }
        fn wait(&self, _: &str) -> kubekit::Result<String> {
            Ok(String::new())
        }
        fn port_forward(&self, _: &str, _: &CancelToken) -> kubekit::Result<()> {
            Ok(())
        }
    }

    fn renderer() -> Renderer {
        Renderer::with_environment(Arc::new(NoSecrets), BTreeMap::new())
    }

    fn fast(attempts: u32) -> Backoff {
        Backoff::attempts(attempts).with_initial(Duration::from_millis(1))
    }

    fn args(name: &str, post_condition: &str) -> GetSecret {
        GetSecret {
            namespace: "vault".to_string(),
            name: name.to_string(),
            post_condition: post_condition.to_string(),
        }
    }

    #[test]
    fn test_polls_until_condition_holds() {
        let cluster = SlowSecret::new(3);
        let mut passed = Values::new();

        run(&args("keys", "data.token is defined"), &cluster, &renderer(), &fast(10), &mut passed).unwrap();

        assert_eq!(cluster.gets.load(Ordering::SeqCst), 3);
        assert_eq!(passed["secret"]["vault"]["keys"]["data"]["token"], "czNjcjN0");
    }

    #[test]
    fn test_never_true_condition_times_out_with_condition_text() {
        let cluster = SlowSecret::new(u32::MAX);
        let mut passed = Values::new();

        let err = run(&args("keys", "data.token is defined"), &cluster, &renderer(), &fast(4), &mut passed)
            .unwrap_err();

        assert!(err.to_string().contains("data.token is defined"), "{err}");
        assert_eq!(cluster.gets.load(Ordering::SeqCst), 4);
        assert!(passed.is_empty());
    }

    #[test]
    fn test_missing_secret_times_out() {
        let cluster = SlowSecret::new(1);
        let err = run(&args("other", ""), &cluster, &renderer(), &fast(2), &mut Values::new()).unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 2, .. }));
    }

    #[test]
    fn test_merges_with_previously_passed_values() {
        let cluster = SlowSecret::new(1);
        let mut passed = values::from_value(json!({
            "secret": {"vault": {"older": {"data": {"a": "b"}}}},
            "tally": 1
        }))
        .unwrap();

        run(&args("keys", ""), &cluster, &renderer(), &fast(1), &mut passed).unwrap();

        assert_eq!(passed["secret"]["vault"]["older"]["data"]["a"], "b");
        assert_eq!(passed["secret"]["vault"]["keys"]["data"]["token"], "czNjcjN0");
        assert_eq!(passed["tally"], 1);
    }
}
