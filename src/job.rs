//! Job file parsing
//!
//! A job file lists the steps of one deployment:
//!
//! ```yaml
//! prune:
//!   labels:
//!     example.com/deployed-by: web
//!   store:
//!     namespace: default
//!     name: web-deployed
//!     x:
//!       stage: "{{ Values.stage }}"
//! steps:
//! - tmplt: tpl/deploy.yaml
//!   values:
//!     replicas: 2
//! - wait: --for condition=Available deployment/web -n web
//! - action: action/get-secret.yaml
//! defaults:
//!   stage: dev
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tmplkit::Values;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub defaults: Values,
    #[serde(default)]
    pub prune: Option<PruneConfig>,
    /// File the job was read from; templates are resolved relative to it
    #[serde(skip)]
    pub path: PathBuf,
}

/// One unit of the pipeline. Exactly one of `tmplt`, `wait` or `action`
/// selects the variant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawStep")]
pub enum Step {
    Tmplt {
        path: String,
        values: Values,
    },
    Wait {
        flags: String,
    },
    Action {
        path: String,
        values: Values,
        port_forward: Option<String>,
    },
}

impl Step {
    /// The file name used in logs and error messages.
    pub fn name(&self) -> &str {
        match self {
            Step::Tmplt { path, .. } | Step::Action { path, .. } => base_name(path),
            Step::Wait { .. } => "wait",
        }
    }
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStep {
    tmplt: Option<String>,
    wait: Option<String>,
    action: Option<String>,
    #[serde(default)]
    values: Option<Values>,
    port_forward: Option<String>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> std::result::Result<Self, Self::Error> {
        let values = raw.values.unwrap_or_default();
        match (raw.tmplt, raw.wait, raw.action) {
            (Some(path), None, None) => Ok(Step::Tmplt { path, values }),
            (None, Some(flags), None) => Ok(Step::Wait { flags }),
            (None, None, Some(path)) => Ok(Step::Action {
                path,
                values,
                port_forward: raw.port_forward.filter(|f| !f.trim().is_empty()),
            }),
            (None, None, None) => Err("expected one of 'tmplt', 'wait' or 'action'".to_string()),
            _ => Err("only one of 'tmplt', 'wait' or 'action' is allowed per step".to_string()),
        }
    }
}

/// Labels stamped on applied objects and where the deployed set is kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PruneConfig {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub namespace: String,
    pub name: String,
    /// Extra fields; each value is a template expanded against the global values
    #[serde(default)]
    pub x: BTreeMap<String, String>,
}

impl Job {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut job = Self::parse(&text, &path.display().to_string())?;
        job.path = path.to_path_buf();
        Ok(job)
    }

    pub fn parse(text: &str, what: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let job: Self = serde_yaml::from_str(text).map_err(|e| Error::parse(what, e))?;
        if let Some(prune) = &job.prune
            && (prune.store.namespace.is_empty() || prune.store.name.is_empty())
        {
            return Err(Error::parse(what, "prune.store needs a namespace and a name"));
        }
        Ok(job)
    }

    /// Directory templates are read from.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Run-wide values: the values file with `key=value` assignments on top.
pub fn global_values(set_file: Option<&Path>, assignments: &[String]) -> Result<Values> {
    let mut global = match set_file {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
            tmplkit::values::from_yaml(&text).map_err(|e| Error::parse(path.display().to_string(), e))?
        }
        None => Values::new(),
    };
    for assignment in assignments {
        tmplkit::values::set_value(&mut global, assignment)?;
    }
    Ok(global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_steps() {
        let job = Job::parse(
            r#"
steps:
- tmplt: tpl/example.txt
  values:
    team:
      lead: pipo
- wait: --for condition=Ready pod/web
- action: action/get.yaml
  portForward: svc/vault 8200
defaults:
  audience: all
"#,
            "job.yaml",
        )
        .unwrap();

        assert_eq!(job.steps.len(), 3);
        assert_eq!(
            job.steps[0],
            Step::Tmplt {
                path: "tpl/example.txt".to_string(),
                values: tmplkit::values::from_value(json!({"team": {"lead": "pipo"}})).unwrap(),
            }
        );
        assert_eq!(
            job.steps[1],
            Step::Wait {
                flags: "--for condition=Ready pod/web".to_string()
            }
        );
        assert!(matches!(
            &job.steps[2],
            Step::Action { port_forward: Some(pf), .. } if pf == "svc/vault 8200"
        ));
        assert_eq!(job.steps[2].name(), "get.yaml");
        assert_eq!(job.defaults["audience"], "all");
        assert!(job.prune.is_none());
    }

    #[test]
    fn test_step_needs_one_discriminator() {
        let none = Job::parse("steps:\n- values: {a: 1}\n", "job.yaml").unwrap_err();
        assert!(none.to_string().contains("expected one of"));

        let both = Job::parse("steps:\n- tmplt: a.yaml\n  wait: --for x\n", "job.yaml").unwrap_err();
        assert!(both.to_string().contains("only one of"));
    }

    #[test]
    fn test_parse_prune() {
        let job = Job::parse(
            r#"
prune:
  labels:
    example.com/gitops: web
  store:
    namespace: default
    name: web
    x:
      stage: "{{ Values.stage }}"
steps: []
"#,
            "job.yaml",
        )
        .unwrap();

        let prune = job.prune.unwrap();
        assert_eq!(prune.labels["example.com/gitops"], "web");
        assert_eq!(prune.store.name, "web");
        assert_eq!(prune.store.x["stage"], "{{ Values.stage }}");
    }

    #[test]
    fn test_prune_store_requires_name() {
        let err = Job::parse("prune:\n  store:\n    namespace: default\n    name: ''\n", "job.yaml")
            .unwrap_err();
        assert!(err.to_string().contains("prune.store"));
    }

    #[test]
    fn test_empty_job() {
        let job = Job::parse("", "job.yaml").unwrap();
        assert!(job.steps.is_empty());
    }

    #[test]
    fn test_load_sets_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        fs::write(&path, "steps:\n- wait: --for x\n").unwrap();

        let job = Job::load(&path).unwrap();
        assert_eq!(job.dir(), dir.path());
        assert_eq!(job.steps.len(), 1);
    }

    #[test]
    fn test_global_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        fs::write(&path, "stage: prod
team:
  lead: pipo
  size: 3
").unwrap();

        let global = global_values(Some(&path), &["team.lead=klukkluk".to_string(), "url=http://x?a=b".to_string()])
            .unwrap();

        assert_eq!(global["stage"], "prod");
        assert_eq!(global["team"]["lead"], "klukkluk");
        assert_eq!(global["team"]["size"], 3);
        assert_eq!(global["url"], "http://x?a=b");
    }

    #[test]
    fn test_global_values_errors() {
        assert!(global_values(None, &[]).unwrap().is_empty());
        assert!(global_values(None, &["no-assignment".to_string()]).is_err());
        let err = global_values(Some(Path::new("/nonexistent/values.yaml")), &[]).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
