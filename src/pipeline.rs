//! Step pipeline - runs the steps of a job in order
//!
//! For every step the pipeline computes the effective values, expands the
//! step's template and hands the result to an [`Executor`]. Actions may
//! leave values behind for later steps (`Get` in templates). When the job
//! has a prune section, the objects applied along the way are handed to
//! the executor's prune at the end of the run.

use crate::error::{Error, Result};
use crate::executor::{Executor, StepId};
use crate::job::{Job, PruneConfig, Step};
use kubekit::{ResourceRef, manifest};
use prune::Store;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tmplkit::{Renderer, Values, values};

// ============================================================================
// Mode
// ============================================================================

/// What the pipeline does with expanded steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Apply templates; skip actions
    #[default]
    Apply,
    /// Apply templates and run actions
    ApplyWithActions,
    /// Print templates instead of applying them
    Generate,
    /// Print templates and actions
    GenerateWithActions,
}

impl Mode {
    pub fn actions(self) -> bool {
        matches!(self, Mode::ApplyWithActions | Mode::GenerateWithActions)
    }

    pub fn generates(self) -> bool {
        matches!(self, Mode::Generate | Mode::GenerateWithActions)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Apply => "apply",
            Mode::ApplyWithActions => "apply-with-actions",
            Mode::Generate => "generate",
            Mode::GenerateWithActions => "generate-with-actions",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Template Source
// ============================================================================

/// Where step templates are read from.
pub trait TemplateSource {
    /// Read template `name`; returns the resolved path and its text.
    fn read(&self, name: &str) -> Result<(PathBuf, String)>;
}

/// Templates on disk, relative to the job file's directory.
pub struct JobDir {
    root: PathBuf,
}

impl JobDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateSource for JobDir {
    fn read(&self, name: &str) -> Result<(PathBuf, String)> {
        let path = self.root.join(name);
        let text = fs::read_to_string(&path).map_err(|source| Error::Read {
            path: path.clone(),
            source,
        })?;
        Ok((path, text))
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// What a run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub steps: usize,
    pub documents: usize,
    pub actions: usize,
    pub skipped_actions: usize,
    /// Objects applied, in apply order (only recorded with a prune section)
    pub deployed: Vec<ResourceRef>,
    pub pruned: bool,
}

pub struct Pipeline<'a> {
    mode: Mode,
    renderer: &'a Renderer,
    source: &'a dyn TemplateSource,
}

impl<'a> Pipeline<'a> {
    pub fn new(mode: Mode, renderer: &'a Renderer, source: &'a dyn TemplateSource) -> Self {
        Self {
            mode,
            renderer,
            source,
        }
    }

    /// Run every step of `job`; the first failing step ends the run.
    ///
    /// `global` holds the run-wide values (values file and `--set-value`),
    /// which override both the job defaults and the step values.
    pub fn run(&self, job: &Job, global: &Values, executor: &mut dyn Executor) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut passed = Values::new();

        for (i, step) in job.steps.iter().enumerate() {
            let index = i + 1;
            self.step(index, step, job, global, &mut passed, executor, &mut summary)
                .map_err(|e| e.in_step(index, step.name()))?;
            summary.steps += 1;
        }

        if let Some(config) = &job.prune {
            if self.mode.generates() {
                log::debug!("prune skipped in {} mode", self.mode);
            } else {
                let store = self.store(config, job, global)?;
                executor.prune(&summary.deployed, &store)?;
                summary.pruned = true;
            }
        }

        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &self,
        index: usize,
        step: &Step,
        job: &Job,
        global: &Values,
        passed: &mut Values,
        executor: &mut dyn Executor,
        summary: &mut RunSummary,
    ) -> Result<()> {
        match step {
            Step::Wait { flags } => {
                log::info!("##{index:02} wait {flags}");
                executor.wait(StepId::step(index), flags)
            }
            Step::Tmplt { path, values } => {
                log::info!("##{index:02} tmplt {path}");
                let body = self.expand(path, &job.defaults, values, global, passed)?;
                for (n, (doc, r)) in documents(&body, job.prune.as_ref())?.into_iter().enumerate() {
                    executor.apply(StepId::document(index, n + 1), step.name(), &doc)?;
                    summary.documents += 1;
                    summary.deployed.extend(r);
                }
                Ok(())
            }
            Step::Action {
                path,
                values,
                port_forward,
            } => {
                // Skipped before expansion: the template may read values an
                // earlier, also skipped, action would have passed on.
                if !self.mode.actions() {
                    log::info!("##{index:02} skip action {path}");
                    summary.skipped_actions += 1;
                    return Ok(());
                }
                log::info!("##{index:02} action {path}");
                let body = self.expand(path, &job.defaults, values, global, passed)?;
                executor.action(StepId::step(index), step.name(), &body, port_forward.as_deref(), passed)?;
                summary.actions += 1;
                Ok(())
            }
        }
    }

    fn expand(
        &self,
        name: &str,
        defaults: &Values,
        step_values: &Values,
        global: &Values,
        passed: &Values,
    ) -> Result<String> {
        let (path, text) = self.source.read(name)?;
        let effective = values::merge(defaults, &[step_values, global]);
        Ok(self.renderer.render(&path, &text, &effective, passed)?)
    }

    /// The store of `config`, with its extra fields expanded against the
    /// global values.
    fn store(&self, config: &PruneConfig, job: &Job, global: &Values) -> Result<Store> {
        let mut store = Store::new(&config.store.namespace, &config.store.name);
        for (key, text) in &config.store.x {
            let value = self
                .renderer
                .render(&job.path, text, global, &Values::new())
                .map_err(|e| Error::parse(format!("prune.store.x.{key}"), e))?;
            store.extra.insert(key.clone(), value);
        }
        Ok(store)
    }
}

/// Split an expanded template into the documents to apply.
///
/// Empty documents are dropped. With a prune section every document must
/// be an object; its identity is recorded and the labels are stamped.
fn documents(body: &str, prune: Option<&PruneConfig>) -> Result<Vec<(String, Option<ResourceRef>)>> {
    manifest::split_documents(body)
        .into_iter()
        .filter(|doc| !manifest::is_empty_document(doc))
        .map(|doc| match prune {
            None => Ok((doc, None)),
            Some(config) if config.labels.is_empty() => {
                let r = manifest::resource_ref(&doc)?;
                Ok((doc, Some(r)))
            }
            Some(config) => {
                let (stamped, r) = manifest::stamp_labels(&doc, &config.labels)?;
                Ok((stamped, Some(r)))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Arc;
    use tmplkit::FileVault;
    use tmplkit::secrets::NoSecrets;

    /// Templates held in memory
    struct MapSource(BTreeMap<String, String>);

    impl MapSource {
        fn new(templates: &[(&str, &str)]) -> Self {
            Self(
                templates
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    impl TemplateSource for MapSource {
        fn read(&self, name: &str) -> Result<(PathBuf, String)> {
            self.0
                .get(name)
                .map(|text| (PathBuf::from(name), text.clone()))
                .ok_or_else(|| Error::Read {
                    path: PathBuf::from(name),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }
    }

    /// Executor recording every call; each action replaces the passed
    /// values with `{tally: <actions so far>}`.
    #[derive(Default)]
    struct FakeExecutor {
        wait: Vec<String>,
        apply: Vec<(String, String)>,
        action: Vec<String>,
        port_forward: Vec<Option<String>>,
        prune: Vec<(Vec<ResourceRef>, Store)>,
        fail_apply: bool,
    }

    impl Executor for FakeExecutor {
        fn wait(&mut self, _id: StepId, flags: &str) -> Result<()> {
            self.wait.push(flags.to_string());
            Ok(())
        }

        fn apply(&mut self, id: StepId, _name: &str, doc: &str) -> Result<()> {
            if self.fail_apply {
                return Err(kubekit::Error::CommandFailed {
                    args: "apply -f -".to_string(),
                    stderr: "denied".to_string(),
                }
                .into());
            }
            self.apply.push((id.to_string(), doc.trim().to_string()));
            Ok(())
        }

        fn action(
            &mut self,
            _id: StepId,
            _name: &str,
            body: &str,
            port_forward: Option<&str>,
            passed: &mut Values,
        ) -> Result<()> {
            self.action.push(body.trim().to_string());
            self.port_forward.push(port_forward.map(str::to_string));
            let mut tally = Values::new();
            tally.insert("tally".to_string(), json!(self.action.len()));
            *passed = tally;
            Ok(())
        }

        fn prune(&mut self, deployed: &[ResourceRef], store: &Store) -> Result<()> {
            self.prune.push((deployed.to_vec(), store.clone()));
            Ok(())
        }
    }

    fn renderer() -> Renderer {
        Renderer::with_environment(Arc::new(NoSecrets), BTreeMap::new())
    }

    fn job(text: &str) -> Job {
        let mut job = Job::parse(text, "job.yaml").unwrap();
        job.path = PathBuf::from("job.yaml");
        job
    }

    fn global(v: serde_json::Value) -> Values {
        values::from_value(v).unwrap()
    }

    fn run(
        mode: Mode,
        job_text: &str,
        templates: &[(&str, &str)],
        global_values: serde_json::Value,
    ) -> (Result<RunSummary>, FakeExecutor) {
        let renderer = renderer();
        let source = MapSource::new(templates);
        let mut fake = FakeExecutor::default();
        let result = Pipeline::new(mode, &renderer, &source).run(&job(job_text), &global(global_values), &mut fake);
        (result, fake)
    }

    const HELLO: &str = "\n{{ Values.team.lead }} says hello {{ Values.audience }}!";

    #[test]
    fn test_apply_with_step_values() {
        let (result, fake) = run(
            Mode::Apply,
            r"
steps:
- tmplt: tpl/example.txt
  values:
    team:
      lead: pipo
defaults:
  audience: all",
            &[("tpl/example.txt", HELLO)],
            json!({}),
        );

        result.unwrap();
        assert_eq!(fake.apply, [("01.01".to_string(), "pipo says hello all!".to_string())]);
    }

    #[test]
    fn test_global_values_override_defaults_and_step() {
        let (result, fake) = run(
            Mode::Apply,
            r"
steps:
- tmplt: tpl/example.txt
  values:
    team:
      lead: pipo
defaults:
  audience: all
  team:
    lead: klukkluk",
            &[("tpl/example.txt", HELLO)],
            json!({"audience": "world"}),
        );

        result.unwrap();
        assert_eq!(fake.apply[0].1, "pipo says hello world!");
    }

    #[test]
    fn test_wait_flags_are_verbatim() {
        let (result, fake) = run(Mode::Apply, "steps:\n- wait: --one 1 --two 2\n", &[], json!({}));
        result.unwrap();
        assert_eq!(fake.wait, ["--one 1 --two 2"]);
    }

    #[test]
    fn test_multi_document_template() {
        let (result, fake) = run(
            Mode::Apply,
            "steps:\n- wait: --for x\n- tmplt: t.yaml\n",
            &[("t.yaml", "a: 1\n---\n---\n# only a comment\n---\nb: 2\n")],
            json!({}),
        );

        let summary = result.unwrap();
        assert_eq!(summary.documents, 2);
        let ids: Vec<_> = fake.apply.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["02.01", "02.02"]);
    }

    #[test]
    fn test_action_with_port_forward() {
        let (result, fake) = run(
            Mode::ApplyWithActions,
            r"
steps:
- action: action/get.txt
  portForward: --forward-flags
  values:
    action: getSecret",
            &[("action/get.txt", "\naction: {{ Values.action }}")],
            json!({}),
        );

        result.unwrap();
        assert_eq!(fake.action, ["action: getSecret"]);
        assert_eq!(fake.port_forward, [Some("--forward-flags".to_string())]);
    }

    #[test]
    fn test_actions_pass_values_to_later_steps() {
        let (result, fake) = run(
            Mode::ApplyWithActions,
            "steps:\n- action: action/nop.txt\n- action: action/value.txt\n- tmplt: t.txt\n",
            &[
                ("action/nop.txt", "no operation"),
                ("action/value.txt", "tally: {{ Get.tally }}"),
                ("t.txt", "seen: {{ Get.tally }}"),
            ],
            json!({}),
        );

        let summary = result.unwrap();
        assert_eq!(fake.action, ["no operation", "tally: 1"]);
        assert_eq!(fake.port_forward, [None, None]);
        assert_eq!(fake.apply[0].1, "seen: 2");
        assert_eq!(summary.actions, 2);
    }

    #[test]
    fn test_actions_skipped_without_action_mode() {
        // The action template does not exist; it must not even be read.
        let (result, fake) = run(
            Mode::Apply,
            "steps:\n- action: action/missing.txt\n- tmplt: t.txt\n",
            &[("t.txt", "ok")],
            json!({}),
        );

        let summary = result.unwrap();
        assert!(fake.action.is_empty());
        assert_eq!(summary.skipped_actions, 1);
        assert_eq!(fake.apply.len(), 1);
    }

    #[test]
    fn test_reads_from_vault() {
        let vault = FileVault::new(BTreeMap::from([(
            "object".to_string(),
            r#"{"field":"value"}"#.to_string(),
        )]));
        let renderer = Renderer::with_environment(Arc::new(vault), BTreeMap::new());
        let source = MapSource::new(&[("tpl/vault.txt", "secret: {{ vault('object', 'field') }}")]);
        let mut fake = FakeExecutor::default();

        Pipeline::new(Mode::Apply, &renderer, &source)
            .run(&job("steps:\n- tmplt: tpl/vault.txt\n"), &Values::new(), &mut fake)
            .unwrap();

        assert_eq!(fake.apply[0].1, "secret: value");
    }

    #[test]
    fn test_error_names_step_and_file() {
        let (result, _) = run(
            Mode::Apply,
            "steps:\n- wait: --for x\n- tmplt: tpl/missing.yaml\n",
            &[],
            json!({}),
        );

        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("##02 missing.yaml: read tpl/missing.yaml"), "{message}");
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let (result, fake) = run(
            Mode::Apply,
            "steps:\n- tmplt: t.txt\n",
            &[("t.txt", "{{ Values.nope.deeper }}")],
            json!({}),
        );

        assert!(result.is_err());
        assert!(fake.apply.is_empty());
    }

    #[test]
    fn test_fail_fast() {
        let renderer = renderer();
        let source = MapSource::new(&[("t.yaml", "a: 1")]);
        let mut fake = FakeExecutor {
            fail_apply: true,
            ..Default::default()
        };

        let result = Pipeline::new(Mode::Apply, &renderer, &source).run(
            &job("steps:\n- tmplt: t.yaml\n- wait: --for x\n"),
            &Values::new(),
            &mut fake,
        );

        assert!(result.unwrap_err().to_string().contains("denied"));
        assert!(fake.wait.is_empty());
    }

    const PRUNED_JOB: &str = r#"
prune:
  labels:
    example.com/gitops: web
  store:
    namespace: default
    name: web-deployed
    x:
      stage: "{{ Values.stage }}"
steps:
- tmplt: t.yaml
"#;

    const OBJECTS: &str = "apiVersion: v1
kind: Namespace
metadata:
  name: web
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: frontend
  namespace: web
";

    #[test]
    fn test_prune_receives_deployed_set() {
        let (result, fake) = run(Mode::Apply, PRUNED_JOB, &[("t.yaml", OBJECTS)], json!({"stage": "prod"}));

        let summary = result.unwrap();
        assert!(summary.pruned);
        assert_eq!(
            summary.deployed,
            [
                ResourceRef::new("v1", "Namespace", "", "web"),
                ResourceRef::new("apps/v1", "Deployment", "web", "frontend"),
            ]
        );
        assert!(fake.apply[1].1.contains("example.com/gitops: web"));

        let (deployed, store) = &fake.prune[0];
        assert_eq!(deployed, &summary.deployed);
        assert_eq!(store.name, "web-deployed");
        assert_eq!(store.extra["stage"], "prod");
    }

    #[test]
    fn test_no_prune_when_generating() {
        let (result, fake) = run(Mode::Generate, PRUNED_JOB, &[("t.yaml", OBJECTS)], json!({"stage": "prod"}));

        assert!(!result.unwrap().pruned);
        assert!(fake.prune.is_empty());
        assert_eq!(fake.apply.len(), 2);
    }

    #[test]
    fn test_job_dir_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tpl")).unwrap();
        fs::write(dir.path().join("tpl/a.yaml"), "a: 1").unwrap();

        let (path, text) = JobDir::new(dir.path()).read("tpl/a.yaml").unwrap();
        assert_eq!(path, dir.path().join("tpl/a.yaml"));
        assert_eq!(text, "a: 1");
        assert!(Path::new(&path).is_file());
    }

    #[test]
    fn test_mode_flags() {
        assert!(!Mode::Apply.actions());
        assert!(Mode::ApplyWithActions.actions());
        assert!(Mode::Generate.generates() && !Mode::Generate.actions());
        assert!(Mode::GenerateWithActions.generates() && Mode::GenerateWithActions.actions());
        assert_eq!(Mode::GenerateWithActions.to_string(), "generate-with-actions");
    }
}
