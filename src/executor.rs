//! Step executors
//!
//! The pipeline hands every expanded step to an [`Executor`]:
//! - [`ClusterExecutor`] applies, waits and runs actions against a cluster
//! - [`Generator`] writes a `kubectl apply -f -` consumable stream instead

use crate::actions::get_secret;
use crate::actions::set_vault::{self, VaultSchedule};
use crate::actions::vault::VaultConnector;
use crate::actions::Action;
use crate::error::{Error, Result};
use crate::ui;
use kubekit::retry::{LogCallback, with_retry};
use kubekit::{Backoff, Cluster, ResourceRef};
use prune::{LogProgress, PruneOptions, PruneSummary, Store};
use std::fmt;
use std::io::Write;
use std::time::Duration;
use tmplkit::{Renderer, Values};

/// Number of a step, and of the document within a template step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepId {
    pub step: usize,
    pub doc: Option<usize>,
}

impl StepId {
    pub fn step(step: usize) -> Self {
        Self { step, doc: None }
    }

    pub fn document(step: usize, doc: usize) -> Self {
        Self {
            step,
            doc: Some(doc),
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.doc {
            Some(doc) => write!(f, "{:02}.{:02}", self.step, doc),
            None => write!(f, "{:02}", self.step),
        }
    }
}

/// Performs expanded steps.
pub trait Executor {
    /// Wait until the condition described by `kubectl wait` flags holds.
    fn wait(&mut self, id: StepId, flags: &str) -> Result<()>;

    /// Apply one document of template `name`.
    fn apply(&mut self, id: StepId, name: &str, doc: &str) -> Result<()>;

    /// Run the action in `body`; actions may add to `passed`.
    fn action(
        &mut self,
        id: StepId,
        name: &str,
        body: &str,
        port_forward: Option<&str>,
        passed: &mut Values,
    ) -> Result<()>;

    /// Delete what the previous run deployed and `deployed` lacks.
    fn prune(&mut self, deployed: &[ResourceRef], store: &Store) -> Result<()>;
}

// ============================================================================
// Cluster Executor
// ============================================================================

/// Retry schedules used by [`ClusterExecutor`].
#[derive(Debug, Clone, Copy)]
pub struct Schedules {
    pub wait: Backoff,
    pub get_secret: Backoff,
    pub vault: VaultSchedule,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            wait: Backoff::deadline(Duration::from_secs(600)),
            get_secret: Backoff::attempts(10),
            vault: VaultSchedule::default(),
        }
    }
}

pub struct ClusterExecutor<'a, C: Cluster + ?Sized> {
    cluster: &'a C,
    renderer: &'a Renderer,
    vaults: &'a dyn VaultConnector,
    dry_run: bool,
    prune_options: PruneOptions,
    schedules: Schedules,
    /// Outcome of the last prune
    pub pruned: Option<PruneSummary>,
}

impl<'a, C: Cluster + ?Sized> ClusterExecutor<'a, C> {
    pub fn new(cluster: &'a C, renderer: &'a Renderer, vaults: &'a dyn VaultConnector) -> Self {
        Self {
            cluster,
            renderer,
            vaults,
            dry_run: false,
            prune_options: PruneOptions::default(),
            schedules: Schedules::default(),
            pruned: None,
        }
    }

    /// Apply with `--dry-run=client`; skip waits, deletions and Vault writes.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_prune_options(mut self, options: PruneOptions) -> Self {
        self.prune_options = options;
        self
    }

    pub fn with_schedules(mut self, schedules: Schedules) -> Self {
        self.schedules = schedules;
        self
    }
}

impl<C: Cluster + ?Sized> Executor for ClusterExecutor<'_, C> {
    fn wait(&mut self, id: StepId, flags: &str) -> Result<()> {
        if self.dry_run {
            log::info!("##{id} dry run, skip wait {flags}");
            return Ok(());
        }

        let label = format!("##{id} wait");
        let stdout = with_retry(&self.schedules.wait, Some(&LogCallback(&label)), || -> Result<String> {
            let stdout = self.cluster.wait(flags)?;
            if stdout.contains("condition met") {
                Ok(stdout)
            } else {
                Err(Error::parse("kubectl wait", format!("condition not met: {}", stdout.trim())))
            }
        })
        .map_err(|e| Error::Timeout {
            what: format!("wait {flags}"),
            attempts: e.attempts,
            last: e.last.to_string(),
        })?;

        log::info!("##{id} {}", stdout.trim());
        Ok(())
    }

    fn apply(&mut self, id: StepId, name: &str, doc: &str) -> Result<()> {
        let stdout = self.cluster.apply(doc, self.dry_run)?;
        log::info!("##{id} {name}: {}", stdout.trim());
        Ok(())
    }

    fn action(
        &mut self,
        id: StepId,
        name: &str,
        body: &str,
        port_forward: Option<&str>,
        passed: &mut Values,
    ) -> Result<()> {
        let action = Action::parse(body)?;
        log::info!("##{id} {name}: {}", action.kind());

        match action {
            Action::GetSecret(args) => get_secret::run(
                &args,
                self.cluster,
                self.renderer,
                &self.schedules.get_secret,
                passed,
            ),
            Action::SetVault(_) if self.dry_run => {
                log::warn!("##{id} dry run, skip setVault");
                Ok(())
            }
            Action::SetVault(args) => {
                let vault = self.vaults.connect(&args)?;
                set_vault::run(&args, vault.as_ref(), self.cluster, port_forward, &self.schedules.vault)
            }
        }
    }

    fn prune(&mut self, deployed: &[ResourceRef], store: &Store) -> Result<()> {
        let options = PruneOptions {
            dry_run: self.dry_run || self.prune_options.dry_run,
            ..self.prune_options
        };
        let summary = prune::prune(self.cluster, deployed, store, options, &mut LogProgress)?;

        if !summary.duplicates.is_empty() {
            ui::warn(&format!("{} objects applied more than once", summary.duplicates.len()));
        }
        if !summary.skipped.is_empty() {
            ui::dim(&format!("{} deletions skipped", summary.skipped.len()));
        }
        self.pruned = Some(summary);
        Ok(())
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Writes steps as a multi-document stream; nothing touches the cluster.
///
/// Every step starts with `---` and a `##<id>: ...` comment line. Actions
/// are written as comments.
pub struct Generator<W: Write> {
    out: W,
}

impl<W: Write> Generator<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Executor for Generator<W> {
    fn wait(&mut self, id: StepId, flags: &str) -> Result<()> {
        writeln!(self.out, "---")?;
        writeln!(self.out, "##{id}: wait {flags}")?;
        Ok(())
    }

    fn apply(&mut self, id: StepId, name: &str, doc: &str) -> Result<()> {
        writeln!(self.out, "---")?;
        writeln!(self.out, "##{id}: apply {name}")?;
        write!(self.out, "{doc}")?;
        if !doc.ends_with('\n') {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn action(
        &mut self,
        id: StepId,
        name: &str,
        body: &str,
        port_forward: Option<&str>,
        _passed: &mut Values,
    ) -> Result<()> {
        writeln!(self.out, "---")?;
        match port_forward {
            Some(flags) => writeln!(self.out, "##{id}: action {name} portForward {flags}")?,
            None => writeln!(self.out, "##{id}: action {name}")?,
        }
        for line in body.lines() {
            writeln!(self.out, "# {line}")?;
        }
        Ok(())
    }

    fn prune(&mut self, _deployed: &[ResourceRef], _store: &Store) -> Result<()> {
        Ok(())
    }
}
