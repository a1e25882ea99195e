//! Real backend that shells out to `kubectl`.

use super::Cluster;
use crate::apiresources;
use crate::error::{Error, Result};
use crate::tunnel::CancelToken;
use crate::types::ApiResource;
use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

/// Poll interval while a port-forward child is running.
const FORWARD_POLL: Duration = Duration::from_millis(200);

/// Backend using the `kubectl` CLI.
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    kubeconfig: Option<String>,
    context: Option<String>,
}

impl Kubectl {
    /// Create a backend invoking `binary`.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            context: None,
        }
    }

    /// Pass `--kubeconfig` on every invocation.
    #[must_use]
    pub fn with_kubeconfig(mut self, kubeconfig: Option<String>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    /// Pass `--context` on every invocation.
    #[must_use]
    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.args(["--kubeconfig", kubeconfig]);
        }
        if let Some(context) = &self.context {
            cmd.args(["--context", context]);
        }
        cmd.args(args);
        cmd
    }

    fn spawn_error(&self, e: &std::io::Error) -> Error {
        Error::Spawn {
            binary: self.binary.clone(),
            message: e.to_string(),
        }
    }

    /// Run a kubectl command, optionally feeding `stdin`.
    fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<Output> {
        log::debug!("{} {}", self.binary, args.join(" "));

        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(&e))?;

        let Some(input) = stdin else {
            return Ok(child.wait_with_output()?);
        };

        // Feed stdin from a separate thread so a large manifest cannot
        // deadlock against a full stdout pipe.
        let mut pipe = child.stdin.take();
        thread::scope(|s| {
            let writer = s.spawn(move || match pipe.as_mut() {
                Some(p) => p.write_all(input.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output()?;
            match writer.join() {
                Ok(written) => written?,
                Err(_) => {
                    return Err(Error::Manifest("stdin writer panicked".to_string()));
                }
            }
            Ok(output)
        })
    }

    /// Run a kubectl command and check for success.
    fn run_checked(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let output = self.run(args, stdin)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_kubectl_output(args, &stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Append `-n <namespace>` unless the namespace is empty.
fn with_namespace<'a>(mut args: Vec<&'a str>, namespace: &'a str) -> Vec<&'a str> {
    if !namespace.is_empty() {
        args.extend(["-n", namespace]);
    }
    args
}

impl Cluster for Kubectl {
    fn apply(&self, manifest: &str, dry_run: bool) -> Result<String> {
        let mut args = vec!["apply", "-f", "-"];
        if dry_run {
            args.push("--dry-run=client");
        }
        self.run_checked(&args, Some(manifest))
    }

    fn delete(&self, resource_type: &str, namespace: &str, name: &str) -> Result<()> {
        let args = with_namespace(
            vec!["delete", resource_type, name, "--ignore-not-found"],
            namespace,
        );
        self.run_checked(&args, None)?;
        Ok(())
    }

    fn get(
        &self,
        resource_type: &str,
        namespace: &str,
        name: &str,
    ) -> Result<serde_json::Value> {
        let args = with_namespace(vec!["get", resource_type, name, "-o", "json"], namespace);
        let stdout = self.run_checked(&args, None)?;
        Ok(serde_json::from_str(&stdout)?)
    }

    fn api_resources(&self) -> Result<Vec<ApiResource>> {
        let args = ["api-resources"];
        let output = self.run(&args, None)?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Unavailable aggregated APIs make kubectl fail after printing
            // the table for every group it could reach.
            if stdout.trim().is_empty() {
                return Err(Error::from_kubectl_output(&args, &stderr));
            }
            log::warn!("api-resources partially failed: {}", stderr.trim());
        }

        apiresources::parse_table(&stdout)
    }

    fn wait(&self, flags: &str) -> Result<String> {
        let mut args = vec!["wait"];
        args.extend(flags.split_whitespace());
        self.run_checked(&args, None)
    }

    fn port_forward(&self, flags: &str, cancel: &CancelToken) -> Result<()> {
        let mut args = vec!["port-forward"];
        args.extend(flags.split_whitespace());
        log::debug!("{} {}", self.binary, args.join(" "));

        let mut child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(Error::CommandFailed {
                    args: args.join(" "),
                    stderr: format!("exited with {status}"),
                });
            }
            if cancel.wait_timeout(FORWARD_POLL) {
                // The child may have exited between the poll and the kill.
                let _ = child.kill();
                child.wait()?;
                return Ok(());
            }
        }
    }
}
