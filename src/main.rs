mod actions;
mod cli;
mod error;
mod executor;
mod job;
mod keyvault;
mod pipeline;
mod ui;

use actions::vault::HttpConnector;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, RunArgs};
use executor::{ClusterExecutor, Generator};
use job::Job;
use kubekit::backend::kubectl::Kubectl;
use pipeline::{JobDir, Mode, Pipeline, RunSummary};
use prune::PruneOptions;
use std::io::{self, Write};
use tmplkit::Renderer;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match cli.command {
        Some(Command::Completions { shell }) => {
            generate(shell, &mut Cli::command(), "kubestep", &mut io::stdout());
            Ok(())
        }
        None => {
            if let Err(e) = run(&cli.run, cli.quiet) {
                ui::error(&format!("{e:#}"));
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn run(args: &RunArgs, quiet: bool) -> Result<()> {
    let job_file = args.job_file.as_deref().context("--job-file should be defined")?;
    let mode = Mode::from(args.mode);

    let secrets = keyvault::open_master_vault(args.master_vault_path.as_deref())
        .context("open master vault")?;
    let renderer = Renderer::new(secrets);
    let global = job::global_values(args.set_file.as_deref(), &args.set_value)?;
    let job = Job::load(job_file)?;
    let source = JobDir::new(job.dir());
    let pipeline = Pipeline::new(mode, &renderer, &source);

    log::info!("{} {} ({} steps)", mode, job_file.display(), job.steps.len());

    if mode.generates() {
        let mut generator = Generator::new(io::stdout().lock());
        pipeline.run(&job, &global, &mut generator)?;
        generator.into_inner().flush()?;
        return Ok(());
    }

    let kubectl = Kubectl::new(&args.kubectl)
        .with_kubeconfig(args.kubeconfig.clone())
        .with_context(args.context.clone());
    let options = PruneOptions {
        dry_run: args.dry_run,
        no_delete: args.no_delete,
        order: args.delete_order.into(),
    };
    let mut executor = ClusterExecutor::new(&kubectl, &renderer, &HttpConnector)
        .with_dry_run(args.dry_run)
        .with_prune_options(options);

    let summary = pipeline.run(&job, &global, &mut executor)?;
    if !quiet {
        report(&summary, &executor, args.dry_run);
    }
    Ok(())
}

fn report(summary: &RunSummary, executor: &ClusterExecutor<'_, Kubectl>, dry_run: bool) {
    let applied = format!(
        "{} steps, {} documents applied, {} actions run",
        summary.steps, summary.documents, summary.actions
    );
    if dry_run {
        ui::info(&format!("dry run: {applied}"));
    } else {
        ui::success(&applied);
    }
    if summary.skipped_actions > 0 {
        ui::dim(&format!("{} actions skipped (use -m apply-with-actions)", summary.skipped_actions));
    }
    if let Some(pruned) = &executor.pruned {
        ui::kv("previously deployed", &pruned.previous.to_string());
        ui::kv("deleted", &pruned.deleted.len().to_string());
        if !pruned.skipped.is_empty() {
            ui::kv("not deleted", &pruned.skipped.len().to_string());
        }
    }
}
