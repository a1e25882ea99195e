use crate::pipeline::Mode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use prune::DeleteOrder;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubestep")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Render templates, apply them with kubectl, run actions and prune", long_about = None)]
#[command(propagate_version = true)]
#[command(subcommand_negates_reqs = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// YAML file with the steps to perform
    #[arg(long, required = true)]
    pub job_file: Option<PathBuf>,

    /// YAML file with values that override template values
    #[arg(long)]
    pub set_file: Option<PathBuf>,

    /// Template value as key=value; may be repeated
    #[arg(long, value_name = "KEY=VALUE")]
    pub set_value: Vec<String>,

    /// What to do with the expanded steps
    #[arg(short, long, value_enum, default_value_t = ModeArg::Apply)]
    pub mode: ModeArg,

    /// Prevent any change to the target cluster
    #[arg(long)]
    pub dry_run: bool,

    /// Prevent prune from deleting objects
    #[arg(long)]
    pub no_delete: bool,

    /// Order in which prune deletes objects
    #[arg(long, value_enum, default_value_t = DeleteOrderArg::Lifo)]
    pub delete_order: DeleteOrderArg,

    /// The binary to access the target cluster with
    #[arg(long, default_value = "kubectl")]
    pub kubectl: String,

    /// Equivalent of kubectl --kubeconfig
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Equivalent of kubectl --context
    #[arg(long)]
    pub context: Option<String>,

    /// Directory with the master vault configuration
    #[arg(long, env = "KUBESTEP_MASTER_VAULT_PATH")]
    pub master_vault_path: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Apply templates; skip actions
    Apply,
    /// Apply templates and run actions
    ApplyWithActions,
    /// Write templates to stdout instead of applying them
    Generate,
    /// Write templates and actions to stdout
    GenerateWithActions,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Apply => Mode::Apply,
            ModeArg::ApplyWithActions => Mode::ApplyWithActions,
            ModeArg::Generate => Mode::Generate,
            ModeArg::GenerateWithActions => Mode::GenerateWithActions,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeleteOrderArg {
    /// Reverse of the previous apply order
    Lifo,
    /// Namespaced objects first, then by kind
    KindPriority,
}

impl From<DeleteOrderArg> for DeleteOrder {
    fn from(arg: DeleteOrderArg) -> Self {
        match arg {
            DeleteOrderArg::Lifo => DeleteOrder::Lifo,
            DeleteOrderArg::KindPriority => DeleteOrder::KindPriority,
        }
    }
}
