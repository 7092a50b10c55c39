//! CLI argument parsing for the approval gateway.
//!
//! Every command shares `--root` and `--config` so the server, the dispatcher
//! and one-off plan edits all resolve the same on-disk layout.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "agw",
    version,
    about = "Remote approval gateway driving a project-plan state machine",
    after_help = "Examples:\n  agw serve --bind 0.0.0.0:8778\n  agw plan --json\n  agw advance\n  agw set-active 6.4.c\n  agw approve --url http://127.0.0.1:8778 --action SET_ACTIVE_STEP --step-id 6.4.c",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Gateway root; relative config paths resolve against it
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub root: PathBuf,

    /// Config file (YAML); defaults to config/phone_approvals.yaml under the root
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Serve(ServeArgs),
    /// Apply pending approvals once and print the results as JSON
    Process,
    Plan(PlanArgs),
    /// Mark the current step done and start the next one
    Advance,
    /// Reopen the step before the current one
    Rollback,
    SetActive(SetActiveArgs),
    SetStatus(SetStatusArgs),
    Recent(RecentArgs),
    Approve(ApproveArgs),
}

/// Run the HTTP surface and the background poller.
#[derive(Parser, Debug)]
#[command(about = "Serve the approval endpoints")]
pub struct ServeArgs {
    /// Listen address (overrides config and PHONE_BIND)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Print the normalized plan tree")]
pub struct PlanArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Point active_step at a plan node")]
pub struct SetActiveArgs {
    /// Plan node id, e.g. 6.4.c
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Parser, Debug)]
#[command(about = "Overwrite a plan node's status")]
pub struct SetStatusArgs {
    #[arg(long, value_name = "ID")]
    pub id: String,

    /// Status text (done, in_progress, planned, blocked, next, ...)
    #[arg(long, value_name = "STATUS")]
    pub status: String,
}

#[derive(Parser, Debug)]
#[command(about = "List recent approval files, newest first")]
pub struct RecentArgs {
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Submit an approval to a running gateway.
#[derive(Parser, Debug)]
#[command(about = "Send an approval to a running gateway")]
pub struct ApproveArgs {
    /// Gateway base URL
    #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:8778")]
    pub url: String,

    /// Action name (SET_ACTIVE_STEP, APPROVE_NEXT, ASK, ...)
    #[arg(long, value_name = "ACTION")]
    pub action: String,

    #[arg(long, value_name = "ID")]
    pub step_id: Option<String>,

    /// Question text for ASK
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Trigger a dispatch cycle right after a successful submit
    #[arg(long)]
    pub process: bool,
}
