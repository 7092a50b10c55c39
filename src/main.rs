use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

mod approvals;
mod atomic;
mod auth;
mod cli;
mod client;
mod config;
mod error;
mod paths;
mod plan;
mod server;
mod util;

use crate::approvals::ApprovalDispatcher;
use crate::cli::{Command, GlobalArgs, RootArgs};
use crate::config::{load_config, validate_config, GatewayConfig};
use crate::paths::{list_approval_names, GatewayPaths};
use crate::plan::{PlanDocument, PlanStateMachine, PlanTree};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.global.verbose);
    run(args)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: RootArgs) -> Result<()> {
    let (config, paths) = load_layout(&args.global)?;
    match args.command {
        Command::Serve(serve) => run_serve(config, paths, serve.bind),
        Command::Process => {
            paths.ensure_dirs()?;
            let results = ApprovalDispatcher::new(&paths).process_pending()?;
            print_json(&results)
        }
        Command::Plan(plan) => {
            let doc = PlanDocument::load(paths.plan_path())?;
            let tree = PlanTree::build(doc.root());
            if plan.json {
                print_json(&tree.to_json())
            } else {
                print!("{}", plan::render_text(&tree));
                let machine = PlanStateMachine::new(paths.plan_path().to_path_buf());
                if let Ok(step) = machine.current_step() {
                    println!("current: {}", step.id);
                }
                Ok(())
            }
        }
        Command::Advance => {
            let machine = PlanStateMachine::new(paths.plan_path().to_path_buf());
            let transition = machine.advance()?;
            match transition.to {
                Some(to) => println!("advanced {} -> {to}", transition.from),
                None => println!("advanced {}; no steps remain", transition.from),
            }
            Ok(())
        }
        Command::Rollback => {
            let machine = PlanStateMachine::new(paths.plan_path().to_path_buf());
            let transition = machine.rollback()?;
            println!(
                "rolled back {} -> {}",
                transition.from,
                transition.to.unwrap_or_default()
            );
            Ok(())
        }
        Command::SetActive(set) => {
            PlanStateMachine::new(paths.plan_path().to_path_buf()).set_active_step(&set.id)?;
            println!("active_step = {}", set.id.trim());
            Ok(())
        }
        Command::SetStatus(set) => {
            PlanStateMachine::new(paths.plan_path().to_path_buf())
                .set_status(&set.id, &set.status)?;
            println!("{} = {}", set.id.trim(), set.status.trim());
            Ok(())
        }
        Command::Recent(recent) => {
            let limit = recent.limit.unwrap_or(config.recent_limit);
            for (label, dir) in [
                ("pending", paths.approvals_dir()),
                ("processed", paths.processed_dir()),
            ] {
                let mut names = list_approval_names(dir)?;
                names.reverse();
                names.truncate(limit);
                println!("{label}:");
                for name in names {
                    println!("  {name}");
                }
            }
            Ok(())
        }
        Command::Approve(approve) => run_approve(&config, approve),
    }
}

fn load_layout(global: &GlobalArgs) -> Result<(GatewayConfig, GatewayPaths)> {
    let root = global
        .root
        .canonicalize()
        .with_context(|| format!("resolve root {}", global.root.display()))?;
    let config = load_config(&root, global.config.as_deref())?;
    let paths = GatewayPaths::new(root, &config);
    Ok((config, paths))
}

fn run_serve(mut config: GatewayConfig, paths: GatewayPaths, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.bind = bind;
        validate_config(&config)?;
    }
    let addr = config.bind_addr()?;
    let gateway = Arc::new(server::Gateway::new(config, paths)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(server::serve(gateway, addr))
}

fn run_approve(config: &GatewayConfig, args: cli::ApproveArgs) -> Result<()> {
    let token = config
        .effective_token()
        .ok_or_else(|| {
            anyhow!("no token configured (set PHONE_APPROVALS_TOKEN or token in config)")
        })?;
    let mut data = Map::new();
    if let Some(step_id) = args.step_id {
        data.insert("step_id".to_string(), Value::String(step_id));
    }
    if let Some(text) = args.text {
        data.insert("text".to_string(), Value::String(text));
    }
    let client = client::ApprovalClient::new(&args.url, token);
    let response = client.submit(&args.action.to_ascii_uppercase(), data)?;
    print_json(&response.body)?;
    if !response.is_success() {
        return Err(anyhow!("gateway rejected approval (HTTP {})", response.status));
    }
    if args.process {
        let processed = client.process()?;
        print_json(&processed.body)?;
        if !processed.is_success() {
            return Err(anyhow!("gateway refused /process (HTTP {})", processed.status));
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
