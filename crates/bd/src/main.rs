// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! `bd`: the command-line entry point to a beads workspace. A thin CLI
//! surface over C1-C9 plus the C8 connect-or-start/direct-store
//! routing that makes every command below work whether or not a daemon
//! happens to be running.
//!
//! A `clap::Parser` with a `Subcommand` enum, one module per command
//! group, dispatching into either a daemon client or a direct store
//! handle.

mod client;
mod daemon_process;
mod direct;
mod env;
mod output;
mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beads_daemon::protocol::{
    AgentPodInfo, BusEmitArgs, CreateArgs, FilterArgs, SetStateArgs, UpdateArgs, WorkFilterArgs,
};
use beads_storage::Storage;
use clap::{Parser, Subcommand};

use client::DaemonClient;
use output::OutputFormat;
use workspace::CliWorkspace;

#[derive(Parser)]
#[command(name = "bd", version, about = "A local-first issue tracker for human/agent teams")]
struct Cli {
    /// Run as if started in <dir> instead of the current directory.
    #[arg(short = 'C', long = "directory", global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Output format.
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    /// Actor name recorded against every mutation (defaults to $USER).
    #[arg(long = "actor", global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new .beads workspace in this directory.
    Init {
        /// Storage backend: "plain" or "dolt".
        #[arg(long, default_value = "plain")]
        backend: String,
    },
    /// Create a new issue.
    Create {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long, default_value_t = 2)]
        priority: u8,
        #[arg(short, long)]
        kind: Option<String>,
        #[arg(short, long)]
        assignee: Option<String>,
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },
    /// Update fields on an existing issue.
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<u8>,
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Show a single issue.
    Show { id: String },
    /// List issues, optionally filtered.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        priority: Option<u8>,
        #[arg(long = "label")]
        labels: Vec<String>,
    },
    /// Full-text search over title/description.
    Search {
        query: String,
        #[arg(long)]
        status: Option<String>,
    },
    /// Close an issue.
    Close {
        id: String,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Tombstone (soft-delete) an issue.
    Tombstone {
        id: String,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Dependency management.
    #[command(subcommand)]
    Dep(DepCommand),
    /// Label management.
    #[command(subcommand)]
    Label(LabelCommand),
    /// List issues that are unblocked, open, and ready to work.
    Ready {
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        unassigned: bool,
        #[arg(long)]
        priority: Option<u8>,
    },
    /// Write the JSONL export file now.
    Export {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the mutation history behind an issue.
    Decision { id: String },
    /// Set a `dimension:value` state label.
    SetState {
        id: String,
        dimension: String,
        value: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Daemon process management.
    #[command(subcommand)]
    Daemon(DaemonCommand),
    /// Agent pod registry.
    #[command(subcommand)]
    Pod(PodCommand),
    /// Emit a lifecycle hook event to the daemon's event bus.
    Emit {
        hook: String,
        #[arg(long, default_value = "null")]
        stdin_json: String,
    },
}

#[derive(Subcommand)]
enum DepCommand {
    /// Add a dependency edge (issue_id depends_on_id).
    Add {
        issue_id: String,
        depends_on_id: String,
        #[arg(long = "type")]
        dep_type: Option<String>,
    },
    /// Remove a dependency edge.
    Remove { issue_id: String, depends_on_id: String },
}

#[derive(Subcommand)]
enum LabelCommand {
    Add { issue_id: String, label: String },
    Remove { issue_id: String, label: String },
}

#[derive(Subcommand)]
enum DaemonCommand {
    /// Report daemon status for this workspace.
    Status,
    /// Start the daemon for this workspace, if not already running.
    Start,
    /// Ask the daemon to shut down.
    Stop {
        /// Skip the graceful SIGTERM wait and force-kill immediately.
        #[arg(long)]
        kill: bool,
    },
}

#[derive(Subcommand)]
enum PodCommand {
    Register {
        pod_id: String,
        #[arg(long)]
        rig: Option<String>,
    },
    Status { pod_id: String },
    Deregister { pod_id: String },
    List {
        #[arg(long)]
        rig: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let start_dir = match &cli.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("reading current directory")?,
    };
    let actor = cli.actor.clone().or_else(|| std::env::var("USER").ok()).unwrap_or_else(|| "unknown".to_string());

    if let Commands::Init { backend } = &cli.command {
        let ws = CliWorkspace::init(&start_dir, backend)?;
        println!("initialized .beads workspace at {}", ws.paths.beads_dir.display());
        return Ok(());
    }

    let ws = CliWorkspace::resolve_from(&start_dir)?;
    dispatch(&ws, cli.command, cli.output, &actor).await
}

/// Whether a subcommand mutates the store (and should therefore try to
/// auto-start the daemon) or only reads it.
fn is_mutation(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Show { .. }
            | Commands::List { .. }
            | Commands::Search { .. }
            | Commands::Ready { .. }
            | Commands::Decision { .. }
            | Commands::Daemon(DaemonCommand::Status)
            | Commands::Daemon(DaemonCommand::Stop { .. })
            | Commands::Pod(PodCommand::Status { .. })
            | Commands::Pod(PodCommand::List { .. })
    )
}

enum Backend {
    Daemon(DaemonClient),
    Direct(Arc<dyn Storage>),
}

impl Backend {
    async fn resolve(ws: &CliWorkspace, mutation: bool) -> Result<Self> {
        if !ws.auto_start_allowed() {
            return Ok(Backend::Direct(ws.open_storage_direct()?));
        }
        let connected = if mutation { DaemonClient::connect_or_start(ws).await } else { DaemonClient::connect(ws) };
        match connected {
            Ok(client) => Ok(Backend::Daemon(client)),
            Err(client::ClientError::DaemonNotRunning) => Ok(Backend::Direct(ws.open_storage_direct()?)),
            Err(e) => Err(e.into()),
        }
    }
}

async fn dispatch(ws: &CliWorkspace, command: Commands, format: OutputFormat, actor: &str) -> Result<()> {
    let backend = Backend::resolve(ws, is_mutation(&command)).await?;

    match command {
        Commands::Init { .. } => unreachable!("handled before dispatch"),

        Commands::Create { title, description, priority, kind, assignee, labels } => {
            let args = CreateArgs {
                id: None,
                title,
                description: description.unwrap_or_default(),
                priority,
                kind,
                assignee,
                labels,
                actor: actor.to_string(),
            };
            let issue = match backend {
                Backend::Daemon(c) => c.call("create", args).await?,
                Backend::Direct(s) => direct::create(s.as_ref(), args)?,
            };
            output::print_issue(format, &issue);
        }

        Commands::Update { id, title, description, status, priority, assignee } => {
            let args = UpdateArgs {
                id,
                title,
                description,
                status,
                priority,
                assignee: assignee.map(Some),
                actor: actor.to_string(),
                ..Default::default()
            };
            let issue = match backend {
                Backend::Daemon(c) => c.call("update", args).await?,
                Backend::Direct(s) => direct::update(s.as_ref(), args)?,
            };
            output::print_issue(format, &issue);
        }

        Commands::Show { id } => {
            let issue = match backend {
                Backend::Daemon(c) => c.call("show", serde_json::json!({ "id": id })).await?,
                Backend::Direct(s) => direct::show(s.as_ref(), &id)?,
            };
            output::print_issue(format, &issue);
        }

        Commands::List { status, assignee, priority, labels } => {
            let args = FilterArgs { status, assignee, priority, labels, ..Default::default() };
            let issues = match backend {
                Backend::Daemon(c) => c.call("list", args).await?,
                Backend::Direct(s) => direct::list(s.as_ref(), args.into())?,
            };
            output::print_issue_list(format, &issues);
        }

        Commands::Search { query, status } => {
            let filter = FilterArgs { status, ..Default::default() };
            let issues = match backend {
                Backend::Daemon(c) => {
                    c.call("search", serde_json::json!({ "query": query, "filter": filter })).await?
                }
                Backend::Direct(s) => direct::search(s.as_ref(), &query, filter.into())?,
            };
            output::print_issue_list(format, &issues);
        }

        Commands::Close { id, reason } => {
            let issue = match backend {
                Backend::Daemon(c) => {
                    c.call("close", serde_json::json!({ "id": id, "actor": actor, "reason": reason })).await?
                }
                Backend::Direct(s) => direct::close(s.as_ref(), &id, actor)?,
            };
            output::print_issue(format, &issue);
        }

        Commands::Tombstone { id, reason } => {
            let issue = match backend {
                Backend::Daemon(c) => {
                    c.call("tombstone", serde_json::json!({ "id": id, "actor": actor, "reason": reason })).await?
                }
                Backend::Direct(s) => direct::tombstone(s.as_ref(), &id, actor, reason.as_deref())?,
            };
            output::print_issue(format, &issue);
        }

        Commands::Dep(DepCommand::Add { issue_id, depends_on_id, dep_type }) => {
            match backend {
                Backend::Daemon(c) => {
                    c.call_empty(
                        "add_dependency",
                        serde_json::json!({
                            "issue_id": issue_id, "depends_on_id": depends_on_id,
                            "dep_type": dep_type, "actor": actor,
                        }),
                    )
                    .await?
                }
                Backend::Direct(s) => {
                    direct::add_dependency(s.as_ref(), &issue_id, &depends_on_id, dep_type.as_deref(), actor)?
                }
            }
            println!("added dependency {issue_id} -> {depends_on_id}");
        }

        Commands::Dep(DepCommand::Remove { issue_id, depends_on_id }) => {
            match backend {
                Backend::Daemon(c) => {
                    c.call_empty(
                        "remove_dependency",
                        serde_json::json!({ "issue_id": issue_id, "depends_on_id": depends_on_id, "actor": actor }),
                    )
                    .await?
                }
                Backend::Direct(s) => direct::remove_dependency(s.as_ref(), &issue_id, &depends_on_id, actor)?,
            }
            println!("removed dependency {issue_id} -> {depends_on_id}");
        }

        Commands::Label(LabelCommand::Add { issue_id, label }) => {
            match backend {
                Backend::Daemon(c) => {
                    c.call_empty(
                        "add_label",
                        serde_json::json!({ "issue_id": issue_id, "label": label, "actor": actor }),
                    )
                    .await?
                }
                Backend::Direct(s) => direct::add_label(s.as_ref(), &issue_id, &label, actor)?,
            }
            println!("added label {label} to {issue_id}");
        }

        Commands::Label(LabelCommand::Remove { issue_id, label }) => {
            match backend {
                Backend::Daemon(c) => {
                    c.call_empty(
                        "remove_label",
                        serde_json::json!({ "issue_id": issue_id, "label": label, "actor": actor }),
                    )
                    .await?
                }
                Backend::Direct(s) => direct::remove_label(s.as_ref(), &issue_id, &label, actor)?,
            }
            println!("removed label {label} from {issue_id}");
        }

        Commands::Ready { assignee, unassigned, priority } => {
            let args = WorkFilterArgs { assignee, unassigned, priority, ..Default::default() };
            let issues = match backend {
                Backend::Daemon(c) => c.call("get_ready_work", args).await?,
                Backend::Direct(s) => direct::get_ready_work(s.as_ref(), args.into())?,
            };
            output::print_issue_list(format, &issues);
        }

        Commands::Export { path } => {
            let path_str = path.as_ref().map(|p| p.display().to_string());
            let result: beads_daemon::protocol::ExportResult = match backend {
                Backend::Daemon(c) => c.call("export", serde_json::json!({ "path": path_str })).await?,
                Backend::Direct(s) => {
                    let export_path = path.unwrap_or_else(|| ws.paths.export_path.clone());
                    let mode = resolve_sync_mode(&ws.config, s.as_ref());
                    direct::export(s.as_ref(), &export_path, mode)
                }
            };
            if !result.success {
                anyhow::bail!(result.error.unwrap_or_else(|| "export failed".to_string()));
            }
            println!("export written");
        }

        Commands::Decision { id } => {
            let info: beads_daemon::protocol::DecisionInfo = match backend {
                Backend::Daemon(c) => c.call("decision_get", serde_json::json!({ "id": id })).await?,
                Backend::Direct(s) => direct::decision_get(s.as_ref(), &id)?,
            };
            output::print_value(format, &serde_json::to_value(&info)?);
        }

        Commands::SetState { id, dimension, value, reason } => {
            let args = SetStateArgs { id, dimension, new_value: value, reason, actor: actor.to_string() };
            let result: beads_daemon::protocol::SetStateResult = match backend {
                Backend::Daemon(c) => c.call("set_state", args).await?,
                Backend::Direct(s) => direct::set_state(s.as_ref(), args)?,
            };
            output::print_value(format, &serde_json::to_value(&result)?);
        }

        Commands::Daemon(DaemonCommand::Status) => match backend {
            Backend::Daemon(c) => {
                let status: serde_json::Value = c.call("status", serde_json::Value::Null).await?;
                output::print_value(format, &status);
            }
            Backend::Direct(_) => println!("daemon not running for this workspace"),
        },

        Commands::Daemon(DaemonCommand::Start) => match backend {
            Backend::Daemon(_) => println!("daemon running for this workspace"),
            Backend::Direct(_) => println!("auto-start is disabled for this workspace's backend"),
        },

        Commands::Daemon(DaemonCommand::Stop { kill }) => match backend {
            Backend::Daemon(c) => {
                let pid = daemon_process::read_pid(&ws.paths.pid_path);
                c.shutdown(kill).await?;
                if let Some(pid) = pid {
                    DaemonClient::wait_for_shutdown(pid).await;
                }
                println!("daemon stopped");
            }
            Backend::Direct(_) => println!("daemon not running for this workspace"),
        },

        Commands::Pod(PodCommand::Register { pod_id, rig }) => {
            let args = AgentPodInfo {
                pod_id: pod_id.clone(),
                rig,
                status: "active".to_string(),
                payload: serde_json::Value::Null,
            };
            match backend {
                Backend::Daemon(c) => c.call_empty("agent_pod_register", args).await?,
                Backend::Direct(_) => anyhow::bail!("pod registry requires a running daemon"),
            }
            println!("registered pod {pod_id}");
        }

        Commands::Pod(PodCommand::Status { pod_id }) => {
            let response: serde_json::Value = match backend {
                Backend::Daemon(c) => c.call("agent_pod_status", serde_json::json!({ "pod_id": pod_id })).await?,
                Backend::Direct(_) => anyhow::bail!("pod registry requires a running daemon"),
            };
            output::print_value(format, &response);
        }

        Commands::Pod(PodCommand::Deregister { pod_id }) => match backend {
            Backend::Daemon(c) => {
                c.call_empty("agent_pod_deregister", serde_json::json!({ "pod_id": pod_id })).await?;
                println!("deregistered {pod_id}");
            }
            Backend::Direct(_) => anyhow::bail!("pod registry requires a running daemon"),
        },

        Commands::Pod(PodCommand::List { rig }) => {
            let response: serde_json::Value = match backend {
                Backend::Daemon(c) => c.call("agent_pod_list", serde_json::json!({ "rig": rig })).await?,
                Backend::Direct(_) => anyhow::bail!("pod registry requires a running daemon"),
            };
            output::print_value(format, &response);
        }

        Commands::Emit { hook, stdin_json } => {
            let stdin_json: serde_json::Value = serde_json::from_str(&stdin_json).unwrap_or(serde_json::Value::Null);
            let args = BusEmitArgs { hook, stdin_json };
            let result: beads_daemon::protocol::BusEmitResult = match backend {
                Backend::Daemon(c) => c.call("bus_emit", args).await?,
                Backend::Direct(_) => direct::bus_emit(args),
            };
            if let Some(decision) = block_decision(&result) {
                eprintln!("{decision}");
                std::process::exit(2);
            }
            output::print_value(format, &serde_json::to_value(&result)?);
        }
    }

    Ok(())
}

/// A blocked hook result's exit-code-2 payload: a
/// `{"decision":"block","reason":...}` object written to stderr. `None`
/// when the hook didn't block, so the caller falls through to the normal
/// success path.
fn block_decision(result: &beads_daemon::protocol::BusEmitResult) -> Option<String> {
    if !result.block {
        return None;
    }
    Some(serde_json::json!({ "decision": "block", "reason": result.reason }).to_string())
}


/// Mirrors `beads_daemon::lifecycle`'s own sync-mode resolution for the
/// direct-store path, where there's no running daemon to have already
/// resolved it once at startup.
fn resolve_sync_mode(config: &beads_core::Config, storage: &dyn Storage) -> beads_sync::SyncMode {
    let store_value = storage.get_config("sync.mode").ok().flatten();
    beads_sync::resolve_sync_mode(config.sync.mode.as_deref(), store_value.as_deref())
}
