//! hookgate - validation gate for git lifecycle hooks
//!
//! Install by pointing each git hook at the matching subcommand, e.g.
//! `.git/hooks/pre-commit` containing `exec hookgate pre-commit`.
//!
//! ## Commands
//!
//! - one subcommand per hook stage (`pre-commit`, `commit-msg`, `pre-push`, ...)
//! - `audit`: print the bypass trail
//! - `transition`: check a persona hand-off against the workflow graph
//! - `sync`: record the active persona/step in the context document

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

use hookgate_core::{
    bypass::AuditLedger, check_transition, git, BypassInput, ContextSynchronizer, FsContextStore,
    GateConfig, GateError, HookOrchestrator, HookStage, Persona, RefUpdate, StageContext,
    StageInput, StageReport, StageState, TransitionCheck,
};
use hookgate_tools::{stage_validators, ToolFixer};

#[derive(Parser)]
#[command(name = "hookgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Commit and push validation gate for multi-role workflows", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and print the stage report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: .hookgate/config.json in the repository)
    #[arg(long, global = true, env = "HOOKGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint, quick tests and context freshness over the staged files
    PreCommit,

    /// Check the commit message format
    CommitMsg {
        /// File holding the proposed message (passed by git)
        file: PathBuf,
    },

    /// Full validation before refs leave the machine; ref lines on stdin
    PrePush {
        /// Remote name
        remote: Option<String>,

        /// Remote URL
        url: Option<String>,
    },

    /// Sync the context document from the new commit
    PostCommit,

    /// Sync the context document after a merge
    PostMerge {
        /// 1 when the merge was a squash
        squash: Option<String>,
    },

    /// Check workflow state before history is rewritten
    PreRebase {
        /// Upstream the series was forked from
        upstream: Option<String>,

        /// Branch being rebased (default: current)
        branch: Option<String>,
    },

    /// Check context freshness after switching branches
    PostCheckout {
        /// Previous HEAD
        prev: String,

        /// New HEAD
        new: String,

        /// 1 for a branch checkout, 0 for a file checkout
        #[arg(default_value = "1")]
        flag: String,
    },

    /// Server-side range check; `old new ref` lines on stdin
    PreReceive,

    /// Print the bypass audit trail in order
    Audit {
        /// Only show the last N records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check a persona hand-off against the workflow graph
    Transition {
        /// Current persona tag
        from: String,

        /// Next persona tag
        to: String,
    },

    /// Record the active persona and step in the context document
    Sync {
        #[arg(short, long)]
        persona: String,

        #[arg(short, long)]
        step: String,

        /// Files touched by the work being recorded
        #[arg(short, long)]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    hookgate_core::init_tracing(cli.json, level);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let root = git::repo_root(&cwd).unwrap_or(cwd);

    let json = cli.json;
    let config = cli.config;
    let code = match cli.command {
        Commands::PreCommit => {
            run_hook(&config, &root, HookStage::PreCommit, Ok(StageInput::default()), json).await
        }
        Commands::CommitMsg { file } => {
            let input = read_commit_message(&file).map(|message| StageInput {
                message: Some(message),
                ..StageInput::default()
            });
            run_hook(&config, &root, HookStage::CommitMsg, input, json).await
        }
        Commands::PrePush { remote, url } => {
            tracing::debug!(?remote, ?url, "pre-push");
            let input = read_ref_updates(RefUpdate::parse_push_line);
            run_hook(&config, &root, HookStage::PrePush, input, json).await
        }
        Commands::PostCommit => {
            run_hook(&config, &root, HookStage::PostCommit, Ok(StageInput::default()), json).await
        }
        Commands::PostMerge { squash } => {
            tracing::debug!(squash = squash.as_deref() == Some("1"), "post-merge");
            run_hook(&config, &root, HookStage::PostMerge, Ok(StageInput::default()), json).await
        }
        Commands::PreRebase { upstream, branch } => {
            tracing::debug!(?upstream, ?branch, "pre-rebase");
            run_hook(&config, &root, HookStage::PreRebase, Ok(StageInput::default()), json).await
        }
        Commands::PostCheckout { prev, new, flag } => {
            if flag == "0" {
                // File checkouts do not move HEAD.
                return Ok(ExitCode::SUCCESS);
            }
            let input = StageInput {
                checkout: Some((prev, new)),
                ..StageInput::default()
            };
            run_hook(&config, &root, HookStage::PostCheckout, Ok(input), json).await
        }
        Commands::PreReceive => {
            let input = read_ref_updates(RefUpdate::parse_receive_line);
            run_hook(&config, &root, HookStage::PreReceive, input, json).await
        }
        Commands::Audit { limit } => cmd_audit(&config, &root, limit)?,
        Commands::Transition { from, to } => cmd_transition(&from, &to)?,
        Commands::Sync {
            persona,
            step,
            files,
        } => cmd_sync(&config, &root, &persona, &step, &files)?,
    };

    Ok(ExitCode::from(code))
}

fn config_path(config: &Option<PathBuf>, root: &Path) -> PathBuf {
    config
        .clone()
        .unwrap_or_else(|| GateConfig::default_path(root))
}

/// Run one lifecycle stage and print its report. Never fails: any error
/// before the pipeline starts becomes a synthetic failed report.
async fn run_hook(
    config: &Option<PathBuf>,
    root: &Path,
    stage: HookStage,
    input: hookgate_core::Result<StageInput>,
    json: bool,
) -> u8 {
    let input = match input {
        Ok(input) => input,
        Err(e) => return emit(&HookOrchestrator::failed_report(stage, &e), json),
    };
    let loaded = match GateConfig::load(&config_path(config, root)) {
        Ok(loaded) => loaded,
        Err(e) => return emit(&HookOrchestrator::failed_report(stage, &e), json),
    };
    let config = Arc::new(loaded.config);

    let ctx = match StageContext::gather(stage, root, config.clone(), input) {
        Ok(ctx) => ctx,
        Err(e) => return emit(&HookOrchestrator::failed_report(stage, &e), json),
    };

    let validators = stage_validators(stage, &config);
    let mut gate = HookOrchestrator::new(root, config.clone(), &git::actor(root))
        .with_fixer(Arc::new(ToolFixer::new(config.tools.clone())))
        .with_bypass_input(BypassInput::from_env(None, config.development_mode))
        .with_config_warnings(loaded.warnings);

    let report = gate.run_stage(&ctx, &validators).await;
    gate.metrics().flush();
    emit(&report, json)
}

fn emit(report: &StageReport, json: bool) -> u8 {
    if report.state != StageState::Skipped || json {
        eprint!("{}", report.render());
    }
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::error!(error = %e, "failed to serialize stage report"),
        }
    }
    report.exit_code() as u8
}

/// Message text from the commit-msg file, without git's comment lines.
fn read_commit_message(path: &Path) -> hookgate_core::Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GateError::Input(format!(
            "failed to read commit message from {}: {e}",
            path.display()
        ))
    })?;
    Ok(strip_comments(&raw))
}

fn strip_comments(raw: &str) -> String {
    let mut lines = Vec::new();
    for line in raw.lines() {
        // Everything below the scissors line is the verbose diff.
        if line.starts_with("# ------------------------ >8") {
            break;
        }
        if !line.starts_with('#') {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_string()
}

/// Ref update lines git writes on stdin for pre-push and pre-receive.
fn read_ref_updates(
    parse: fn(&str) -> hookgate_core::Result<RefUpdate>,
) -> hookgate_core::Result<StageInput> {
    let text = std::io::read_to_string(std::io::stdin())
        .map_err(|e| GateError::Input(format!("failed to read ref updates from stdin: {e}")))?;
    Ok(StageInput {
        ref_updates: parse_ref_lines(&text, parse)?,
        ..StageInput::default()
    })
}

fn parse_ref_lines(
    text: &str,
    parse: fn(&str) -> hookgate_core::Result<RefUpdate>,
) -> hookgate_core::Result<Vec<RefUpdate>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| parse(l).map_err(|e| GateError::Input(e.to_string())))
        .collect()
}

fn cmd_audit(config: &Option<PathBuf>, root: &Path, limit: Option<usize>) -> Result<u8> {
    let loaded = GateConfig::load(&config_path(config, root))?;
    let ledger = AuditLedger::in_state_dir(&loaded.config.state_dir_in(root), git::actor(root));
    let trail = ledger.trail().context("Failed to read the bypass audit log")?;

    if trail.is_empty() {
        println!("No bypasses recorded.");
        return Ok(0);
    }
    let skip = limit.map_or(0, |n| trail.len().saturating_sub(n));
    for record in &trail[skip..] {
        println!(
            "{}  {:<13} {:<24} {:<14} {}: {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.stage.to_string(),
            record.error_category.to_string(),
            record.bypass_method.to_string(),
            record.actor,
            record.reason
        );
    }
    println!();
    println!("{} bypass(es) recorded", trail.len());
    Ok(0)
}

fn cmd_transition(from: &str, to: &str) -> Result<u8> {
    let from: Persona = from.parse()?;
    let to: Persona = to.parse()?;
    match check_transition(from, to) {
        TransitionCheck::Identity => println!("{from} -> {to}: same persona"),
        TransitionCheck::Allowed => println!("{from} -> {to}: allowed"),
        TransitionCheck::Flagged => {
            let next: Vec<String> = from.allowed_next().iter().map(|p| p.to_string()).collect();
            println!(
                "{from} -> {to}: not in the workflow graph (expected one of: {})",
                next.join(", ")
            );
        }
    }
    Ok(0)
}

fn cmd_sync(
    config: &Option<PathBuf>,
    root: &Path,
    persona: &str,
    step: &str,
    files: &[String],
) -> Result<u8> {
    let config = GateConfig::load(&config_path(config, root))?.config;
    let persona: Persona = persona.parse()?;
    let sync = ContextSynchronizer::new(
        FsContextStore::new(config.context_path_in(root)),
        config.max_history,
    );
    let result = sync
        .sync_context(persona, step, files)
        .context("Failed to update the context document")?;

    println!(
        "Context updated: {} {} ({} history entries)",
        result.current.persona, result.current.step, result.history_len
    );
    for note in &result.notes {
        println!("  warning: {note}");
    }
    Ok(0)
}
