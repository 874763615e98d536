//! Bounded, category-specific automatic recovery.
//!
//! One [`RecoveryEngine::attempt_recovery`] call runs at most one corrective
//! action. Consecutive failed attempts are counted per `(stage, category)`
//! and capped; a success resets the counter. The table lives for the process
//! lifetime only.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::classify::{ErrorCategory, ErrorClassification, FailureSignal};
use crate::error::Result;
use crate::stage::HookStage;
use crate::workflow::{ContextSynchronizer, FsContextStore, Persona};

/// Re-runs the formatter/linter in fix mode.
#[async_trait]
pub trait Fixer: Send + Sync {
    /// Fix what can be fixed in `files`; returns a short summary.
    async fn fix(&self, repo_root: &Path, files: &[String]) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    ReformatFiles,
    SynthesizeContextEntry,
    EnablePerformanceFlags,
    CoverageGapReport,
    ResetCache,
    SyncWorkflowContext,
}

/// Structured result of one recovery call. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub stage: HookStage,
    pub category: ErrorCategory,
    pub successful: bool,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RecoveryAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What the engine needs to know about the failure site.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub stage: HookStage,
    pub repo_root: PathBuf,
    pub files: Vec<String>,
    pub persona: Option<Persona>,
    pub step: Option<String>,
    pub signal: FailureSignal,
}

impl RecoveryContext {
    pub fn new(stage: HookStage, repo_root: impl Into<PathBuf>, signal: FailureSignal) -> Self {
        Self {
            stage,
            repo_root: repo_root.into(),
            files: Vec::new(),
            persona: None,
            step: None,
            signal,
        }
    }
}

/// Performance toggles flipped by recovery and read by tool validators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerfFlags {
    pub bail_on_first_failure: bool,
    pub changed_files_only: bool,
}

impl PerfFlags {
    pub fn path(state_dir: &Path) -> PathBuf {
        state_dir.join("perf-flags.json")
    }

    /// Missing or unreadable flags read as all-off.
    pub fn load(state_dir: &Path) -> Self {
        fs::read(Self::path(state_dir))
            .ok()
            .and_then(|b| serde_json::from_slice(&b).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)?;
        let mut tmp = NamedTempFile::new_in(state_dir)?;
        tmp.write_all(&serde_json::to_vec_pretty(self)?)?;
        tmp.persist(Self::path(state_dir)).map_err(|e| e.error)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    pub max_attempts: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Where recovery side effects may land.
#[derive(Debug, Clone)]
pub struct RecoveryPaths {
    pub state_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub context_file: PathBuf,
    pub max_history: usize,
}

pub struct RecoveryEngine {
    policy: RecoveryPolicy,
    paths: RecoveryPaths,
    fixer: Option<Arc<dyn Fixer>>,
    attempts: HashMap<(HookStage, ErrorCategory), u32>,
}

struct StrategyResult {
    action: Option<RecoveryAction>,
    successful: bool,
    details: Option<String>,
    reason: Option<String>,
}

impl StrategyResult {
    fn ok(action: RecoveryAction, details: impl Into<String>) -> Self {
        Self {
            action: Some(action),
            successful: true,
            details: Some(details.into()),
            reason: None,
        }
    }

    fn failed(action: RecoveryAction, reason: impl Into<String>) -> Self {
        Self {
            action: Some(action),
            successful: false,
            details: None,
            reason: Some(reason.into()),
        }
    }
}

impl RecoveryEngine {
    pub fn new(policy: RecoveryPolicy, paths: RecoveryPaths) -> Self {
        Self {
            policy,
            paths,
            fixer: None,
            attempts: HashMap::new(),
        }
    }

    pub fn with_fixer(mut self, fixer: Arc<dyn Fixer>) -> Self {
        self.fixer = Some(fixer);
        self
    }

    /// Consecutive failed attempts recorded for `(stage, category)`.
    pub fn attempts(&self, stage: HookStage, category: ErrorCategory) -> u32 {
        self.attempts.get(&(stage, category)).copied().unwrap_or(0)
    }

    /// Try one corrective action for a classified failure.
    pub async fn attempt_recovery(
        &mut self,
        classification: &ErrorClassification,
        ctx: &RecoveryContext,
    ) -> RecoveryOutcome {
        let key = (ctx.stage, classification.category);
        let used = self.attempts(ctx.stage, classification.category);
        let mut outcome = RecoveryOutcome {
            stage: ctx.stage,
            category: classification.category,
            successful: false,
            attempt: used,
            action: None,
            details: None,
            reason: None,
        };

        if !classification.recoverable {
            outcome.reason = Some("not recoverable".to_string());
            return outcome;
        }
        if used >= self.policy.max_attempts {
            outcome.reason = Some("max attempts exceeded".to_string());
            tracing::warn!(
                stage = %ctx.stage,
                category = %classification.category,
                attempts = used,
                "recovery suppressed"
            );
            return outcome;
        }

        outcome.attempt = used + 1;
        let result = self.run_strategy(classification.category, ctx).await;
        outcome.action = result.action;
        outcome.successful = result.successful;
        outcome.details = result.details;
        outcome.reason = result.reason;

        if outcome.successful {
            self.attempts.insert(key, 0);
        } else {
            self.attempts.insert(key, used + 1);
        }

        tracing::info!(
            event = "recovery.attempted",
            stage = %ctx.stage,
            category = %classification.category,
            action = ?outcome.action,
            attempt = outcome.attempt,
            successful = outcome.successful,
        );
        outcome
    }

    async fn run_strategy(&self, category: ErrorCategory, ctx: &RecoveryContext) -> StrategyResult {
        match category {
            ErrorCategory::LintError => self.reformat(ctx).await,
            ErrorCategory::ContextStale => self.synthesize_context(ctx),
            ErrorCategory::WorkflowInconsistency => self.sync_workflow(ctx),
            ErrorCategory::PerformanceBudget => self.enable_perf_flags(),
            ErrorCategory::CoverageBelowThreshold => coverage_gap_report(ctx),
            ErrorCategory::CacheFailure => self.reset_cache(),
            other => StrategyResult {
                action: None,
                successful: false,
                details: None,
                reason: Some(format!("no recovery strategy for {other}")),
            },
        }
    }

    async fn reformat(&self, ctx: &RecoveryContext) -> StrategyResult {
        let action = RecoveryAction::ReformatFiles;
        let Some(fixer) = &self.fixer else {
            return StrategyResult::failed(action, "no formatter configured");
        };
        match fixer.fix(&ctx.repo_root, &ctx.files).await {
            Ok(summary) => StrategyResult::ok(action, summary),
            Err(e) => StrategyResult::failed(action, format!("formatter failed: {e:#}")),
        }
    }

    fn synchronizer(&self) -> ContextSynchronizer<FsContextStore> {
        ContextSynchronizer::new(
            FsContextStore::new(&self.paths.context_file),
            self.paths.max_history,
        )
    }

    fn synthesize_context(&self, ctx: &RecoveryContext) -> StrategyResult {
        let action = RecoveryAction::SynthesizeContextEntry;
        let fallback = ctx.persona.zip(ctx.step.clone());
        match self.synchronizer().synthesize_entry(fallback) {
            Ok(hash) => StrategyResult::ok(action, format!("context entry written ({})", &hash[..12])),
            Err(e) => StrategyResult::failed(action, e.to_string()),
        }
    }

    fn sync_workflow(&self, ctx: &RecoveryContext) -> StrategyResult {
        let action = RecoveryAction::SyncWorkflowContext;
        let (Some(persona), Some(step)) = (ctx.persona, ctx.step.as_deref()) else {
            return StrategyResult::failed(action, "no persona/step to sync from");
        };
        match self.synchronizer().sync_context(persona, step, &ctx.files) {
            Ok(sync) => StrategyResult::ok(
                action,
                format!("context synced to {persona} {}", sync.current.step),
            ),
            Err(e) => StrategyResult::failed(action, e.to_string()),
        }
    }

    fn enable_perf_flags(&self) -> StrategyResult {
        let action = RecoveryAction::EnablePerformanceFlags;
        let mut flags = PerfFlags::load(&self.paths.state_dir);
        if flags.bail_on_first_failure && flags.changed_files_only {
            return StrategyResult::failed(action, "performance flags already enabled");
        }
        flags.bail_on_first_failure = true;
        flags.changed_files_only = true;
        match flags.save(&self.paths.state_dir) {
            Ok(()) => StrategyResult::ok(action, "enabled bail-on-first-failure and changed-files-only"),
            Err(e) => StrategyResult::failed(action, e.to_string()),
        }
    }

    fn reset_cache(&self) -> StrategyResult {
        let action = RecoveryAction::ResetCache;
        let dir = &self.paths.cache_dir;
        let cleared = match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        match cleared.and_then(|()| fs::create_dir_all(dir)) {
            Ok(()) => StrategyResult::ok(action, format!("recreated {}", dir.display())),
            Err(e) => StrategyResult::failed(action, e.to_string()),
        }
    }
}

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("static regex"))
}

/// Coverage cannot be raised automatically; the report says by how much it must be.
fn coverage_gap_report(ctx: &RecoveryContext) -> StrategyResult {
    let action = RecoveryAction::CoverageGapReport;
    let numbers: Vec<f64> = percent_pattern()
        .captures_iter(&ctx.signal.message)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    let report = match numbers.as_slice() {
        [actual, threshold, ..] => {
            let mut report = format!(
                "coverage {actual:.1}% is {:.1} points below the {threshold:.1}% threshold",
                threshold - actual
            );
            if !ctx.files.is_empty() {
                report.push_str(&format!("; add tests covering: {}", ctx.files.join(", ")));
            }
            report
        }
        _ => "coverage below threshold; figures unavailable".to_string(),
    };
    StrategyResult {
        action: Some(action),
        successful: false,
        details: Some(report),
        reason: Some("coverage gap requires new tests".to_string()),
    }
}
