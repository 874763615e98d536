//! Validation pipeline for one lifecycle stage.
//!
//! [`HookOrchestrator::run_stage`] runs the stage's validators in order,
//! classifies and optionally recovers failures, applies an audited bypass
//! when one is requested and permitted, and aggregates everything into a
//! [`StageReport`]. Validators never abort the pipeline: errors and panics
//! become `failed` results.
//!
//! A stage succeeds iff every result is `passed`, `skipped` or `waived`.
//! Non-blocking stages (post-commit, post-merge, post-checkout) always answer
//! success to git and carry their failures in a recovery payload instead.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tracing::Instrument;
use uuid::Uuid;

use crate::bypass::{
    is_bypass_permitted, requested_bypass, AuditLedger, BypassInput, BypassMethod, BypassRecord,
};
use crate::cache::{cache_key, ResultCache};
use crate::classify::{ErrorClassification, ErrorClassifier, FailureSignal};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::metrics::MetricsTracker;
use crate::obs;
use crate::recovery::{
    Fixer, RecoveryContext, RecoveryEngine, RecoveryOutcome, RecoveryPaths, RecoveryPolicy,
};
use crate::remediation;
use crate::reporting;
use crate::result::{
    FailureEntry, RecoveryPayload, StageReport, ValidationResult, ValidationStatus,
};
use crate::stage::{HookStage, StageState};
use crate::validator::{StageContext, Validator};
use crate::validators::latest_tags;

/// Runs stages for one repository. Recovery counters and metrics live as
/// long as the orchestrator.
pub struct HookOrchestrator {
    config: Arc<GateConfig>,
    repo_root: PathBuf,
    classifier: ErrorClassifier,
    recovery: RecoveryEngine,
    ledger: AuditLedger,
    cache: Option<ResultCache>,
    metrics: MetricsTracker,
    bypass: BypassInput,
    config_warnings: Vec<String>,
    write_reports: bool,
}

/// Mutable bookkeeping for one `run_stage` call.
#[derive(Default)]
struct StageRun {
    results: BTreeMap<String, ValidationResult>,
    attempts: Vec<RecoveryOutcome>,
    warnings: Vec<String>,
}

impl HookOrchestrator {
    pub fn new(repo_root: impl Into<PathBuf>, config: Arc<GateConfig>, actor: &str) -> Self {
        let repo_root = repo_root.into();
        let state_dir = config.state_dir_in(&repo_root);
        let recovery = RecoveryEngine::new(
            RecoveryPolicy {
                max_attempts: config.max_recovery_attempts,
            },
            RecoveryPaths {
                state_dir: state_dir.clone(),
                cache_dir: state_dir.join("cache"),
                context_file: config.context_path_in(&repo_root),
                max_history: config.max_history,
            },
        );
        Self {
            classifier: ErrorClassifier::new(config.strict_mode),
            ledger: AuditLedger::in_state_dir(&state_dir, actor),
            metrics: MetricsTracker::new(config.metrics_window),
            bypass: BypassInput {
                development_mode: config.development_mode,
                ..BypassInput::default()
            },
            recovery,
            cache: None,
            config_warnings: Vec::new(),
            write_reports: true,
            config,
            repo_root,
        }
    }

    /// Formatter used by lint recovery.
    pub fn with_fixer(mut self, fixer: Arc<dyn Fixer>) -> Self {
        self.recovery = self.recovery.with_fixer(fixer);
        self
    }

    /// Override source for bypass triggers (defaults to no triggers).
    pub fn with_bypass_input(mut self, input: BypassInput) -> Self {
        self.bypass = input;
        self
    }

    /// Findings from loading the configuration, repeated in every report.
    pub fn with_config_warnings(mut self, warnings: Vec<String>) -> Self {
        self.config_warnings = warnings;
        self
    }

    /// Keep report and recovery files off disk.
    pub fn without_report_files(mut self) -> Self {
        self.write_reports = false;
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Run `validators` for `ctx.stage` and produce its report.
    pub async fn run_stage(
        &mut self,
        ctx: &StageContext,
        validators: &[Box<dyn Validator>],
    ) -> StageReport {
        let id = Uuid::new_v4();
        let span = obs::stage_span(ctx.stage, &id.to_string());
        self.run_stage_in_span(id, ctx, validators)
            .instrument(span)
            .await
    }

    async fn run_stage_in_span(
        &mut self,
        id: Uuid,
        ctx: &StageContext,
        validators: &[Box<dyn Validator>],
    ) -> StageReport {
        let stage = ctx.stage;
        let started = Instant::now();
        let mut state = StageState::Skipped;
        let mut run = StageRun {
            warnings: self.config_warnings.clone(),
            ..StageRun::default()
        };

        if !self.config.hooks.stage_enabled(stage) || validators.is_empty() {
            tracing::debug!(stage = %stage, "stage disabled or has no validators");
            return self.finish(id, stage, state, run, started, None);
        }

        state.advance(StageState::Running);
        obs::emit_stage_started(stage, validators.len());
        self.open_cache(ctx, &mut run).await;

        for validator in validators {
            let result = self.run_validator(ctx, validator.as_ref(), &mut run).await;
            run.results.insert(validator.name().to_string(), result);
        }

        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.save() {
                tracing::warn!(error = %e, "result cache not saved");
                run.warnings.push(format!("result cache could not be saved: {e}"));
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        let budget = self.config.budget_ms(stage);
        if MetricsTracker::exceeded_budget(elapsed, budget) {
            self.budget_exceeded(ctx, elapsed, budget, &mut run).await;
        }

        let mut failures = self.failure_entries(stage, &run.results);
        let mut bypasses = Vec::new();
        if !failures.is_empty() && stage.blocking() {
            bypasses = self.apply_bypass(ctx, &failures, &mut run);
            if !bypasses.is_empty() {
                failures.clear();
            }
        }

        let next = if run.results.values().all(|r| r.status.is_success()) {
            if bypasses.is_empty() {
                StageState::Passed
            } else {
                StageState::Waived
            }
        } else {
            StageState::Failed
        };
        state.advance(next);

        let mut report = self.finish(id, stage, state, run, started, Some(failures));
        report.bypasses = bypasses;
        self.persist(&report);
        report
    }

    /// Report for a stage that could not run at all (unreadable config, git
    /// unavailable). Non-blocking stages still answer success.
    pub fn failed_report(stage: HookStage, error: &GateError) -> StageReport {
        let detail = format!("hookgate could not run: {error}");
        let classification = ErrorClassifier::default().classify_message(&detail, stage);
        let failure = FailureEntry {
            validator: "hookgate".to_string(),
            category: classification.category,
            severity: classification.severity,
            detail: detail.clone(),
        };
        let mut results = BTreeMap::new();
        results.insert("hookgate".to_string(), ValidationResult::failed(detail));
        let failures = vec![failure];
        let recovery = (!stage.blocking()).then(|| RecoveryPayload {
            attempts: Vec::new(),
            rollback_recommendations: remediation::rollback_recommendations(stage, &failures),
        });
        StageReport {
            id: Uuid::new_v4(),
            stage,
            timestamp: Utc::now(),
            duration_ms: 0,
            state: StageState::Failed,
            success: !stage.blocking(),
            results,
            remediation: Some(remediation::assemble(stage, &failures, &[])),
            failure_report: Some(failures),
            recovery,
            bypasses: Vec::new(),
            warnings: Vec::new(),
        }
    }

    async fn open_cache(&mut self, ctx: &StageContext, run: &mut StageRun) {
        if self.cache.is_some() {
            return;
        }
        if ctx.fingerprint.is_none() || self.config.cache_ttl_secs == 0 {
            self.cache = Some(ResultCache::disabled());
            return;
        }
        let dir = ctx.state_dir().join("cache");
        let opened = match ResultCache::open(&dir, self.config.cache_ttl_secs) {
            Ok(cache) => cache,
            Err(e) => {
                run.warnings.push(e.to_string());
                let signal = FailureSignal::new(e.to_string());
                let classification = self.classifier.classify(&signal, ctx.stage);
                let recovered = self.recover(ctx, &classification, signal, run).await;
                let reopened = if recovered {
                    ResultCache::open(&dir, self.config.cache_ttl_secs).ok()
                } else {
                    None
                };
                reopened.unwrap_or_else(ResultCache::disabled)
            }
        };
        self.cache = Some(opened);
    }

    async fn run_validator(
        &mut self,
        ctx: &StageContext,
        validator: &dyn Validator,
        run: &mut StageRun,
    ) -> ValidationResult {
        let name = validator.name();
        let started = Instant::now();

        if ctx.stage == HookStage::PrePush && validator.covered_by_remote_ci(&self.config.remote_ci)
        {
            let result = ValidationResult::waived("covered by remote CI");
            obs::emit_validator_finished(name, "waived", 0, false);
            return result;
        }

        let key = match (&ctx.fingerprint, validator.cacheable()) {
            (Some(fp), true) => Some(cache_key(ctx.stage, name, fp)),
            _ => None,
        };
        if let Some(hit) = key
            .as_deref()
            .and_then(|k| self.cache.as_ref().and_then(|c| c.get(k)))
        {
            obs::emit_validator_finished(name, "passed", 0, true);
            return hit;
        }

        let mut result = execute(validator, ctx).await;

        if !result.status.is_success() && self.config.auto_recovery {
            let signal = FailureSignal::from_validator(name, result.detail.clone());
            let classification = self.classifier.classify(&signal, ctx.stage);
            if classification.recoverable && self.recover(ctx, &classification, signal, run).await
            {
                let action = run
                    .attempts
                    .last()
                    .and_then(|a| a.action)
                    .map(|a| format!("{a:?}"))
                    .unwrap_or_default();
                result = execute(validator, ctx).await;
                result
                    .notes
                    .push(format!("re-validated after recovery ({action})"));
            }
        }

        if let (Some(k), Some(cache)) = (key, self.cache.as_mut()) {
            cache.put(k, &result);
        }

        obs::emit_validator_finished(
            name,
            status_name(result.status),
            started.elapsed().as_millis() as u64,
            false,
        );
        result
    }

    /// One recovery attempt; records the outcome and returns whether it succeeded.
    async fn recover(
        &mut self,
        ctx: &StageContext,
        classification: &ErrorClassification,
        signal: FailureSignal,
        run: &mut StageRun,
    ) -> bool {
        let mut rctx = RecoveryContext::new(ctx.stage, &self.repo_root, signal);
        rctx.files = ctx.relevant_files().to_vec();
        if let Some(tags) = latest_tags(ctx) {
            rctx.persona = Some(tags.persona);
            rctx.step = Some(tags.step);
        }
        let outcome = self.recovery.attempt_recovery(classification, &rctx).await;
        let successful = outcome.successful;
        if !successful {
            if let Some(reason) = &outcome.reason {
                tracing::debug!(category = %classification.category, %reason, "recovery did not fix the failure");
            }
        }
        run.attempts.push(outcome);
        successful
    }

    async fn budget_exceeded(
        &mut self,
        ctx: &StageContext,
        elapsed: u64,
        budget: u64,
        run: &mut StageRun,
    ) {
        let message = format!("stage exceeded its time budget ({elapsed}ms > {budget}ms)");
        tracing::warn!(stage = %ctx.stage, elapsed, budget, "time budget exceeded");
        run.warnings.push(message.clone());
        if self.config.auto_recovery {
            let signal = FailureSignal::new(message);
            let classification = self.classifier.classify(&signal, ctx.stage);
            self.recover(ctx, &classification, signal, run).await;
        }
    }

    fn failure_entries(
        &self,
        stage: HookStage,
        results: &BTreeMap<String, ValidationResult>,
    ) -> Vec<(FailureEntry, ErrorClassification)> {
        results
            .iter()
            .filter(|(_, r)| !r.status.is_success())
            .map(|(name, r)| {
                let signal = FailureSignal::from_validator(name.clone(), r.detail.clone());
                let classification = self.classifier.classify(&signal, stage);
                let entry = FailureEntry {
                    validator: name.clone(),
                    category: classification.category,
                    severity: classification.severity,
                    detail: r.detail.clone(),
                };
                (entry, classification)
            })
            .collect()
    }

    /// Waive every failure when a requested bypass is permitted for all of
    /// them. Partial bypasses are refused.
    fn apply_bypass(
        &self,
        ctx: &StageContext,
        failures: &[(FailureEntry, ErrorClassification)],
        run: &mut StageRun,
    ) -> Vec<BypassRecord> {
        let mut input = self.bypass.clone();
        if input.text.is_none() {
            input.text = ctx
                .commit_message
                .clone()
                .or_else(|| ctx.commit_messages.last().cloned());
        }
        let Some(method) = requested_bypass(&input) else {
            return Vec::new();
        };

        let refused: Vec<String> = failures
            .iter()
            .filter(|(_, c)| !is_bypass_permitted(c, method))
            .map(|(f, c)| format!("{} ({})", f.validator, c.category))
            .collect();
        if !refused.is_empty() {
            run.warnings.push(format!(
                "bypass via {method} refused: {} cannot be bypassed",
                refused.join(", ")
            ));
            return Vec::new();
        }

        let reason = input.reason(method);
        let classifications: Vec<ErrorClassification> =
            failures.iter().map(|(_, c)| *c).collect();
        let records = match self
            .ledger
            .record_bypasses(ctx.stage, &classifications, method, &reason)
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "bypass not recorded");
                run.warnings
                    .push(format!("bypass via {method} not applied: {e}"));
                return Vec::new();
            }
        };
        for (failure, _) in failures {
            if let Some(result) = run.results.get_mut(&failure.validator) {
                result.status = ValidationStatus::Waived;
                result.detail = format!("waived via {method}: {}", result.detail);
            }
        }
        if method == BypassMethod::SkipAll {
            run.warnings
                .push("all validation bypassed for this invocation".to_string());
        }
        records
    }

    fn finish(
        &mut self,
        id: Uuid,
        stage: HookStage,
        state: StageState,
        mut run: StageRun,
        started: Instant,
        failures: Option<Vec<(FailureEntry, ErrorClassification)>>,
    ) -> StageReport {
        let duration_ms = started.elapsed().as_millis() as u64;
        let failures: Vec<FailureEntry> = failures
            .unwrap_or_default()
            .into_iter()
            .map(|(f, _)| f)
            .collect();

        for (name, result) in &run.results {
            for note in &result.notes {
                run.warnings.push(format!("{name}: {note}"));
            }
        }

        let (failure_report, remediation_text) = if failures.is_empty() {
            (None, None)
        } else {
            let hints: Vec<(String, String)> = run
                .results
                .iter()
                .filter(|(_, r)| !r.status.is_success())
                .filter_map(|(n, r)| r.remediation.clone().map(|h| (n.clone(), h)))
                .collect();
            (
                Some(failures.clone()),
                Some(remediation::assemble(stage, &failures, &hints)),
            )
        };

        let mut payload = RecoveryPayload {
            attempts: std::mem::take(&mut run.attempts),
            rollback_recommendations: Vec::new(),
        };
        if !stage.blocking() && !failures.is_empty() {
            payload.rollback_recommendations = remediation::rollback_recommendations(stage, &failures);
            let names: Vec<String> = failures.iter().map(|f| f.validator.clone()).collect();
            obs::emit_non_blocking_failure(stage, &names);
        }

        let gate_passed = state != StageState::Failed;
        let success = gate_passed || !stage.blocking();
        self.metrics.record(stage, duration_ms, gate_passed);
        obs::emit_stage_finished(stage, duration_ms, success, failures.len());

        StageReport {
            id,
            stage,
            timestamp: Utc::now(),
            duration_ms,
            state,
            success,
            results: run.results,
            failure_report,
            remediation: remediation_text,
            recovery: (!payload.is_empty()).then_some(payload),
            bypasses: Vec::new(),
            warnings: run.warnings,
        }
    }

    fn persist(&self, report: &StageReport) {
        if !self.write_reports {
            return;
        }
        let state_dir = self.config.state_dir_in(&self.repo_root);
        if let Err(e) = reporting::write_stage_report(&state_dir, report, &self.metrics.summary()) {
            tracing::warn!(error = %e, "stage report not written");
        }
        if !report.stage.blocking() && report.failure_report.is_some() {
            match reporting::write_recovery_report(&state_dir, report) {
                Ok(path) => tracing::warn!(path = %path.display(), "recovery report written"),
                Err(e) => tracing::warn!(error = %e, "recovery report not written"),
            }
        }
        for dir in ["reports", "recovery"] {
            let keep = self.config.report_retention;
            match reporting::prune_reports(&state_dir.join(dir), report.stage, keep) {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(dir, removed, "old reports pruned"),
                Err(e) => tracing::warn!(error = %e, dir, "old reports not pruned"),
            }
        }
    }
}

/// Run one validator, turning errors and panics into `failed` results.
async fn execute(validator: &dyn Validator, ctx: &StageContext) -> ValidationResult {
    match AssertUnwindSafe(validator.validate(ctx)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ValidationResult::failed(format!("{e:#}")),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            ValidationResult::failed(format!("validator panicked: {message}"))
        }
    }
}

fn status_name(status: ValidationStatus) -> &'static str {
    match status {
        ValidationStatus::Passed => "passed",
        ValidationStatus::Failed => "failed",
        ValidationStatus::Warning => "warning",
        ValidationStatus::Skipped => "skipped",
        ValidationStatus::Waived => "waived",
    }
}
