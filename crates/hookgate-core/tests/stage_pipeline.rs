//! End-to-end behaviour of the per-stage validation pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hookgate_core::bypass::{ENV_OVERRIDE, ENV_REASON};
use hookgate_core::{
    BypassInput, BypassMethod, ErrorCategory, Fixer, GateConfig, GateError, HookOrchestrator,
    HookStage, PerfFlags, RemoteCi, StageContext, StageState, ValidationResult, ValidationStatus,
    Validator,
};

struct Fixed {
    name: &'static str,
    status: ValidationStatus,
    detail: &'static str,
}

fn fixed(name: &'static str, status: ValidationStatus, detail: &'static str) -> Box<dyn Validator> {
    Box::new(Fixed {
        name,
        status,
        detail,
    })
}

#[async_trait]
impl Validator for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let mut result = ValidationResult::passed(self.detail);
        result.status = self.status;
        Ok(result)
    }
}

struct Exploding(&'static str);

#[async_trait]
impl Validator for Exploding {
    fn name(&self) -> &str {
        self.0
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        panic!("context document lock poisoned");
    }
}

struct Erroring;

#[async_trait]
impl Validator for Erroring {
    fn name(&self) -> &str {
        "security-audit"
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        anyhow::bail!("scanner binary not found")
    }

    fn covered_by_remote_ci(&self, remote: &RemoteCi) -> bool {
        remote.security
    }
}

/// Fails with a lint message until `fix_after` calls have happened.
struct Counting {
    calls: Arc<AtomicU32>,
    fix_after: u32,
    cacheable: bool,
}

#[async_trait]
impl Validator for Counting {
    fn name(&self) -> &str {
        "lint"
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.fix_after {
            Ok(ValidationResult::passed("0 problems"))
        } else {
            Ok(ValidationResult::failed("lint failed: 3 problems"))
        }
    }
}

struct OkFixer;

#[async_trait]
impl Fixer for OkFixer {
    async fn fix(&self, _repo_root: &Path, _files: &[String]) -> anyhow::Result<String> {
        Ok("formatted".to_string())
    }
}

struct Slow;

#[async_trait]
impl Validator for Slow {
    fn name(&self) -> &str {
        "test"
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        Ok(ValidationResult::passed("12 passed"))
    }
}

fn setup(config: GateConfig) -> (tempfile::TempDir, Arc<GateConfig>) {
    (tempfile::tempdir().unwrap(), Arc::new(config))
}

fn no_recovery() -> GateConfig {
    GateConfig {
        auto_recovery: false,
        ..GateConfig::default()
    }
}

#[tokio::test]
async fn pre_commit_lint_failure_blocks_and_names_only_lint() {
    let (dir, config) = setup(GateConfig::default());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester");
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators = vec![
        fixed("lint", ValidationStatus::Failed, "lint failed: 3 problems"),
        fixed("test", ValidationStatus::Passed, "12 passed"),
        fixed("context-freshness", ValidationStatus::Passed, "context current"),
    ];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(!report.success);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.state, StageState::Failed);
    let failures = report.failure_report.as_ref().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].validator, "lint");
    assert_eq!(failures[0].category, ErrorCategory::LintError);
    assert_eq!(report.failed_validators(), vec!["lint"]);
    assert!(report.remediation.as_ref().unwrap().contains("formatter"));

    // Lint is recoverable, but no formatter was wired in.
    let attempts = &report.recovery.as_ref().unwrap().attempts;
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].successful);

    let written = dir
        .path()
        .join(".hookgate/reports")
        .join(format!("pre-commit-{}.json", report.id));
    assert!(written.exists());
}

#[tokio::test]
async fn report_directory_keeps_only_the_configured_number_per_stage() {
    let mut config = no_recovery();
    config.report_retention = 2;
    let (dir, config) = setup(config);
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester");

    for stage in [
        HookStage::PreCommit,
        HookStage::PreCommit,
        HookStage::PreCommit,
        HookStage::PrePush,
    ] {
        let ctx = StageContext::new(stage, dir.path(), config.clone());
        let validators = vec![fixed("lint", ValidationStatus::Passed, "clean")];
        gate.run_stage(&ctx, &validators).await;
    }

    let names: Vec<String> = std::fs::read_dir(dir.path().join(".hookgate/reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.iter().filter(|n| n.starts_with("pre-commit-")).count(), 2);
    assert_eq!(names.iter().filter(|n| n.starts_with("pre-push-")).count(), 1);
}

#[tokio::test]
async fn post_merge_panic_still_reports_success_with_rollback_advice() {
    let (dir, config) = setup(GateConfig::default());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester");
    let ctx = StageContext::new(HookStage::PostMerge, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Exploding("workflow-sync"))];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(report.success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.state, StageState::Failed);
    assert!(report.results["workflow-sync"]
        .detail
        .contains("validator panicked"));
    let recovery = report.recovery.as_ref().unwrap();
    assert!(!recovery.rollback_recommendations.is_empty());
    assert!(dir
        .path()
        .join(".hookgate/recovery")
        .join(format!("post-merge-{}.json", report.id))
        .exists());
}

#[tokio::test]
async fn success_iff_every_result_passes_skips_or_waives() {
    use ValidationStatus::*;
    let all = [Passed, Failed, Warning, Skipped, Waived];
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PrePush, dir.path(), config);

    for a in all {
        for b in all {
            for c in all {
                let validators = vec![
                    fixed("test", a, "outcome a"),
                    fixed("build", b, "outcome b"),
                    fixed("workflow-sync", c, "outcome c"),
                ];
                let report = gate.run_stage(&ctx, &validators).await;
                let expected = [a, b, c].iter().all(|s| s.is_success());
                assert_eq!(report.success, expected, "{a:?} {b:?} {c:?}");
                assert_eq!(report.failure_report.is_some(), !expected, "{a:?} {b:?} {c:?}");
            }
        }
    }
}

#[tokio::test]
async fn validator_error_becomes_failed_result() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PrePush, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Erroring)];
    let report = gate.run_stage(&ctx, &validators).await;
    assert!(!report.success);
    assert_eq!(report.results["security-audit"].status, ValidationStatus::Failed);
    assert!(report.results["security-audit"]
        .detail
        .contains("scanner binary not found"));
}

#[tokio::test]
async fn remote_ci_coverage_waives_on_pre_push() {
    let mut config = no_recovery();
    config.remote_ci.security = true;
    let (dir, config) = setup(config);
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PrePush, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Erroring)];
    let report = gate.run_stage(&ctx, &validators).await;
    assert!(report.success);
    assert_eq!(report.results["security-audit"].status, ValidationStatus::Waived);
    assert_eq!(report.results["security-audit"].detail, "covered by remote CI");
}

#[tokio::test]
async fn disabled_stage_is_skipped() {
    let mut config = GateConfig::default();
    config.hooks.pre_commit.enabled = false;
    let (dir, config) = setup(config);
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators = vec![fixed("lint", ValidationStatus::Failed, "lint failed")];
    let report = gate.run_stage(&ctx, &validators).await;
    assert_eq!(report.state, StageState::Skipped);
    assert!(report.success);
    assert!(report.results.is_empty());
}

fn env_override(reason: &str) -> BypassInput {
    BypassInput {
        text: None,
        env: HashMap::from([
            (ENV_OVERRIDE.to_string(), "1".to_string()),
            (ENV_REASON.to_string(), reason.to_string()),
        ]),
        development_mode: false,
    }
}

#[tokio::test]
async fn env_override_waives_bypassable_failures_and_audits_them() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_bypass_input(env_override("hotfix for outage"));
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators = vec![
        fixed("lint", ValidationStatus::Failed, "lint failed: 2 problems"),
        fixed("test", ValidationStatus::Passed, "ok"),
    ];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(report.success);
    assert_eq!(report.state, StageState::Waived);
    assert_eq!(report.results["lint"].status, ValidationStatus::Waived);
    assert_eq!(report.bypasses.len(), 1);
    assert_eq!(report.bypasses[0].bypass_method, BypassMethod::EnvOverride);

    let trail = gate.ledger().trail().unwrap();
    assert_eq!(trail.last(), report.bypasses.last());
    assert_eq!(trail[0].reason, "hotfix for outage");
    assert_eq!(trail[0].actor, "tester");
}

#[tokio::test]
async fn bypass_is_refused_when_any_failure_is_hard_safety() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_bypass_input(env_override("please"));
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators = vec![
        fixed("lint", ValidationStatus::Failed, "lint failed: 2 problems"),
        fixed("test", ValidationStatus::Failed, "3 tests failed"),
    ];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(!report.success);
    assert!(report.bypasses.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("refused")));
    assert!(gate.ledger().trail().unwrap().is_empty());
}

#[tokio::test]
async fn hung_or_keyword_laden_build_failures_cannot_be_bypassed() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_bypass_input(env_override("ship it"));
    let ctx = StageContext::new(HookStage::PrePush, dir.path(), config);

    for detail in [
        "build timed out after 300 seconds",
        "build failed (1 errors): error[E0425]: cannot find value `timeout` in this scope",
    ] {
        let validators = vec![fixed("build", ValidationStatus::Failed, detail)];
        let report = gate.run_stage(&ctx, &validators).await;

        assert!(!report.success, "{detail}");
        assert_eq!(report.state, StageState::Failed);
        assert!(report.bypasses.is_empty());
        assert_eq!(
            report.failure_report.as_ref().unwrap()[0].category,
            ErrorCategory::BuildFailure
        );
    }
    assert!(gate.ledger().trail().unwrap().is_empty());
}

#[tokio::test]
async fn unwritable_ledger_leaves_failures_standing() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_bypass_input(env_override("hotfix"));
    // A plain file where the audit directory belongs.
    std::fs::create_dir_all(dir.path().join(".hookgate")).unwrap();
    std::fs::write(dir.path().join(".hookgate/audit"), "not a directory").unwrap();
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators = vec![
        fixed("lint", ValidationStatus::Failed, "lint failed: 2 problems"),
        fixed("context-freshness", ValidationStatus::Failed, "context is stale"),
    ];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(!report.success);
    assert_eq!(report.state, StageState::Failed);
    assert!(report.bypasses.is_empty());
    assert_eq!(report.results["lint"].status, ValidationStatus::Failed);
    assert_eq!(
        report.results["context-freshness"].status,
        ValidationStatus::Failed
    );
    assert!(report.warnings.iter().any(|w| w.contains("not applied")));
}

#[tokio::test]
async fn dev_prefix_in_commit_message_bypasses_in_development_mode() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_bypass_input(BypassInput {
            development_mode: true,
            ..BypassInput::default()
        });
    let mut ctx = StageContext::new(HookStage::CommitMsg, dir.path(), config);
    ctx.commit_message = Some("WIP: half-done refactor".to_string());

    let validators = vec![fixed(
        "message-format",
        ValidationStatus::Failed,
        "invalid commit message: does not match the required format",
    )];
    let report = gate.run_stage(&ctx, &validators).await;
    assert!(report.success);
    assert_eq!(report.bypasses[0].bypass_method, BypassMethod::DevPrefix);
    assert_eq!(report.bypasses[0].error_category, ErrorCategory::InvalidMessageFormat);
}

#[tokio::test]
async fn successful_recovery_re_runs_the_validator_once() {
    let (dir, config) = setup(GateConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .with_fixer(Arc::new(OkFixer));
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Counting {
        calls: calls.clone(),
        fix_after: 1,
        cacheable: false,
    })];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(report.success);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(report.results["lint"].notes[0].contains("re-validated"));
    let attempts = &report.recovery.as_ref().unwrap().attempts;
    assert!(attempts[0].successful);
}

#[tokio::test]
async fn passed_results_are_reused_for_the_same_work_tree() {
    let (dir, config) = setup(GateConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let mut ctx = StageContext::new(HookStage::PreCommit, dir.path(), config.clone());
    ctx.fingerprint = Some("fingerprint-a".to_string());
    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Counting {
        calls: calls.clone(),
        fix_after: 0,
        cacheable: true,
    })];

    let first = HookOrchestrator::new(dir.path(), config.clone(), "tester")
        .without_report_files()
        .run_stage(&ctx, &validators)
        .await;
    assert!(!first.results["lint"].cached);

    let mut second_gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let second = second_gate.run_stage(&ctx, &validators).await;
    assert!(second.results["lint"].cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    ctx.fingerprint = Some("fingerprint-b".to_string());
    let third = second_gate.run_stage(&ctx, &validators).await;
    assert!(!third.results["lint"].cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corrupt_cache_is_reset_by_recovery() {
    let (dir, config) = setup(GateConfig::default());
    let cache_dir = dir.path().join(".hookgate/cache");
    std::fs::create_dir_all(&cache_dir).unwrap();
    std::fs::write(cache_dir.join("results.json"), b"{not json").unwrap();

    let mut ctx = StageContext::new(HookStage::PreCommit, dir.path(), config.clone());
    ctx.fingerprint = Some("fp".to_string());
    let mut gate = HookOrchestrator::new(dir.path(), config, "tester").without_report_files();
    let validators = vec![fixed("test", ValidationStatus::Passed, "ok")];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(report.success);
    assert!(report.warnings.iter().any(|w| w.contains("result cache unreadable")));
    let attempts = &report.recovery.as_ref().unwrap().attempts;
    assert_eq!(attempts[0].category, ErrorCategory::CacheFailure);
    assert!(attempts[0].successful);
    assert!(!cache_dir.join("results.json").exists());
}

#[tokio::test]
async fn exceeding_the_budget_turns_on_performance_flags() {
    let mut config = GateConfig::default();
    config.stage_budgets_ms = BTreeMap::from([(HookStage::PreCommit, 1)]);
    let (dir, config) = setup(config);
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Slow)];
    let report = gate.run_stage(&ctx, &validators).await;

    assert!(report.success, "a budget overrun is a warning, not a failure");
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("exceeded its time budget")));
    let flags = PerfFlags::load(&dir.path().join(".hookgate"));
    assert!(flags.bail_on_first_failure && flags.changed_files_only);
}

#[tokio::test]
async fn metrics_track_every_run() {
    let (dir, config) = setup(no_recovery());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    gate.run_stage(&ctx, &[fixed("lint", ValidationStatus::Passed, "ok")])
        .await;
    gate.run_stage(&ctx, &[fixed("lint", ValidationStatus::Failed, "lint failed")])
        .await;
    assert_eq!(gate.metrics().len(), 2);
    assert!((gate.metrics().success_rate() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn catastrophic_failure_report_respects_stage_blocking() {
    let err = GateError::Config("expected a boolean for `linting`".to_string());
    let blocking = HookOrchestrator::failed_report(HookStage::PrePush, &err);
    assert!(!blocking.success);
    assert_eq!(blocking.results["hookgate"].status, ValidationStatus::Failed);

    let post = HookOrchestrator::failed_report(HookStage::PostCommit, &err);
    assert!(post.success);
    assert!(!post.recovery.unwrap().rollback_recommendations.is_empty());
}
