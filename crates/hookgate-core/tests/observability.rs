//! Structured tracing events emitted around stage runs.

use std::sync::Arc;

use async_trait::async_trait;
use hookgate_core::obs::{
    emit_non_blocking_failure, emit_stage_finished, emit_stage_started, emit_validator_finished,
};
use hookgate_core::{
    stage_span, GateConfig, HookOrchestrator, HookStage, MetricsTracker, StageContext,
    ValidationResult, Validator,
};
use tracing_test::traced_test;

/// Logs only after suspending once.
struct Yielding;

#[async_trait]
impl Validator for Yielding {
    fn name(&self) -> &str {
        "lint"
    }

    async fn validate(&self, _ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        tokio::task::yield_now().await;
        tracing::info!(event = "lint.resumed");
        Ok(ValidationResult::passed("clean"))
    }
}

#[traced_test]
#[test]
fn test_stage_lifecycle_events_are_logged() {
    stage_span(HookStage::PrePush, "run-123").in_scope(|| {
        emit_stage_started(HookStage::PrePush, 4);
        emit_validator_finished("test", "passed", 812, false);
        emit_stage_finished(HookStage::PrePush, 950, true, 0);
    });

    assert!(logs_contain("stage.started"));
    assert!(logs_contain("validator.finished"));
    assert!(logs_contain("stage.finished"));
    assert!(logs_contain("run-123"));
}

#[traced_test]
#[tokio::test]
async fn test_events_after_an_await_stay_in_the_stage_span() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(GateConfig {
        auto_recovery: false,
        ..GateConfig::default()
    });
    let mut gate =
        HookOrchestrator::new(dir.path(), config.clone(), "tester").without_report_files();
    let ctx = StageContext::new(HookStage::PreCommit, dir.path(), config);

    let validators: Vec<Box<dyn Validator>> = vec![Box::new(Yielding)];
    let report = gate.run_stage(&ctx, &validators).await;
    assert!(report.success);

    let run_id = report.id.to_string();
    logs_assert(|lines: &[&str]| {
        let inside: Vec<_> = lines.iter().filter(|l| l.contains("lint.resumed")).collect();
        match inside.as_slice() {
            [line] if line.contains("hookgate.stage") && line.contains(&run_id) => Ok(()),
            other => Err(format!("expected one span-scoped event, got {other:?}")),
        }
    });
    // The span is closed once the run returns.
    tracing::info!(event = "after.run");
    logs_assert(|lines: &[&str]| {
        match lines.iter().find(|l| l.contains("after.run")) {
            Some(line) if !line.contains("hookgate.stage") => Ok(()),
            other => Err(format!("span leaked past the run: {other:?}")),
        }
    });
}

#[traced_test]
#[test]
fn test_non_blocking_failure_is_a_warning() {
    emit_non_blocking_failure(HookStage::PostMerge, &["workflow-sync".to_string()]);
    assert!(logs_contain("WARN"));
    assert!(logs_contain("stage.non_blocking_failure"));
}

#[traced_test]
#[test]
fn test_metrics_flush_emits_snapshot() {
    let mut metrics = MetricsTracker::new(3);
    metrics.record(HookStage::PreCommit, 120, true);
    metrics.flush();
    assert!(logs_contain("average_duration_ms"));
}
