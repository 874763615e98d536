//! Structured lifecycle events for stage runs.
//!
//! Events are emitted at `info!` (warnings at `warn!`) with an `event` field
//! so JSON log consumers can filter on it.

use tracing::{info, warn};

use crate::stage::HookStage;

/// Span scoping every event of one stage run.
///
/// Attach it to the run's future with [`tracing::Instrument`] so it is
/// entered on every poll, whichever thread the future resumes on.
///
/// ```ignore
/// gate.run(ctx).instrument(stage_span(HookStage::PreCommit, "5f0c...")).await
/// // every event below carries stage=pre-commit run_id=5f0c...
/// ```
pub fn stage_span(stage: HookStage, run_id: &str) -> tracing::Span {
    tracing::info_span!("hookgate.stage", stage = %stage, run_id = %run_id)
}

pub fn emit_stage_started(stage: HookStage, validators: usize) {
    info!(event = "stage.started", stage = %stage, validators = validators);
}

pub fn emit_stage_finished(stage: HookStage, duration_ms: u64, success: bool, failed: usize) {
    info!(
        event = "stage.finished",
        stage = %stage,
        duration_ms = duration_ms,
        success = success,
        failed = failed,
    );
}

pub fn emit_validator_finished(name: &str, status: &str, duration_ms: u64, cached: bool) {
    info!(
        event = "validator.finished",
        validator = %name,
        status = %status,
        duration_ms = duration_ms,
        cached = cached,
    );
}

/// A post-* stage failed internally but reported success to git.
pub fn emit_non_blocking_failure(stage: HookStage, failed: &[String]) {
    warn!(event = "stage.non_blocking_failure", stage = %stage, failed = ?failed);
}
