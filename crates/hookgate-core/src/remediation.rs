//! Per-category remediation guidance.

use crate::bypass::{ENV_OVERRIDE, ENV_REASON};
use crate::classify::ErrorCategory;
use crate::result::FailureEntry;
use crate::stage::HookStage;

/// Guidance for one failure category.
pub fn guidance(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::TestFailure => "Fix the failing tests and re-run the suite locally before committing.",
        ErrorCategory::BuildFailure => "Fix the compilation errors; the build must succeed before pushing.",
        ErrorCategory::SecurityVulnerability => {
            "Upgrade or replace the vulnerable dependencies reported by the audit."
        }
        ErrorCategory::InvalidMessageFormat => {
            "Use `[PERSONA] [STEP-NNN] summary`, or a conventional-commit subject if the fallback is enabled."
        }
        ErrorCategory::SyntaxError => "Fix the syntax errors reported above.",
        ErrorCategory::LintError => "Run the formatter and fix the remaining lint findings.",
        ErrorCategory::ToolTimeout => {
            "The tool exceeded its timeout; raise `timeoutSecs` for it or narrow the scope."
        }
        ErrorCategory::ContextStale => {
            "Update the current-work document with `hookgate sync --persona <P> --step <STEP-NNN>`."
        }
        ErrorCategory::PerformanceBudget => {
            "The stage exceeded its time budget; consider enabling changed-files-only testing."
        }
        ErrorCategory::DeprecatedOption => "Replace the deprecated option named above.",
        ErrorCategory::CoverageBelowThreshold => {
            "Add tests for the uncovered code or lower `coverageThreshold`."
        }
        ErrorCategory::WorkflowInconsistency => {
            "Bring the current-work document in line with the latest persona/step with `hookgate sync`."
        }
        ErrorCategory::NotificationFailure
        | ErrorCategory::DocumentationFailure
        | ErrorCategory::MetricsFailure => "Informational only; no action required.",
        ErrorCategory::CacheFailure => "Delete the `.hookgate/cache` directory and retry.",
        ErrorCategory::Unknown => "Inspect the output above and re-run the stage.",
    }
}

/// Remediation text for a failed stage: one guidance line per distinct
/// category, in failure order, followed by the validators' own hints.
pub fn assemble(stage: HookStage, failures: &[FailureEntry], hints: &[(String, String)]) -> String {
    let mut out = String::new();
    let mut seen = Vec::new();
    for failure in failures {
        if seen.contains(&failure.category) {
            continue;
        }
        seen.push(failure.category);
        out.push_str(&format!("  - {}\n", guidance(failure.category)));
    }
    for (validator, hint) in hints {
        out.push_str(&format!("  - {validator}: {hint}\n"));
    }
    if stage.blocking() {
        out.push_str(&format!(
            "  To override a bypassable failure: {ENV_OVERRIDE}=1 {ENV_REASON}=\"why\" git ...\n"
        ));
    }
    out
}

/// Rollback suggestions for failures in post-* stages.
pub fn rollback_recommendations(stage: HookStage, failures: &[FailureEntry]) -> Vec<String> {
    let undo = match stage {
        HookStage::PostMerge => "If the merge is at fault, `git reset --merge ORIG_HEAD` restores the previous tip",
        HookStage::PostCheckout => "Check out the previous branch with `git checkout -`",
        _ => "If the commit is at fault, `git reset --soft HEAD~1` undoes it while keeping changes",
    };
    let mut recs: Vec<String> = failures
        .iter()
        .map(|f| format!("{}: {}", f.validator, guidance(f.category)))
        .collect();
    if !recs.is_empty() {
        recs.push(undo.to_string());
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Severity;

    fn entry(validator: &str, category: ErrorCategory) -> FailureEntry {
        FailureEntry {
            validator: validator.to_string(),
            category,
            severity: Severity::Blocking,
            detail: String::new(),
        }
    }

    #[test]
    fn assemble_deduplicates_categories() {
        let failures = [
            entry("lint", ErrorCategory::LintError),
            entry("lint-extra", ErrorCategory::LintError),
            entry("test", ErrorCategory::TestFailure),
        ];
        let text = assemble(HookStage::PreCommit, &failures, &[]);
        assert_eq!(text.matches(guidance(ErrorCategory::LintError)).count(), 1);
        assert!(text.contains(guidance(ErrorCategory::TestFailure)));
        assert!(text.contains(ENV_OVERRIDE));
    }

    #[test]
    fn rollback_only_when_something_failed() {
        assert!(rollback_recommendations(HookStage::PostMerge, &[]).is_empty());
        let recs = rollback_recommendations(
            HookStage::PostMerge,
            &[entry("workflow-sync", ErrorCategory::WorkflowInconsistency)],
        );
        assert_eq!(recs.len(), 2);
        assert!(recs[1].contains("ORIG_HEAD"));
    }
}
