//! Validator results and the per-invocation stage report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bypass::BypassRecord;
use crate::classify::{ErrorCategory, Severity};
use crate::recovery::RecoveryOutcome;
use crate::stage::{HookStage, StageState};

/// Outcome status of a single validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
    Warning,
    Skipped,
    Waived,
}

impl ValidationStatus {
    /// Statuses that let a stage succeed.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ValidationStatus::Passed | ValidationStatus::Skipped | ValidationStatus::Waived
        )
    }
}

/// Result returned by one validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Reused from the result cache instead of re-running the check.
    #[serde(default)]
    pub cached: bool,
    /// Advisory findings that never affect the gate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ValidationResult {
    fn with_status(status: ValidationStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            remediation: None,
            cached: false,
            notes: Vec::new(),
        }
    }

    pub fn passed(detail: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Passed, detail)
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Failed, detail)
    }

    pub fn warning(detail: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Warning, detail)
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Skipped, detail)
    }

    pub fn waived(detail: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Waived, detail)
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// One failing validator in a stage report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub validator: String,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub detail: String,
}

/// Non-blocking annotation attached to post-hoc stages and recovery runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPayload {
    pub attempts: Vec<RecoveryOutcome>,
    pub rollback_recommendations: Vec<String>,
}

impl RecoveryPayload {
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty() && self.rollback_recommendations.is_empty()
    }
}

/// Report for one lifecycle invocation. Emitted once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub id: Uuid,
    pub stage: HookStage,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub state: StageState,
    /// Overall gate answer given to the invoking tool.
    pub success: bool,
    pub results: BTreeMap<String, ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_report: Option<Vec<FailureEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryPayload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bypasses: Vec<BypassRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StageReport {
    /// Names of validators whose result did not let the stage pass.
    pub fn failed_validators(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| !r.status.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Exit code for the hook entry point.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Render the human-readable report printed on stderr.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let verdict = match self.state {
            StageState::Passed => "passed",
            StageState::Waived => "passed (bypassed)",
            StageState::Skipped => "skipped",
            StageState::Failed if self.success => "completed with issues",
            StageState::Failed | StageState::Running => "FAILED",
        };
        out.push_str(&format!(
            "hookgate {}: {} in {}ms\n",
            self.stage, verdict, self.duration_ms
        ));
        for (name, result) in &self.results {
            let marker = match result.status {
                ValidationStatus::Passed => "ok",
                ValidationStatus::Skipped => "skip",
                ValidationStatus::Waived => "waived",
                ValidationStatus::Warning => "warn",
                ValidationStatus::Failed => "FAIL",
            };
            let cached = if result.cached { " (cached)" } else { "" };
            out.push_str(&format!("  [{marker}] {name}{cached}: {}\n", result.detail));
            for note in &result.notes {
                out.push_str(&format!("         note: {note}\n"));
            }
        }
        for warning in &self.warnings {
            out.push_str(&format!("  warning: {warning}\n"));
        }
        if let Some(failures) = &self.failure_report {
            out.push_str("\nFailures:\n");
            for f in failures {
                out.push_str(&format!(
                    "  - {} ({:?}, {:?}): {}\n",
                    f.validator, f.category, f.severity, f.detail
                ));
            }
        }
        if let Some(remediation) = &self.remediation {
            out.push_str("\nHow to fix:\n");
            out.push_str(remediation);
            if !remediation.ends_with('\n') {
                out.push('\n');
            }
        }
        if let Some(recovery) = &self.recovery {
            for rec in &recovery.rollback_recommendations {
                out.push_str(&format!("  recommendation: {rec}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses() {
        assert!(ValidationStatus::Passed.is_success());
        assert!(ValidationStatus::Skipped.is_success());
        assert!(ValidationStatus::Waived.is_success());
        assert!(!ValidationStatus::Failed.is_success());
        assert!(!ValidationStatus::Warning.is_success());
    }

    #[test]
    fn test_validation_result_serde_omits_empty_fields() {
        let json = serde_json::to_value(ValidationResult::skipped("no staged files")).unwrap();
        assert_eq!(json["status"], "skipped");
        assert!(json.get("remediation").is_none());
        assert!(json.get("notes").is_none());
    }
}
