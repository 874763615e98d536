//! Lifecycle stages and the per-stage gate state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// A version-control lifecycle event that hookgate intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookStage {
    PreCommit,
    CommitMsg,
    PrePush,
    PostCommit,
    PostMerge,
    PreRebase,
    PostCheckout,
    PreReceive,
}

impl HookStage {
    pub const ALL: [HookStage; 8] = [
        HookStage::PreCommit,
        HookStage::CommitMsg,
        HookStage::PrePush,
        HookStage::PostCommit,
        HookStage::PostMerge,
        HookStage::PreRebase,
        HookStage::PostCheckout,
        HookStage::PreReceive,
    ];

    /// The git hook name for this stage.
    pub fn name(&self) -> &'static str {
        match self {
            HookStage::PreCommit => "pre-commit",
            HookStage::CommitMsg => "commit-msg",
            HookStage::PrePush => "pre-push",
            HookStage::PostCommit => "post-commit",
            HookStage::PostMerge => "post-merge",
            HookStage::PreRebase => "pre-rebase",
            HookStage::PostCheckout => "post-checkout",
            HookStage::PreReceive => "pre-receive",
        }
    }

    /// Whether a failure in this stage propagates to the invoking tool.
    ///
    /// Post-hoc stages annotate an operation that already happened; they
    /// always report success and route failures into a recovery payload.
    pub fn blocking(&self) -> bool {
        !matches!(
            self,
            HookStage::PostCommit | HookStage::PostMerge | HookStage::PostCheckout
        )
    }

    /// Default wall-clock budget for the whole stage, in milliseconds.
    pub fn default_budget_ms(&self) -> u64 {
        match self {
            HookStage::PreCommit => 30_000,
            HookStage::CommitMsg => 5_000,
            HookStage::PrePush => 300_000,
            HookStage::PostCommit | HookStage::PostMerge | HookStage::PostCheckout => 10_000,
            HookStage::PreRebase => 30_000,
            HookStage::PreReceive => 60_000,
        }
    }
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HookStage {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        HookStage::ALL
            .into_iter()
            .find(|stage| {
                stage.name() == normalized || stage_alias(*stage) == Some(normalized.as_str())
            })
            .ok_or_else(|| GateError::UnknownStage(s.to_string()))
    }
}

fn stage_alias(stage: HookStage) -> Option<&'static str> {
    match stage {
        HookStage::CommitMsg => Some("commit-message"),
        _ => None,
    }
}

/// Gate state of one stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Skipped,
    Running,
    Passed,
    Failed,
    Waived,
}

impl StageState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `Skipped` is the initial state; `Passed`, `Failed` and `Waived` are
    /// terminal. A failed stage may still be waived by an approved bypass.
    pub fn can_transition_to(self, next: StageState) -> bool {
        matches!(
            (self, next),
            (StageState::Skipped, StageState::Running)
                | (StageState::Running, StageState::Passed)
                | (StageState::Running, StageState::Failed)
                | (StageState::Running, StageState::Waived)
                | (StageState::Failed, StageState::Waived)
        )
    }

    /// Move to `next`, or stay put if the transition is illegal.
    pub fn advance(&mut self, next: StageState) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            tracing::warn!(from = ?self, to = ?next, "illegal stage state transition ignored");
            false
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageState::Passed | StageState::Failed | StageState::Waived
        )
    }
}
