//! Which validators run at each lifecycle stage.

use hookgate_core::validators::{
    ContextFreshnessValidator, MessageFormatValidator, WorkflowSyncValidator,
};
use hookgate_core::{GateConfig, HookStage, Validator};

use crate::audit::AuditValidator;
use crate::build::BuildValidator;
use crate::lint::LintValidator;
use crate::testing::{TestScope, TestValidator};

/// Ordered validators for `stage`, honoring the per-stage toggles.
///
/// A disabled stage yields an empty plan, which the orchestrator reports as
/// skipped.
pub fn stage_validators(stage: HookStage, config: &GateConfig) -> Vec<Box<dyn Validator>> {
    let hooks = &config.hooks;
    let mut plan: Vec<Box<dyn Validator>> = Vec::new();
    if !hooks.stage_enabled(stage) {
        return plan;
    }
    let freshness = || Box::new(ContextFreshnessValidator::new(config.context_max_age_hours));

    match stage {
        HookStage::PreCommit => {
            let t = &hooks.pre_commit;
            if t.linting {
                plan.push(Box::new(LintValidator));
            }
            if t.testing {
                plan.push(Box::new(TestValidator::new(TestScope::Fast)));
            }
            if t.context_validation {
                plan.push(freshness());
            }
        }
        HookStage::CommitMsg => {
            let t = &hooks.commit_msg;
            if t.gatekeeper {
                plan.push(Box::new(MessageFormatValidator::single(
                    t.conventional_fallback,
                )));
            }
        }
        HookStage::PrePush => {
            let t = &hooks.pre_push;
            if t.testing {
                let scope = if t.full_tests {
                    TestScope::Full
                } else {
                    TestScope::Fast
                };
                plan.push(Box::new(TestValidator::new(scope)));
            }
            if t.build {
                plan.push(Box::new(BuildValidator));
            }
            if t.security {
                plan.push(Box::new(AuditValidator));
            }
            if t.bmad_sync {
                plan.push(Box::new(WorkflowSyncValidator::check()));
            }
        }
        HookStage::PostCommit => {
            if hooks.post_commit.workflow {
                plan.push(Box::new(WorkflowSyncValidator::sync()));
            }
        }
        HookStage::PostMerge => {
            let t = &hooks.post_merge;
            if t.workflow {
                plan.push(Box::new(WorkflowSyncValidator::sync()));
            }
            if t.context_validation {
                plan.push(freshness());
            }
        }
        HookStage::PreRebase => {
            if hooks.pre_rebase.workflow {
                plan.push(Box::new(WorkflowSyncValidator::check()));
            }
        }
        HookStage::PostCheckout => {
            if hooks.post_checkout.context_validation {
                plan.push(freshness());
            }
        }
        HookStage::PreReceive => {
            let t = &hooks.pre_receive;
            if t.gatekeeper {
                plan.push(Box::new(MessageFormatValidator::range(
                    hooks.commit_msg.conventional_fallback,
                )));
            }
            if t.workflow {
                plan.push(Box::new(WorkflowSyncValidator::check()));
            }
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stage: HookStage, config: &GateConfig) -> Vec<String> {
        stage_validators(stage, config)
            .iter()
            .map(|v| v.name().to_string())
            .collect()
    }

    #[test]
    fn default_plans() {
        let config = GateConfig::default();
        assert_eq!(
            names(HookStage::PreCommit, &config),
            vec!["lint", "test", "context-freshness"]
        );
        assert_eq!(names(HookStage::CommitMsg, &config), vec!["message-format"]);
        assert_eq!(
            names(HookStage::PrePush, &config),
            vec!["test", "build", "security-audit", "workflow-sync"]
        );
        assert_eq!(names(HookStage::PostCommit, &config), vec!["workflow-sync"]);
        assert_eq!(
            names(HookStage::PostMerge, &config),
            vec!["workflow-sync", "context-freshness"]
        );
        assert_eq!(names(HookStage::PreRebase, &config), vec!["workflow-sync"]);
        assert_eq!(names(HookStage::PostCheckout, &config), vec!["context-freshness"]);
        assert_eq!(
            names(HookStage::PreReceive, &config),
            vec!["message-format", "workflow-sync"]
        );
    }

    #[test]
    fn toggles_remove_validators() {
        let mut config = GateConfig::default();
        config.hooks.pre_commit.linting = false;
        config.hooks.pre_push.build = false;
        config.hooks.pre_push.bmad_sync = false;
        assert_eq!(
            names(HookStage::PreCommit, &config),
            vec!["test", "context-freshness"]
        );
        assert_eq!(
            names(HookStage::PrePush, &config),
            vec!["test", "security-audit"]
        );
    }

    #[test]
    fn disabled_stage_has_empty_plan() {
        let mut config = GateConfig::default();
        config.hooks.commit_msg.enabled = false;
        assert!(stage_validators(HookStage::CommitMsg, &config).is_empty());
    }
}
