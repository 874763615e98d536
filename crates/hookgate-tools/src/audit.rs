//! Dependency vulnerability scan, gated on the configured audit level.

use async_trait::async_trait;
use hookgate_core::{RemoteCi, StageContext, ValidationResult, Validator};

use crate::parse::AuditSummary;
use crate::runner::{with_output_tail, ToolRunner};
use crate::tool::{ToolKind, ToolSpec};

pub const NAME: &str = "security-audit";

pub struct AuditValidator;

#[async_trait]
impl Validator for AuditValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn covered_by_remote_ci(&self, remote: &RemoteCi) -> bool {
        remote.security
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        if ctx.config.tools.audit.command.is_empty() {
            return Ok(ValidationResult::skipped("no audit command configured"));
        }
        let level = ctx.config.audit_level;
        let spec = ToolSpec::from_config(ToolKind::Audit, &ctx.config.tools);
        let output = ToolRunner::run(&spec, &ctx.repo_root).await?;
        if output.timed_out {
            return Ok(ValidationResult::failed(output.stderr.clone()));
        }

        let summary = AuditSummary::parse(&output.combined());
        let blocking = summary.at_or_above(level);
        let below = summary.total() - blocking;

        let result = if blocking > 0 {
            with_output_tail(
                ValidationResult::failed(format!(
                    "security audit found {blocking} vulnerabilities at or above {level:?}"
                ))
                .with_remediation("Upgrade or replace the affected dependencies"),
                &output,
            )
        } else if summary.total() == 0 && !output.passed() {
            with_output_tail(
                ValidationResult::failed(format!(
                    "security audit failed (exit code {})",
                    output.exit_code
                )),
                &output,
            )
        } else {
            ValidationResult::passed(format!("no vulnerabilities at or above {level:?}"))
        };

        Ok(if below > 0 {
            result.with_note(format!("{below} lower-severity advisories ignored"))
        } else {
            result
        })
    }
}
