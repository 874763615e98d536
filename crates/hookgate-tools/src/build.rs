//! Build validator.

use async_trait::async_trait;
use hookgate_core::{RemoteCi, StageContext, ValidationResult, Validator};

use crate::parse::BuildSummary;
use crate::runner::{with_output_tail, ToolRunner};
use crate::tool::{ToolKind, ToolSpec};

pub const NAME: &str = "build";

pub struct BuildValidator;

#[async_trait]
impl Validator for BuildValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn covered_by_remote_ci(&self, remote: &RemoteCi) -> bool {
        remote.build
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        if ctx.config.tools.build.command.is_empty() {
            return Ok(ValidationResult::skipped("no build command configured"));
        }
        let spec = ToolSpec::from_config(ToolKind::Build, &ctx.config.tools);
        let output = ToolRunner::run(&spec, &ctx.repo_root).await?;
        if output.timed_out {
            return Ok(ValidationResult::failed(output.stderr.clone()));
        }
        if output.passed() {
            return Ok(ValidationResult::passed(format!(
                "build succeeded in {}ms",
                output.duration_ms
            )));
        }

        let summary = BuildSummary::parse(&output.combined());
        let detail = match summary.first_error {
            Some(first) => format!("build failed ({} errors): {first}", summary.errors),
            None => format!("build failed (exit code {})", output.exit_code),
        };
        Ok(with_output_tail(
            ValidationResult::failed(detail).with_remediation("Fix the compilation errors before pushing"),
            &output,
        ))
    }
}
