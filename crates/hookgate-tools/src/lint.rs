//! Linter over the staged files.

use async_trait::async_trait;
use hookgate_core::{RemoteCi, StageContext, ValidationResult, Validator};

use crate::parse::LintSummary;
use crate::runner::{with_output_tail, ToolRunner};
use crate::tool::{ToolKind, ToolSpec};

pub const NAME: &str = "lint";

pub struct LintValidator;

/// Files the linter applies to, by extension.
pub fn lintable_files(files: &[String], extensions: &[String]) -> Vec<String> {
    if extensions.is_empty() {
        return files.to_vec();
    }
    files
        .iter()
        .filter(|f| {
            std::path::Path::new(f)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.trim_start_matches('.') == e))
        })
        .cloned()
        .collect()
}

#[async_trait]
impl Validator for LintValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn covered_by_remote_ci(&self, remote: &RemoteCi) -> bool {
        remote.lint
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let tools = &ctx.config.tools;
        if tools.lint.command.is_empty() {
            return Ok(ValidationResult::skipped("no lint command configured"));
        }
        let files = lintable_files(ctx.relevant_files(), &tools.lint_extensions);
        if files.is_empty() {
            return Ok(ValidationResult::skipped("no lintable files staged"));
        }

        let mut spec = ToolSpec::from_config(ToolKind::Lint, tools);
        if tools.lint.append_files {
            spec = spec.with_args(files.iter().cloned());
        }
        let output = ToolRunner::run(&spec, &ctx.repo_root).await?;
        if output.timed_out {
            return Ok(ValidationResult::failed(output.stderr.clone()));
        }

        let summary = LintSummary::parse(&output.combined());
        if output.passed() {
            let detail = match summary.warnings {
                0 => format!("lint clean ({} files)", files.len()),
                n => format!("lint clean ({} files, {n} warnings)", files.len()),
            };
            return Ok(ValidationResult::passed(detail));
        }

        let detail = if summary.errors > 0 {
            let fixable = match summary.fixable {
                0 => String::new(),
                n => format!(" ({n} fixable)"),
            };
            format!(
                "lint failed: {} errors, {} warnings{fixable}",
                summary.errors, summary.warnings
            )
        } else {
            format!("lint failed (exit code {})", output.exit_code)
        };
        Ok(with_output_tail(
            ValidationResult::failed(detail).with_remediation(
                "Run the formatter, fix the remaining lint findings and re-stage",
            ),
            &output,
        ))
    }
}
