//! Test runner validator, fast (pre-commit) or full (pre-push).

use async_trait::async_trait;
use hookgate_core::{PerfFlags, RemoteCi, StageContext, ValidationResult, Validator};

use crate::parse::TestSummary;
use crate::runner::{with_output_tail, ToolRunner};
use crate::tool::{ToolKind, ToolSpec};

pub const NAME: &str = "test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestScope {
    Fast,
    Full,
}

impl TestScope {
    fn kind(self) -> ToolKind {
        match self {
            TestScope::Fast => ToolKind::TestFast,
            TestScope::Full => ToolKind::TestFull,
        }
    }
}

pub struct TestValidator {
    scope: TestScope,
}

impl TestValidator {
    pub fn new(scope: TestScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> TestScope {
        self.scope
    }
}

#[async_trait]
impl Validator for TestValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn covered_by_remote_ci(&self, remote: &RemoteCi) -> bool {
        remote.test
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let kind = self.scope.kind();
        let command = kind.command(&ctx.config.tools);
        if command.command.is_empty() {
            return Ok(ValidationResult::skipped(format!(
                "no {} command configured",
                kind.name()
            )));
        }

        let flags = PerfFlags::load(&ctx.state_dir());
        let mut spec = ToolSpec::from_config(kind, &ctx.config.tools);
        let mut notes = Vec::new();
        if flags.bail_on_first_failure && !command.bail_args.is_empty() {
            spec = spec.with_args(command.bail_args.iter().cloned());
            notes.push("bail-on-first-failure enabled".to_string());
        }
        if flags.changed_files_only && command.append_files {
            let files = ctx.relevant_files();
            if files.is_empty() {
                return Ok(ValidationResult::skipped("no changed files to test"));
            }
            spec = spec.with_args(files.iter().cloned());
            notes.push(format!("limited to {} changed files", files.len()));
        }

        let output = ToolRunner::run(&spec, &ctx.repo_root).await?;
        if output.timed_out {
            return Ok(ValidationResult::failed(output.stderr.clone()));
        }
        let summary = TestSummary::parse(&output.combined());

        let mut result = if !output.passed() {
            let detail = if summary.failed > 0 {
                format!(
                    "tests failed: {} failed, {} passed",
                    summary.failed, summary.passed
                )
            } else {
                format!("test suite failed (exit code {})", output.exit_code)
            };
            with_output_tail(
                ValidationResult::failed(detail)
                    .with_remediation("Fix the failing tests before committing"),
                &output,
            )
        } else {
            match (ctx.config.coverage_threshold, summary.coverage) {
                (Some(threshold), Some(actual)) if actual < threshold => {
                    ValidationResult::failed(format!(
                        "coverage {actual:.1}% is below threshold {threshold:.1}%"
                    ))
                    .with_remediation("Add tests for the uncovered code paths")
                }
                (Some(_), None) => ValidationResult::passed(format!(
                    "{} tests passed",
                    summary.passed
                ))
                .with_note("coverage threshold set but the test output reports no coverage"),
                _ => ValidationResult::passed(format!("{} tests passed", summary.passed)),
            }
        };
        for note in notes {
            result = result.with_note(note);
        }
        Ok(result)
    }
}
