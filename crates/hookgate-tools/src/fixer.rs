//! Formatter-backed [`Fixer`] used by lint recovery.

use std::path::Path;

use async_trait::async_trait;
use hookgate_core::{Fixer, ToolCommands};

use crate::lint::lintable_files;
use crate::runner::ToolRunner;
use crate::tool::{ToolKind, ToolSpec};

pub struct ToolFixer {
    tools: ToolCommands,
}

impl ToolFixer {
    pub fn new(tools: ToolCommands) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Fixer for ToolFixer {
    async fn fix(&self, repo_root: &Path, files: &[String]) -> anyhow::Result<String> {
        if self.tools.format.command.is_empty() {
            anyhow::bail!("no format command configured");
        }
        let files = lintable_files(files, &self.tools.lint_extensions);
        let mut spec = ToolSpec::from_config(ToolKind::Format, &self.tools);
        if self.tools.format.append_files {
            if files.is_empty() {
                anyhow::bail!("no formattable files");
            }
            spec = spec.with_args(files.iter().cloned());
        }

        let output = ToolRunner::run(&spec, repo_root).await?;
        if !output.passed() {
            anyhow::bail!(
                "{} exited with {}: {}",
                spec.name,
                output.exit_code,
                output.tail(3)
            );
        }
        tracing::info!(files = files.len(), duration_ms = output.duration_ms, "formatter applied");
        Ok(if self.tools.format.append_files {
            format!("formatted {} files", files.len())
        } else {
            format!("ran {}", self.tools.format.command.join(" "))
        })
    }
}
