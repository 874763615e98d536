//! Subprocess execution with a hard timeout.

use crate::tool::ToolSpec;
use hookgate_core::ValidationResult;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Exit code reported when a tool is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Tool name.
    pub tool: String,

    /// Exit code (0 = success, 124 = timed out).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the tool was killed by the timeout.
    pub timed_out: bool,
}

impl ToolOutput {
    /// Whether this tool passed (exit code 0).
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// stdout and stderr, in that order.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Last non-empty lines of the output, for result details.
    pub fn tail(&self, lines: usize) -> String {
        let combined = self.combined();
        let kept: Vec<&str> = combined
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        kept[kept.len().saturating_sub(lines)..].join("\n")
    }
}

/// Lines of tool output kept on a failing result.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Attach the tail of `output` as a note so the failure is actionable.
pub(crate) fn with_output_tail(result: ValidationResult, output: &ToolOutput) -> ValidationResult {
    let tail = output.tail(OUTPUT_TAIL_LINES);
    if tail.is_empty() {
        return result;
    }
    result.with_note(format!("{} output:\n{tail}", output.tool))
}

/// Runs tool specs inside a working directory.
pub struct ToolRunner;

impl ToolRunner {
    /// Execute `spec` in `cwd`.
    ///
    /// A timeout kills the child and yields a `timed_out` output instead of an
    /// error; only a spawn failure (missing executable) is an `Err`.
    pub async fn run(spec: &ToolSpec, cwd: &Path) -> anyhow::Result<ToolOutput> {
        let start = Instant::now();

        if spec.command.is_empty() {
            anyhow::bail!("tool {} has empty command", spec.name);
        }

        let exe = &spec.command[0];
        let args = &spec.command[1..];

        let child = Command::new(exe)
            .args(args)
            .envs(&spec.env)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start {} ({exe}): {e}", spec.name))?;

        tracing::debug!(tool = %spec.name, command = ?spec.command, "tool started");

        let output = if spec.timeout_secs > 0 {
            match tokio::time::timeout(
                std::time::Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(output) => output?,
                Err(_) => {
                    tracing::warn!(tool = %spec.name, timeout_secs = spec.timeout_secs, "tool timed out");
                    return Ok(ToolOutput {
                        tool: spec.name.clone(),
                        exit_code: TIMEOUT_EXIT_CODE,
                        stdout: String::new(),
                        stderr: format!(
                            "{} timed out after {} seconds",
                            spec.name, spec.timeout_secs
                        ),
                        duration_ms: start.elapsed().as_millis() as u64,
                        timed_out: true,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(ToolOutput {
            tool: spec.name.clone(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            timed_out: false,
        })
    }
}
