//! External tool definitions.

use std::collections::BTreeMap;

use hookgate_core::config::{ToolCommand, ToolCommands};
use serde::{Deserialize, Serialize};

/// Tools hookgate knows how to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Linter over staged files.
    Lint,
    /// Formatter, used by lint recovery.
    Format,
    /// Quick unit tests for pre-commit.
    TestFast,
    /// Full suite for pre-push.
    TestFull,
    /// Dependency vulnerability scan.
    Audit,
    Build,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Lint => "lint",
            ToolKind::Format => "format",
            ToolKind::TestFast => "test-fast",
            ToolKind::TestFull => "test-full",
            ToolKind::Audit => "audit",
            ToolKind::Build => "build",
        }
    }

    /// The configured command for this tool.
    pub fn command<'a>(&self, tools: &'a ToolCommands) -> &'a ToolCommand {
        match self {
            ToolKind::Lint => &tools.lint,
            ToolKind::Format => &tools.format,
            ToolKind::TestFast => &tools.test_fast,
            ToolKind::TestFull => &tools.test_full,
            ToolKind::Audit => &tools.audit,
            ToolKind::Build => &tools.build,
        }
    }
}

/// A fully resolved invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    /// Human-readable tool name.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds; zero waits forever.
    pub timeout_secs: u64,

    pub env: BTreeMap<String, String>,
}

impl ToolSpec {
    /// Resolve a configured tool.
    pub fn from_config(kind: ToolKind, tools: &ToolCommands) -> Self {
        let cmd = kind.command(tools);
        Self {
            name: kind.name().to_string(),
            command: cmd.command.clone(),
            timeout_secs: cmd.timeout_secs,
            env: cmd.env.clone(),
        }
    }

    /// Create a custom tool invocation.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
            env: BTreeMap::new(),
        }
    }

    /// Append arguments (files, bail flags).
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }
}
