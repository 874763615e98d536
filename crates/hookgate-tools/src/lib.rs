//! hookgate tools - external tool execution for the hook gate
//!
//! Provides:
//! - Tool specs resolved from the `tools` configuration block
//! - An async subprocess runner with a hard timeout
//! - Parsers for lint, test, coverage, audit and build output
//! - Tool-backed validators (lint, test, build, security-audit)
//! - The formatter-backed fixer used by lint recovery
//! - The per-stage validator plan

pub mod audit;
pub mod build;
pub mod fixer;
pub mod lint;
pub mod parse;
pub mod plan;
pub mod runner;
pub mod testing;
pub mod tool;

pub use audit::AuditValidator;
pub use build::BuildValidator;
pub use fixer::ToolFixer;
pub use lint::LintValidator;
pub use parse::{AuditSummary, BuildSummary, LintSummary, TestSummary};
pub use plan::stage_validators;
pub use runner::{ToolOutput, ToolRunner, TIMEOUT_EXIT_CODE};
pub use testing::{TestScope, TestValidator};
pub use tool::{ToolKind, ToolSpec};
