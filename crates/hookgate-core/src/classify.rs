//! Failure classification.
//!
//! Maps a raw failure (message, exit code, originating validator) plus the
//! lifecycle stage to an [`ErrorClassification`]. Classification is a pure
//! first-match-wins walk over an ordered rule table split into three
//! severity tiers; unmatched failures fall back to a stage default.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::stage::HookStage;

/// Known failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TestFailure,
    BuildFailure,
    SecurityVulnerability,
    InvalidMessageFormat,
    SyntaxError,
    LintError,
    ToolTimeout,
    ContextStale,
    PerformanceBudget,
    DeprecatedOption,
    CoverageBelowThreshold,
    WorkflowInconsistency,
    NotificationFailure,
    DocumentationFailure,
    MetricsFailure,
    CacheFailure,
    Unknown,
}

impl ErrorCategory {
    /// Whether the recovery engine has a strategy for this category.
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            ErrorCategory::LintError
                | ErrorCategory::ContextStale
                | ErrorCategory::PerformanceBudget
                | ErrorCategory::CoverageBelowThreshold
                | ErrorCategory::WorkflowInconsistency
                | ErrorCategory::CacheFailure
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        write!(f, "{s}")
    }
}

/// How strongly a failure affects the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    NonBlocking,
    Warning,
    Blocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingType {
    Hard,
    Soft,
    None,
}

impl From<Severity> for BlockingType {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Blocking => BlockingType::Hard,
            Severity::Warning => BlockingType::Soft,
            Severity::NonBlocking => BlockingType::None,
        }
    }
}

/// Classification of one failure. Recomputed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub blocking_type: BlockingType,
    pub recoverable: bool,
    pub bypassable: bool,
}

/// Raw failure as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignal {
    pub message: String,
    pub exit_code: Option<i32>,
    /// Validator that produced the failure, if any.
    pub source: Option<String>,
}

impl FailureSignal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            source: None,
        }
    }

    pub fn from_validator(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
            source: Some(source.into()),
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

struct Rule {
    pattern: Regex,
    category: ErrorCategory,
    severity: Severity,
}

const RULE_SOURCE: &[(&str, ErrorCategory, Severity)] = &[
    // blocking
    (r"timed out|\btimeout\b", ErrorCategory::ToolTimeout, Severity::Blocking),
    (
        r"tests? (failed|failing)|failing tests?|\b\d+ failed\b|assertion (failed|error)|test suite failed",
        ErrorCategory::TestFailure,
        Severity::Blocking,
    ),
    (
        r"build (failed|error)|compil(e|ation) (failed|error)|could not compile|linker error",
        ErrorCategory::BuildFailure,
        Severity::Blocking,
    ),
    (
        r"vulnerabilit(y|ies)|security (audit|issue|advisory)|\bcve-\d{4}-\d+",
        ErrorCategory::SecurityVulnerability,
        Severity::Blocking,
    ),
    (
        r"invalid (commit )?message|message format|does not match (the )?(required|expected) format",
        ErrorCategory::InvalidMessageFormat,
        Severity::Blocking,
    ),
    (
        r"syntax ?error|unexpected token|parse error",
        ErrorCategory::SyntaxError,
        Severity::Blocking,
    ),
    (
        r"lint(ing)? (error|failed|issues?)|\b\d+ problems?\b|formatting (check )?failed|unfixable",
        ErrorCategory::LintError,
        Severity::Blocking,
    ),
    // warning
    (
        r"context (document )?(not updated|is stale|stale|missing|out of date)|current work (document )?(not updated|missing)",
        ErrorCategory::ContextStale,
        Severity::Warning,
    ),
    (
        r"exceeded (its )?(time )?budget|performance budget|took too long",
        ErrorCategory::PerformanceBudget,
        Severity::Warning,
    ),
    (r"deprecat", ErrorCategory::DeprecatedOption, Severity::Warning),
    (
        r"coverage\b.*\bbelow|below\b.*\bcoverage|coverage threshold",
        ErrorCategory::CoverageBelowThreshold,
        Severity::Warning,
    ),
    (
        r"persona|step (regress|out of order)|workflow (inconsisten|out of sync)",
        ErrorCategory::WorkflowInconsistency,
        Severity::Warning,
    ),
    // non-blocking
    (r"notif(y|ication)", ErrorCategory::NotificationFailure, Severity::NonBlocking),
    (
        r"documentation|docs? (generation|build) failed",
        ErrorCategory::DocumentationFailure,
        Severity::NonBlocking,
    ),
    (r"\bmetrics?\b", ErrorCategory::MetricsFailure, Severity::NonBlocking),
    (r"\bcache\b", ErrorCategory::CacheFailure, Severity::NonBlocking),
];

/// Validator name → category, consulted only when no message rule matched.
const SOURCE_FALLBACK: &[(&str, ErrorCategory, Severity)] = &[
    ("lint", ErrorCategory::LintError, Severity::Blocking),
    ("test", ErrorCategory::TestFailure, Severity::Blocking),
    ("build", ErrorCategory::BuildFailure, Severity::Blocking),
    ("security-audit", ErrorCategory::SecurityVulnerability, Severity::Blocking),
    ("message-format", ErrorCategory::InvalidMessageFormat, Severity::Blocking),
    ("context-freshness", ErrorCategory::ContextStale, Severity::Warning),
    ("workflow-sync", ErrorCategory::WorkflowInconsistency, Severity::Warning),
];

/// Validators guarding hard-safety concerns, with the only categories a
/// message rule may refine their failures into. Any other match (a timeout, a
/// stray keyword in compiler output) keeps the validator's own category.
const HARD_SAFETY_SOURCES: &[(&str, &[ErrorCategory])] = &[
    (
        "test",
        &[ErrorCategory::TestFailure, ErrorCategory::CoverageBelowThreshold],
    ),
    ("build", &[ErrorCategory::BuildFailure]),
    ("security-audit", &[ErrorCategory::SecurityVulnerability]),
];

fn source_fallback(source: &str) -> Option<(ErrorCategory, Severity)> {
    SOURCE_FALLBACK
        .iter()
        .find(|(name, _, _)| *name == source)
        .map(|(_, category, severity)| (*category, *severity))
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        RULE_SOURCE
            .iter()
            .filter_map(|(pattern, category, severity)| {
                match Regex::new(&format!("(?i){pattern}")) {
                    Ok(pattern) => Some(Rule {
                        pattern,
                        category: *category,
                        severity: *severity,
                    }),
                    Err(e) => {
                        tracing::error!(%pattern, error = %e, "invalid classification pattern");
                        None
                    }
                }
            })
            .collect()
    })
}

/// Stateless failure classifier.
#[derive(Debug, Clone, Copy)]
pub struct ErrorClassifier {
    strict: bool,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ErrorClassifier {
    /// `strict` makes security vulnerabilities non-bypassable.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// Classify a failure in the context of `stage`.
    pub fn classify(&self, signal: &FailureSignal, stage: HookStage) -> ErrorClassification {
        let matched = rules()
            .iter()
            .find(|rule| rule.pattern.is_match(&signal.message))
            .map(|rule| (rule.category, rule.severity))
            .or_else(|| source_fallback(signal.source.as_deref()?))
            .or_else(|| match signal.exit_code {
                Some(124) => Some((ErrorCategory::ToolTimeout, Severity::Blocking)),
                _ => None,
            });

        let hard_safety = signal.source.as_deref().and_then(|source| {
            HARD_SAFETY_SOURCES
                .iter()
                .find(|(name, _)| *name == source)
                .map(|(_, allowed)| (source, *allowed))
        });
        let matched = match (matched, hard_safety) {
            (Some((category, _)), Some((source, allowed))) if !allowed.contains(&category) => {
                source_fallback(source)
            }
            (matched, _) => matched,
        };

        match matched {
            Some((category, severity)) => self.build(category, severity),
            None => self.stage_default(stage),
        }
    }

    /// Convenience wrapper for a bare message.
    pub fn classify_message(&self, message: &str, stage: HookStage) -> ErrorClassification {
        self.classify(&FailureSignal::new(message), stage)
    }

    fn stage_default(&self, stage: HookStage) -> ErrorClassification {
        let severity = if stage.blocking() {
            Severity::Blocking
        } else {
            Severity::NonBlocking
        };
        self.build(ErrorCategory::Unknown, severity)
    }

    fn build(&self, category: ErrorCategory, severity: Severity) -> ErrorClassification {
        ErrorClassification {
            category,
            severity,
            blocking_type: severity.into(),
            recoverable: category.recoverable(),
            bypassable: self.bypassable(category, severity),
        }
    }

    fn bypassable(&self, category: ErrorCategory, severity: Severity) -> bool {
        if severity == Severity::NonBlocking {
            return false;
        }
        match category {
            ErrorCategory::TestFailure | ErrorCategory::BuildFailure => false,
            ErrorCategory::SecurityVulnerability => !self.strict,
            _ => true,
        }
    }
}
