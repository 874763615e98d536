//! Best-effort summaries of common tool output formats.
//!
//! Parsers never fail: unrecognised output yields zeroed summaries and the
//! validators fall back to the exit code.

use std::sync::OnceLock;

use hookgate_core::AuditLevel;
use regex::Regex;

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn sum_captures(regex: &Regex, text: &str) -> u32 {
    regex
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .sum()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintSummary {
    pub errors: u32,
    pub warnings: u32,
    /// Findings the linter says its fix mode can repair.
    pub fixable: u32,
}

impl LintSummary {
    pub fn parse(output: &str) -> Self {
        static ERRORS: OnceLock<Regex> = OnceLock::new();
        static WARNINGS: OnceLock<Regex> = OnceLock::new();
        static PROBLEMS: OnceLock<Regex> = OnceLock::new();
        static PREVIOUS: OnceLock<Regex> = OnceLock::new();
        static FIXABLE: OnceLock<Regex> = OnceLock::new();
        static SUGGESTIONS: OnceLock<Regex> = OnceLock::new();

        // eslint style: "✖ 3 problems (2 errors, 1 warning)"
        let counted: String = output
            .lines()
            .filter(|l| !l.contains("fixable"))
            .collect::<Vec<_>>()
            .join("\n");
        let errors = sum_captures(re(&ERRORS, r"\b(\d+) errors?\b"), &counted);
        let warnings = sum_captures(re(&WARNINGS, r"\b(\d+) warnings?\b"), &counted);
        // eslint: "2 errors and 0 warnings potentially fixable with the `--fix` option."
        let fixable = re(&FIXABLE, r"(\d+) errors? and (\d+) warnings? potentially fixable")
            .captures_iter(output)
            .map(|c| {
                c.iter()
                    .skip(1)
                    .flatten()
                    .filter_map(|m| m.as_str().parse::<u32>().ok())
                    .sum::<u32>()
            })
            .sum::<u32>()
            // clippy: "run `cargo clippy --fix ...` to apply 3 suggestions"
            + sum_captures(re(&SUGGESTIONS, r"to apply (\d+) suggestions?"), output);
        let mut summary = Self {
            errors,
            warnings,
            fixable,
        };

        if summary.errors == 0 {
            // clippy: "error: could not compile `x` due to 4 previous errors"
            summary.errors = sum_captures(re(&PREVIOUS, r"due to (\d+) previous errors?"), output);
        }
        if summary.errors == 0 && summary.warnings == 0 {
            summary.errors = sum_captures(re(&PROBLEMS, r"\b(\d+) problems?\b"), output);
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
    pub ignored: u32,
    /// Line coverage percentage, when the runner reports one.
    pub coverage: Option<f64>,
}

impl TestSummary {
    pub fn parse(output: &str) -> Self {
        static PASSED: OnceLock<Regex> = OnceLock::new();
        static FAILED: OnceLock<Regex> = OnceLock::new();
        static IGNORED: OnceLock<Regex> = OnceLock::new();
        static COVERAGE: OnceLock<Regex> = OnceLock::new();

        let coverage = re(
            &COVERAGE,
            r"(?i)(?:coverage|all files\s*\|)[^0-9\n]*?(\d+(?:\.\d+)?)\s*%",
        )
        .captures_iter(output)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .last();

        Self {
            passed: sum_captures(re(&PASSED, r"\b(\d+) passed\b"), output),
            failed: sum_captures(re(&FAILED, r"\b(\d+) failed\b"), output),
            ignored: sum_captures(re(&IGNORED, r"\b(\d+) (?:ignored|skipped)\b"), output),
            coverage,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.ignored
    }
}

/// Vulnerability counts by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub critical: u32,
    pub high: u32,
    pub moderate: u32,
    pub low: u32,
}

impl AuditSummary {
    pub fn parse(output: &str) -> Self {
        static CRITICAL: OnceLock<Regex> = OnceLock::new();
        static HIGH: OnceLock<Regex> = OnceLock::new();
        static MODERATE: OnceLock<Regex> = OnceLock::new();
        static LOW: OnceLock<Regex> = OnceLock::new();

        Self {
            critical: sum_captures(re(&CRITICAL, r"(?i)\b(\d+) critical\b"), output),
            high: sum_captures(re(&HIGH, r"(?i)\b(\d+) high\b"), output),
            moderate: sum_captures(re(&MODERATE, r"(?i)\b(\d+) (?:moderate|medium)\b"), output),
            low: sum_captures(re(&LOW, r"(?i)\b(\d+) low\b"), output),
        }
    }

    /// Findings at `level` or more severe.
    pub fn at_or_above(&self, level: AuditLevel) -> u32 {
        match level {
            AuditLevel::Critical => self.critical,
            AuditLevel::High => self.critical + self.high,
            AuditLevel::Moderate => self.critical + self.high + self.moderate,
            AuditLevel::Low => self.critical + self.high + self.moderate + self.low,
        }
    }

    pub fn total(&self) -> u32 {
        self.at_or_above(AuditLevel::Low)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub errors: u32,
    pub first_error: Option<String>,
}

impl BuildSummary {
    pub fn parse(output: &str) -> Self {
        let mut errors = 0;
        let mut first_error = None;
        for line in output.lines() {
            let trimmed = line.trim_start();
            let is_error = (trimmed.starts_with("error")
                && !trimmed.starts_with("error: could not compile"))
                || trimmed.contains(": error");
            if is_error {
                errors += 1;
                if first_error.is_none() {
                    first_error = Some(trimmed.to_string());
                }
            }
        }
        Self { errors, first_error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lint_counts_eslint_and_clippy() {
        let eslint = "✖ 3 problems (2 errors, 1 warning)\n  1 error and 0 warnings potentially fixable";
        assert_eq!(
            LintSummary::parse(eslint),
            LintSummary {
                errors: 2,
                warnings: 1,
                fixable: 1
            }
        );

        let clippy = "warning: unused\nerror: could not compile `x` due to 4 previous errors\n\
                      run `cargo clippy --fix --lib -p x` to apply 2 suggestions";
        let s = LintSummary::parse(clippy);
        assert_eq!(s.errors, 4);
        assert_eq!(s.fixable, 2);
        assert!(!s.is_clean());

        assert_eq!(LintSummary::parse("5 problems").errors, 5);
        assert!(LintSummary::parse("all good").is_clean());
    }

    #[test]
    fn test_summary_sums_multiple_binaries() {
        let out = "test result: ok. 10 passed; 0 failed; 1 ignored\n\
                   test result: FAILED. 3 passed; 2 failed; 0 ignored\n";
        let s = TestSummary::parse(out);
        assert_eq!(s.passed, 13);
        assert_eq!(s.failed, 2);
        assert_eq!(s.ignored, 1);
        assert_eq!(s.total(), 16);
        assert_eq!(s.coverage, None);
    }

    #[test]
    fn test_summary_reads_coverage() {
        assert_eq!(
            TestSummary::parse("Coverage: 72.5% of lines").coverage,
            Some(72.5)
        );
        assert_eq!(
            TestSummary::parse("All files |   81.2 |  70 |").coverage,
            None
        );
        assert_eq!(
            TestSummary::parse("All files | 64.3 % |").coverage,
            Some(64.3)
        );
    }

    #[test]
    fn audit_levels_are_cumulative() {
        let s = AuditSummary::parse("found 1 critical, 2 high, 3 moderate and 4 low severity");
        assert_eq!(s.at_or_above(AuditLevel::Critical), 1);
        assert_eq!(s.at_or_above(AuditLevel::High), 3);
        assert_eq!(s.at_or_above(AuditLevel::Moderate), 6);
        assert_eq!(s.total(), 10);
        assert_eq!(AuditSummary::parse("0 vulnerabilities").total(), 0);
    }

    #[test]
    fn build_reports_first_error() {
        let out = "   Compiling x\nerror[E0308]: mismatched types\nerror: aborting\nerror: could not compile `x`";
        let s = BuildSummary::parse(out);
        assert_eq!(s.errors, 2);
        assert_eq!(s.first_error.as_deref(), Some("error[E0308]: mismatched types"));
    }
}
