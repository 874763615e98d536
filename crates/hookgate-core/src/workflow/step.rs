//! `PREFIX-NUMBER` step identifiers.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Largest step number accepted.
pub const MAX_STEP: u32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId {
    pub prefix: String,
    pub number: u32,
}

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_]*)-(\d+)$").expect("static regex"))
}

impl FromStr for StepId {
    type Err = GateError;

    /// Parses and range-checks; the number must lie in `1..=9999`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_matches(|c| c == '[' || c == ']');
        let caps = step_pattern()
            .captures(trimmed)
            .ok_or_else(|| GateError::InvalidStep(format!("{s:?} is not PREFIX-NUMBER")))?;
        let number: u64 = caps[2]
            .parse()
            .map_err(|_| GateError::InvalidStep(format!("{s:?} has an unreadable number")))?;
        if number == 0 || number > u64::from(MAX_STEP) {
            return Err(GateError::InvalidStep(format!(
                "{s:?} is outside 1..={MAX_STEP}"
            )));
        }
        Ok(StepId {
            prefix: caps[1].to_ascii_uppercase(),
            number: number as u32,
        })
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:03}", self.prefix, self.number)
    }
}

/// Whether `step_id` is a well-formed, in-range successor candidate.
///
/// `history` is the text of prior work entries; a number lower than one
/// already recorded is not a rejection here (see [`step_regression`]).
pub fn validate_step_progression(history: &str, step_id: &str) -> bool {
    match step_id.parse::<StepId>() {
        Ok(step) => {
            if let Some(note) = step_regression(history, &step) {
                tracing::debug!(%note, "step regression noted");
            }
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "step identifier rejected");
            false
        }
    }
}

/// Note when `step` goes backwards relative to the highest same-prefix step
/// found in `history`.
pub fn step_regression(history: &str, step: &StepId) -> Option<String> {
    let pattern = Regex::new(&format!(r"(?i)\b{}-(\d+)\b", regex::escape(&step.prefix))).ok()?;
    let highest = pattern
        .captures_iter(history)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|n| *n >= 1 && *n <= MAX_STEP)
        .max()?;
    (step.number < highest).then(|| {
        format!(
            "step {step} is behind {}-{highest:03} already recorded in history",
            step.prefix
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds() {
        assert!(!validate_step_progression("", "STEP-0"));
        assert!(!validate_step_progression("", "STEP-000"));
        assert!(validate_step_progression("", "STEP-1"));
        assert!(validate_step_progression("", "STEP-001"));
        assert!(validate_step_progression("", "STEP-9999"));
        assert!(!validate_step_progression("", "STEP-10000"));
        assert!(!validate_step_progression("", "STEP-99999999999999999999"));
    }

    #[test]
    fn test_malformed_identifiers() {
        for bad in ["", "STEP", "STEP-", "-12", "STEP-1a", "12-STEP", "STEP 1"] {
            assert!(!validate_step_progression("", bad), "{bad}");
        }
    }

    #[test]
    fn test_display_pads_number() {
        let step: StepId = "story-7".parse().unwrap();
        assert_eq!(step.to_string(), "STORY-007");
    }

    #[test]
    fn test_regression_is_noted_not_rejected() {
        let history = "- 2026-01-01T00:00:00Z | DEVELOPER | STEP-012 | implementation";
        let step: StepId = "STEP-004".parse().unwrap();
        assert!(step_regression(history, &step).is_some());
        assert!(validate_step_progression(history, "STEP-004"));

        let forward: StepId = "STEP-013".parse().unwrap();
        assert!(step_regression(history, &forward).is_none());
    }
}
