//! Commit message format gate.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::result::ValidationResult;
use crate::validator::{StageContext, Validator};
use crate::workflow::{
    check_transition, parse_message_tags, validate_step_progression, MessageTags, TransitionCheck,
};

pub const NAME: &str = "message-format";

const REQUIRED_FORMAT: &str = "[PERSONA] [STEP-NNN] summary";

fn conventional_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(\([^)]+\))?!?:?\s+\S",
        )
        .expect("static regex")
    })
}

/// How a single message was judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCheck {
    Tagged(MessageTags),
    Conventional,
    /// Merge and revert commits written by git itself.
    Generated,
    Invalid(String),
}

impl MessageCheck {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, MessageCheck::Invalid(_))
    }
}

/// Judge the first line of `message`.
pub fn check_message(message: &str, conventional_fallback: bool) -> MessageCheck {
    let first = message.lines().next().unwrap_or("").trim();
    if first.is_empty() {
        return MessageCheck::Invalid("invalid commit message: empty subject line".to_string());
    }
    if first.starts_with("Merge ") || first.starts_with("Revert \"") {
        return MessageCheck::Generated;
    }
    if let Some(tags) = parse_message_tags(first) {
        if !validate_step_progression("", &tags.step) {
            return MessageCheck::Invalid(format!(
                "invalid commit message: step {} is outside 1..=9999",
                tags.step
            ));
        }
        if tags.summary.is_empty() {
            return MessageCheck::Invalid("invalid commit message: summary is empty".to_string());
        }
        return MessageCheck::Tagged(tags);
    }
    if conventional_fallback && conventional_pattern().is_match(first) {
        return MessageCheck::Conventional;
    }
    MessageCheck::Invalid(format!(
        "invalid commit message: {first:?} does not match the required format {REQUIRED_FORMAT}"
    ))
}

/// Checks the message being committed, or every message in a pushed range.
pub struct MessageFormatValidator {
    conventional_fallback: bool,
    range: bool,
}

impl MessageFormatValidator {
    /// Validate `StageContext::commit_message` (commit-msg).
    pub fn single(conventional_fallback: bool) -> Self {
        Self {
            conventional_fallback,
            range: false,
        }
    }

    /// Validate every message in `StageContext::commit_messages` (pre-receive).
    pub fn range(conventional_fallback: bool) -> Self {
        Self {
            conventional_fallback,
            range: true,
        }
    }
}

#[async_trait]
impl Validator for MessageFormatValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let messages: Vec<&str> = if self.range {
            ctx.commit_messages.iter().map(String::as_str).collect()
        } else {
            ctx.commit_message.as_deref().into_iter().collect()
        };
        if messages.is_empty() {
            return Ok(ValidationResult::skipped("no commit message to check"));
        }

        let mut notes = Vec::new();
        let mut invalid = Vec::new();
        let mut previous: Option<MessageTags> = None;
        for message in &messages {
            match check_message(message, self.conventional_fallback) {
                MessageCheck::Invalid(reason) => invalid.push(reason),
                MessageCheck::Conventional => {
                    notes.push("accepted via conventional-commit fallback".to_string())
                }
                MessageCheck::Generated => {}
                MessageCheck::Tagged(tags) => {
                    if let Some(prev) = &previous {
                        if check_transition(prev.persona, tags.persona) == TransitionCheck::Flagged
                        {
                            notes.push(format!(
                                "persona transition {} -> {} is not in the allowed graph",
                                prev.persona, tags.persona
                            ));
                        }
                    }
                    previous = Some(tags);
                }
            }
        }
        notes.dedup();

        let mut result = if invalid.is_empty() {
            ValidationResult::passed(format!("{} message(s) well-formed", messages.len()))
        } else {
            ValidationResult::failed(invalid.join("; ")).with_remediation(format!(
                "Reword the commit as `{REQUIRED_FORMAT}`, e.g. `[DEVELOPER] [STEP-001] Add auth`"
            ))
        };
        result.notes = notes;
        Ok(result)
    }
}
