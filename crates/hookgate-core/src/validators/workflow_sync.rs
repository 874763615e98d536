//! Keeps the context document consistent with commit history.

use async_trait::async_trait;

use crate::result::ValidationResult;
use crate::validator::{StageContext, Validator};
use crate::workflow::{
    check_transition, parse_message_tags, step_regression, ContextStore, ContextSynchronizer,
    FsContextStore, MessageTags, StepId, TransitionCheck,
};

pub const NAME: &str = "workflow-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Rewrite the document from the latest tagged commit (post-* stages).
    Sync,
    /// Only compare the document against the latest tagged commit.
    Check,
}

pub struct WorkflowSyncValidator {
    mode: SyncMode,
}

impl WorkflowSyncValidator {
    pub fn sync() -> Self {
        Self {
            mode: SyncMode::Sync,
        }
    }

    pub fn check() -> Self {
        Self {
            mode: SyncMode::Check,
        }
    }
}

/// Latest persona/step tags visible to the stage.
pub fn latest_tags(ctx: &StageContext) -> Option<MessageTags> {
    ctx.commit_messages
        .iter()
        .rev()
        .find_map(|m| parse_message_tags(m))
        .or_else(|| ctx.subject_message().and_then(parse_message_tags))
}

#[async_trait]
impl Validator for WorkflowSyncValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let Some(tags) = latest_tags(ctx) else {
            return Ok(ValidationResult::skipped("no persona/step tags to reconcile"));
        };
        let store = FsContextStore::new(ctx.context_path());

        match self.mode {
            SyncMode::Sync => {
                let synchronizer = ContextSynchronizer::new(store, ctx.config.max_history);
                let synced = synchronizer.sync_context(
                    tags.persona,
                    &tags.step,
                    ctx.relevant_files(),
                )?;
                let mut result = ValidationResult::passed(format!(
                    "context synced to {} {} ({} history entries)",
                    tags.persona, synced.current.step, synced.history_len
                ));
                result.notes = synced.notes;
                Ok(result)
            }
            SyncMode::Check => check_document(&store, &tags),
        }
    }
}

fn check_document(store: &FsContextStore, tags: &MessageTags) -> anyhow::Result<ValidationResult> {
    let remediation = format!(
        "Run `hookgate sync --persona {} --step {}`",
        tags.persona, tags.step
    );
    let current = store.read()?.and_then(|doc| {
        let history = doc.history_text();
        doc.current.map(|c| (c, history))
    });
    let Some((current, history)) = current else {
        return Ok(
            ValidationResult::warning("workflow out of sync: context document missing")
                .with_remediation(remediation),
        );
    };

    let parsed = tags.step.parse::<StepId>().ok();
    let step = parsed
        .as_ref()
        .map(StepId::to_string)
        .unwrap_or_else(|| tags.step.clone());

    let mut notes = Vec::new();
    if check_transition(current.persona, tags.persona) == TransitionCheck::Flagged {
        notes.push(format!(
            "persona transition {} -> {} is not in the allowed graph",
            current.persona, tags.persona
        ));
    }
    if let Some(note) = parsed.and_then(|p| step_regression(&history, &p)) {
        notes.push(note);
    }

    let mut result = if current.persona == tags.persona && current.step == step {
        ValidationResult::passed(format!("context matches {} {step}", tags.persona))
    } else {
        ValidationResult::warning(format!(
            "workflow out of sync: context shows {} {}, latest commit is {} {step}",
            current.persona, current.step, tags.persona
        ))
        .with_remediation(remediation)
    };
    result.notes = notes;
    Ok(result)
}
