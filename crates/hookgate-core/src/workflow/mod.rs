//! Persona/workflow consistency.
//!
//! - [`persona`]: persona vocabulary and the allowed-transition graph
//! - [`step`]: `PREFIX-NUMBER` step identifiers
//! - [`document`]: the shared "current work" document
//! - [`store`]: atomic file-backed storage for that document
//!
//! [`ContextSynchronizer::sync_context`] reconciles the document with the
//! persona and step of the latest commit.

pub mod document;
pub mod persona;
pub mod step;
pub mod store;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use document::{WorkEntry, WorkflowContextDocument};
pub use persona::{check_transition, validate_transition, Persona, TransitionCheck};
pub use step::{step_regression, validate_step_progression, StepId, MAX_STEP};
pub use store::{ContextStore, FsContextStore};

use crate::error::{GateError, Result};

/// Persona and step parsed out of a `[PERSONA] [STEP-NNN] summary` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTags {
    pub persona: Persona,
    pub step: String,
    pub summary: String,
}

fn tagged_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[([A-Za-z_ -]+)\]\s*\[([A-Za-z][A-Za-z0-9_]*-\d+)\]\s*(.*)$")
            .expect("static regex")
    })
}

/// Extract persona/step tags from the first line of a commit message.
///
/// Returns `None` when the line is not tagged or names an unknown persona.
pub fn parse_message_tags(message: &str) -> Option<MessageTags> {
    let first = message.lines().next()?.trim();
    let caps = tagged_pattern().captures(first)?;
    Some(MessageTags {
        persona: caps[1].parse().ok()?,
        step: caps[2].to_ascii_uppercase(),
        summary: caps[3].trim().to_string(),
    })
}

/// Outcome of a document reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// SHA-256 of the document as written.
    pub hash: String,
    pub previous: Option<WorkEntry>,
    pub current: WorkEntry,
    pub transition: Option<TransitionCheck>,
    pub history_len: usize,
    /// Advisory findings (flagged transitions, step regressions).
    pub notes: Vec<String>,
}

/// Keeps the shared document in step with commit history.
pub struct ContextSynchronizer<S: ContextStore> {
    store: S,
    max_history: usize,
}

impl<S: ContextStore> ContextSynchronizer<S> {
    pub fn new(store: S, max_history: usize) -> Self {
        Self {
            store,
            max_history: max_history.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Regenerate the active section for `persona`/`step_id` and prepend the
    /// new state to the bounded history.
    pub fn sync_context(
        &self,
        persona: Persona,
        step_id: &str,
        changed_files: &[String],
    ) -> Result<SyncResult> {
        let step: StepId = step_id.parse()?;
        let mut doc = self.store.read()?.unwrap_or_default();

        let mut notes = Vec::new();
        let previous = doc.current.clone();
        let transition = previous.as_ref().map(|prev| {
            let check = check_transition(prev.persona, persona);
            if check == TransitionCheck::Flagged {
                notes.push(format!(
                    "persona transition {} -> {} is not in the allowed graph",
                    prev.persona, persona
                ));
            }
            check
        });
        if let Some(note) = step_regression(&doc.history_text(), &step) {
            notes.push(note);
        }

        let entry = WorkEntry::new(persona, step.to_string());
        doc.apply(entry.clone(), changed_files.to_vec(), self.max_history);
        let hash = self.store.atomic_write(&doc)?;

        tracing::info!(
            event = "context.synced",
            persona = %persona,
            step = %entry.step,
            history_len = doc.history.len(),
        );

        Ok(SyncResult {
            hash,
            previous,
            current: entry,
            transition,
            history_len: doc.history.len(),
            notes,
        })
    }

    /// Append a minimal entry when the document is missing or stale.
    ///
    /// Uses the existing active state when there is one, otherwise `fallback`.
    pub fn synthesize_entry(&self, fallback: Option<(Persona, String)>) -> Result<String> {
        let mut doc = self.store.read()?.unwrap_or_default();
        let entry = match (&doc.current, fallback) {
            (Some(current), _) => WorkEntry::new(current.persona, current.step.clone()),
            (None, Some((persona, step))) => WorkEntry::new(persona, step),
            (None, None) => {
                return Err(GateError::Context(
                    "no active persona to synthesize a context entry from".to_string(),
                ))
            }
        };
        doc.apply(entry, Vec::new(), self.max_history);
        self.store.atomic_write(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synchronizer(dir: &std::path::Path, max: usize) -> ContextSynchronizer<FsContextStore> {
        ContextSynchronizer::new(FsContextStore::new(dir.join("CURRENT_WORK.md")), max)
    }

    #[test]
    fn test_parse_message_tags() {
        let tags = parse_message_tags("[DEVELOPER] [STEP-001] Add auth\n\nbody").unwrap();
        assert_eq!(tags.persona, Persona::Developer);
        assert_eq!(tags.step, "STEP-001");
        assert_eq!(tags.summary, "Add auth");
        assert!(parse_message_tags("fix bug").is_none());
        assert!(parse_message_tags("[JANITOR] [STEP-001] sweep").is_none());
    }

    #[test]
    fn test_sync_creates_document_and_tracks_transition() {
        let dir = tempfile::tempdir().unwrap();
        let sync = synchronizer(dir.path(), 10);

        let first = sync.sync_context(Persona::Qa, "STEP-001", &[]).unwrap();
        assert!(first.previous.is_none());
        assert!(first.transition.is_none());

        let second = sync
            .sync_context(Persona::Developer, "STEP-002", &["src/a.rs".to_string()])
            .unwrap();
        assert_eq!(second.transition, Some(TransitionCheck::Allowed));
        assert!(second.notes.is_empty());
        assert_eq!(second.history_len, 2);

        let doc = sync.store().read().unwrap().unwrap();
        assert_eq!(doc.current.unwrap().step, "STEP-002");
        assert_eq!(doc.recent_changes, vec!["src/a.rs".to_string()]);
    }

    #[test]
    fn test_sync_flags_but_accepts_unlisted_transition() {
        let dir = tempfile::tempdir().unwrap();
        let sync = synchronizer(dir.path(), 10);
        sync.sync_context(Persona::Qa, "STEP-005", &[]).unwrap();

        let result = sync
            .sync_context(Persona::ProductManager, "STEP-002", &[])
            .unwrap();
        assert_eq!(result.transition, Some(TransitionCheck::Flagged));
        assert_eq!(result.notes.len(), 2, "flagged transition and step regression");
        assert_eq!(result.current.persona, Persona::ProductManager);
    }

    #[test]
    fn test_sync_rejects_out_of_range_step() {
        let dir = tempfile::tempdir().unwrap();
        let sync = synchronizer(dir.path(), 10);
        assert!(sync.sync_context(Persona::Developer, "STEP-0", &[]).is_err());
        assert!(sync.store().read().unwrap().is_none());
    }

    #[test]
    fn test_history_bounded_by_max() {
        let dir = tempfile::tempdir().unwrap();
        let sync = synchronizer(dir.path(), 2);
        for n in 1..=4 {
            sync.sync_context(Persona::Developer, &format!("STEP-{n}"), &[])
                .unwrap();
        }
        let doc = sync.store().read().unwrap().unwrap();
        assert_eq!(doc.history.len(), 2);
        assert_eq!(doc.history[0].step, "STEP-004");
    }

    #[test]
    fn test_synthesize_entry_needs_some_state() {
        let dir = tempfile::tempdir().unwrap();
        let sync = synchronizer(dir.path(), 5);
        assert!(sync.synthesize_entry(None).is_err());
        sync.synthesize_entry(Some((Persona::Developer, "STEP-001".to_string())))
            .unwrap();
        let doc = sync.store().read().unwrap().unwrap();
        assert_eq!(doc.history.len(), 1);
    }
}
