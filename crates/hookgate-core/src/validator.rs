//! The validator seam and the per-invocation context validators read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{GateConfig, RemoteCi};
use crate::error::{GateError, Result};
use crate::git;
use crate::stage::HookStage;

/// One ref update fed to pre-push or pre-receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub old: String,
    pub new: String,
    pub name: String,
}

impl RefUpdate {
    /// Parse a pre-receive line: `<old> <new> <ref>`.
    pub fn parse_receive_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [old, new, name] => Ok(Self {
                old: old.to_string(),
                new: new.to_string(),
                name: name.to_string(),
            }),
            _ => Err(GateError::Git(format!("malformed ref update line: {line:?}"))),
        }
    }

    /// Parse a pre-push line: `<local ref> <local sha> <remote ref> <remote sha>`.
    pub fn parse_push_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [_local_ref, local_sha, remote_ref, remote_sha] => Ok(Self {
                old: remote_sha.to_string(),
                new: local_sha.to_string(),
                name: remote_ref.to_string(),
            }),
            _ => Err(GateError::Git(format!("malformed push line: {line:?}"))),
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.new == git::ZERO_SHA
    }
}

/// Raw inputs handed to a stage by the hook entry point.
#[derive(Debug, Clone, Default)]
pub struct StageInput {
    /// Commit message under validation (commit-msg).
    pub message: Option<String>,
    /// Pushed or received refs (pre-push, pre-receive).
    pub ref_updates: Vec<RefUpdate>,
    /// Previous and new HEAD (post-checkout).
    pub checkout: Option<(String, String)>,
}

/// Everything a validator may look at. Built once per invocation.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub stage: HookStage,
    pub repo_root: PathBuf,
    pub config: Arc<GateConfig>,
    pub staged_files: Vec<String>,
    pub changed_files: Vec<String>,
    /// Message of the commit being created (commit-msg).
    pub commit_message: Option<String>,
    /// Messages in the pushed/received ranges, oldest first.
    pub commit_messages: Vec<String>,
    /// Message of HEAD for post-* stages.
    pub head_message: Option<String>,
    /// Work-tree content hash used for result caching.
    pub fingerprint: Option<String>,
}

impl StageContext {
    pub fn new(stage: HookStage, repo_root: impl Into<PathBuf>, config: Arc<GateConfig>) -> Self {
        Self {
            stage,
            repo_root: repo_root.into(),
            config,
            staged_files: Vec::new(),
            changed_files: Vec::new(),
            commit_message: None,
            commit_messages: Vec::new(),
            head_message: None,
            fingerprint: None,
        }
    }

    /// Query git for what `stage` needs.
    pub fn gather(
        stage: HookStage,
        repo_root: &Path,
        config: Arc<GateConfig>,
        input: StageInput,
    ) -> Result<Self> {
        let mut ctx = Self::new(stage, repo_root, config);
        ctx.commit_message = input.message;
        ctx.fingerprint = match git::worktree_fingerprint(repo_root) {
            Ok(fp) => Some(fp),
            Err(e) => {
                tracing::debug!(error = %e, "no work-tree fingerprint, caching disabled");
                None
            }
        };

        match stage {
            HookStage::PreCommit => {
                ctx.staged_files = git::staged_files(repo_root)?;
                // Unborn branches have no HEAD yet.
                ctx.head_message = git::head_message(repo_root).ok();
            }
            HookStage::CommitMsg => {
                ctx.staged_files = git::staged_files(repo_root)?;
            }
            HookStage::PrePush | HookStage::PreReceive => {
                for update in input.ref_updates.iter().filter(|u| !u.is_deletion()) {
                    ctx.commit_messages
                        .extend(git::commit_messages(repo_root, &update.old, &update.new)?);
                    if update.old != git::ZERO_SHA {
                        ctx.changed_files.extend(git::changed_files_between(
                            repo_root,
                            &update.old,
                            &update.new,
                        )?);
                    }
                }
                ctx.changed_files.sort();
                ctx.changed_files.dedup();
            }
            HookStage::PostCommit | HookStage::PostMerge => {
                ctx.head_message = Some(git::head_message(repo_root)?);
                ctx.changed_files = git::head_changed_files(repo_root)?;
            }
            HookStage::PreRebase => {
                ctx.head_message = Some(git::head_message(repo_root)?);
            }
            HookStage::PostCheckout => {
                if let Some((prev, new)) = &input.checkout {
                    if prev != git::ZERO_SHA && prev != new {
                        ctx.changed_files = git::changed_files_between(repo_root, prev, new)?;
                    }
                }
            }
        }
        Ok(ctx)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.state_dir_in(&self.repo_root)
    }

    pub fn context_path(&self) -> PathBuf {
        self.config.context_path_in(&self.repo_root)
    }

    /// Files the stage is about: staged for pre-commit, changed otherwise.
    pub fn relevant_files(&self) -> &[String] {
        if self.staged_files.is_empty() {
            &self.changed_files
        } else {
            &self.staged_files
        }
    }

    /// The message a workflow check should read for this stage.
    pub fn subject_message(&self) -> Option<&str> {
        self.commit_message
            .as_deref()
            .or(self.head_message.as_deref())
            .or(self.commit_messages.last().map(String::as_str))
    }
}

/// A named check run within a stage.
///
/// Implementations report problems through the returned result; an `Err` or a
/// panic is turned into a `failed` result by the orchestrator.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a passed result may be reused for an identical work tree.
    fn cacheable(&self) -> bool {
        false
    }

    /// Whether the remote CI pipeline already runs this check.
    fn covered_by_remote_ci(&self, _remote: &RemoteCi) -> bool {
        false
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<crate::result::ValidationResult>;
}
