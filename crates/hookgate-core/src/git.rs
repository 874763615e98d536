//! Git queries used to build a stage context.

use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};

use crate::error::{GateError, Result};

/// The all-zero object id git uses for "no commit" in push/receive ranges.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Most commits inspected when a pushed ref has no previous value.
pub const NEW_BRANCH_SCAN_LIMIT: usize = 100;

fn git_bytes(repo_dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| GateError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GateError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

fn git(repo_dir: &Path, args: &[&str]) -> Result<String> {
    let out = git_bytes(repo_dir, args)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let sha = git(repo_dir, &["rev-parse", "HEAD"])?.trim().to_string();
    if sha.is_empty() {
        return Err(GateError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Top level of the work tree containing `dir`.
pub fn repo_root(dir: &Path) -> Result<PathBuf> {
    let root = git(dir, &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(root.trim()))
}

/// Paths added, copied, modified or renamed in the index.
pub fn staged_files(repo_dir: &Path) -> Result<Vec<String>> {
    git(
        repo_dir,
        &["diff", "--cached", "--name-only", "--diff-filter=ACMR"],
    )
    .map(|out| lines(&out))
}

/// Full message of the HEAD commit.
pub fn head_message(repo_dir: &Path) -> Result<String> {
    git(repo_dir, &["log", "-1", "--pretty=%B"]).map(|m| m.trim().to_string())
}

/// Paths touched by the HEAD commit.
pub fn head_changed_files(repo_dir: &Path) -> Result<Vec<String>> {
    git(
        repo_dir,
        &["diff-tree", "--no-commit-id", "--name-only", "-r", "--root", "HEAD"],
    )
    .map(|out| lines(&out))
}

/// Paths that differ between two revisions.
pub fn changed_files_between(repo_dir: &Path, from: &str, to: &str) -> Result<Vec<String>> {
    let range = format!("{from}..{to}");
    git(repo_dir, &["diff", "--name-only", &range]).map(|out| lines(&out))
}

/// Commit messages reachable from `new` but not from `old`, oldest first.
///
/// An all-zero `old` (new branch) lists the commits no remote-tracking ref
/// has yet, capped at [`NEW_BRANCH_SCAN_LIMIT`].
pub fn commit_messages(repo_dir: &Path, old: &str, new: &str) -> Result<Vec<String>> {
    if new == ZERO_SHA {
        return Ok(Vec::new());
    }
    let range = format!("{old}..{new}");
    let limit = format!("--max-count={NEW_BRANCH_SCAN_LIMIT}");
    let mut args = vec!["log", "--format=%B%x00"];
    if old == ZERO_SHA {
        args.extend([limit.as_str(), new, "--not", "--remotes"]);
    } else {
        args.push(&range);
    }
    let out = git(repo_dir, &args)?;
    let mut messages: Vec<String> = out
        .split('\0')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    messages.reverse();
    Ok(messages)
}

/// Content hash of the current work-tree state.
///
/// Covers HEAD, the staged and unstaged diffs and untracked paths, so two
/// invocations with the same fingerprint see identical inputs.
pub fn worktree_fingerprint(repo_dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    // An unborn branch has no HEAD; the diffs still identify the state.
    let head = capture_head_sha(repo_dir).unwrap_or_default();
    hasher.update(head.as_bytes());
    for args in [
        &["diff", "--cached", "--binary"][..],
        &["diff", "--binary"][..],
        &["status", "--porcelain", "--untracked-files=all"][..],
    ] {
        hasher.update([0u8]);
        hasher.update(git_bytes(repo_dir, args)?);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Name recorded as the actor of an audited bypass.
pub fn actor(repo_dir: &Path) -> String {
    git(repo_dir, &["config", "user.name"])
        .ok()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
