//! Persona/step rules and context-document sync against a real repository.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use hookgate_core::validators::{
    ContextFreshnessValidator, MessageFormatValidator, WorkflowSyncValidator,
};
use hookgate_core::{
    check_transition, validate_step_progression, validate_transition, ContextStore,
    FsContextStore, GateConfig, HookOrchestrator, HookStage, Persona, StageContext, StageInput,
    TransitionCheck, ValidationStatus, Validator,
};

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn make_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
    dir
}

fn commit_file(repo: &Path, name: &str, message: &str) {
    std::fs::write(repo.join(name), name).unwrap();
    run_git(repo, &["add", name]);
    run_git(repo, &["commit", "-m", message]);
}

#[test]
fn qa_to_developer_is_allowed_and_qa_to_pm_is_only_flagged() {
    assert!(validate_transition(Persona::Qa, Persona::Developer));
    assert_eq!(
        check_transition(Persona::Qa, Persona::Developer),
        TransitionCheck::Allowed
    );
    assert!(!validate_transition(Persona::Qa, Persona::ProductManager));
    assert_eq!(
        check_transition(Persona::Qa, Persona::ProductManager),
        TransitionCheck::Flagged
    );
    for persona in Persona::ALL {
        assert!(validate_transition(persona, persona));
    }
}

#[test]
fn step_numbers_must_be_within_range() {
    assert!(!validate_step_progression("", "STEP-0"));
    assert!(validate_step_progression("", "STEP-1"));
    assert!(validate_step_progression("", "STEP-9999"));
    assert!(!validate_step_progression("", "STEP-10000"));
    // Going backwards is noted, never rejected.
    assert!(validate_step_progression("- STEP-040 done", "STEP-007"));
}

#[tokio::test]
async fn commit_msg_stage_accepts_tagged_and_fallback_messages() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(GateConfig::default());
    let mut gate = HookOrchestrator::new(dir.path(), config.clone(), "t").without_report_files();
    let strict: Vec<Box<dyn Validator>> = vec![Box::new(MessageFormatValidator::single(false))];
    let lenient: Vec<Box<dyn Validator>> = vec![Box::new(MessageFormatValidator::single(true))];

    let mut ctx = StageContext::new(HookStage::CommitMsg, dir.path(), config);
    ctx.commit_message = Some("[DEVELOPER] [STEP-001] Add auth".to_string());
    assert!(gate.run_stage(&ctx, &strict).await.success);

    ctx.commit_message = Some("fix bug".to_string());
    let rejected = gate.run_stage(&ctx, &strict).await;
    assert!(!rejected.success);
    assert_eq!(
        rejected.failure_report.unwrap()[0].category,
        hookgate_core::ErrorCategory::InvalidMessageFormat
    );
    assert!(gate.run_stage(&ctx, &lenient).await.success);
}

#[tokio::test]
async fn post_commit_syncs_the_context_document_from_head() {
    let repo = make_git_repo();
    commit_file(repo.path(), "auth.rs", "[ARCHITECT] [STEP-003] Sketch auth");
    commit_file(repo.path(), "login.rs", "[DEVELOPER] [STEP-004] Implement login");

    let config = Arc::new(GateConfig::default());
    let ctx = StageContext::gather(
        HookStage::PostCommit,
        repo.path(),
        config.clone(),
        StageInput::default(),
    )
    .unwrap();
    assert_eq!(ctx.changed_files, vec!["login.rs".to_string()]);

    let mut gate = HookOrchestrator::new(repo.path(), config.clone(), "t").without_report_files();
    let validators: Vec<Box<dyn Validator>> = vec![Box::new(WorkflowSyncValidator::sync())];
    let report = gate.run_stage(&ctx, &validators).await;
    assert!(report.success);
    assert_eq!(report.results["workflow-sync"].status, ValidationStatus::Passed);

    let store = FsContextStore::new(repo.path().join("CURRENT_WORK.md"));
    let doc = store.read().unwrap().unwrap();
    let current = doc.current.unwrap();
    assert_eq!(current.persona, Persona::Developer);
    assert_eq!(current.step, "STEP-004");
    assert_eq!(doc.recent_changes, vec!["login.rs".to_string()]);

    // A pre-commit freshness check now passes.
    let pre = StageContext::gather(
        HookStage::PreCommit,
        repo.path(),
        config,
        StageInput::default(),
    )
    .unwrap();
    let fresh: Vec<Box<dyn Validator>> = vec![Box::new(ContextFreshnessValidator::new(24))];
    assert!(gate.run_stage(&pre, &fresh).await.success);
}

#[tokio::test]
async fn pre_rebase_drift_is_recovered_by_syncing() {
    let repo = make_git_repo();
    let config = Arc::new(GateConfig::default());
    let mut gate = HookOrchestrator::new(repo.path(), config.clone(), "t").without_report_files();

    commit_file(repo.path(), "a.rs", "[QA] [STEP-010] Verify a");
    let post = StageContext::gather(HookStage::PostCommit, repo.path(), config.clone(), StageInput::default()).unwrap();
    gate.run_stage(&post, &[Box::new(WorkflowSyncValidator::sync()) as Box<dyn Validator>])
        .await;

    // HEAD moves on without the post-commit hook running.
    commit_file(repo.path(), "b.rs", "[DEVELOPER] [STEP-011] Fix a");
    let pre = StageContext::gather(HookStage::PreRebase, repo.path(), config, StageInput::default()).unwrap();
    let report = gate
        .run_stage(&pre, &[Box::new(WorkflowSyncValidator::check()) as Box<dyn Validator>])
        .await;

    assert!(report.success, "{}", report.render());
    let attempts = &report.recovery.as_ref().unwrap().attempts;
    assert!(attempts[0].successful);
    let doc = FsContextStore::new(repo.path().join("CURRENT_WORK.md"))
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(doc.current.unwrap().step, "STEP-011");
    assert_eq!(doc.history.len(), 2);
}
