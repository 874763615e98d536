//! hookgate core library
//!
//! Validation gate for git lifecycle hooks: failure classification, bounded
//! recovery, audited bypass, the per-stage validation pipeline and the
//! persona/workflow consistency checks behind the shared context document.

pub mod bypass;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod git;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod recovery;
pub mod remediation;
pub mod reporting;
pub mod result;
pub mod stage;
pub mod telemetry;
pub mod validator;
pub mod validators;
pub mod workflow;

pub use bypass::{
    get_bypass_options, is_bypass_permitted, is_bypass_trigger, requested_bypass, AuditLedger,
    BypassInput, BypassMethod, BypassOption, BypassOptions, BypassRecord,
};
pub use cache::{cache_key, ResultCache};
pub use classify::{
    BlockingType, ErrorCategory, ErrorClassification, ErrorClassifier, FailureSignal, Severity,
};
pub use config::{AuditLevel, GateConfig, LoadedConfig, RemoteCi, ToolCommand, ToolCommands};
pub use error::{GateError, Result};
pub use git::{capture_head_sha, is_git_repo};
pub use metrics::{MetricSample, MetricsSummary, MetricsTracker};
pub use obs::stage_span;
pub use orchestrator::HookOrchestrator;
pub use recovery::{
    Fixer, PerfFlags, RecoveryAction, RecoveryContext, RecoveryEngine, RecoveryOutcome,
    RecoveryPaths, RecoveryPolicy,
};
pub use result::{
    FailureEntry, RecoveryPayload, StageReport, ValidationResult, ValidationStatus,
};
pub use stage::{HookStage, StageState};
pub use telemetry::init_tracing;
pub use validator::{RefUpdate, StageContext, StageInput, Validator};
pub use workflow::{
    check_transition, parse_message_tags, validate_step_progression, validate_transition,
    ContextStore, ContextSynchronizer, FsContextStore, Persona, StepId, SyncResult,
    TransitionCheck, WorkflowContextDocument,
};

/// hookgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
