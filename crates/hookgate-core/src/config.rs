//! Gate configuration (`.hookgate/config.json`).
//!
//! Keys are camelCase. A missing file yields defaults; unknown keys are
//! reported as warnings; wrong-typed values are errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GateError, Result};
use crate::stage::HookStage;

/// Minimum vulnerability tier that fails the security audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Low,
    Moderate,
    High,
    Critical,
}

/// Which concerns the remote CI pipeline already covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteCi {
    pub lint: bool,
    pub test: bool,
    pub build: bool,
    pub security: bool,
}

/// An external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolCommand {
    /// Executable followed by its arguments.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Append the applicable staged files to the argument list.
    pub append_files: bool,
    /// Extra arguments used when bail-on-first-failure is active.
    pub bail_args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 60,
            append_files: false,
            bail_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl ToolCommand {
    pub fn new(command: &[&str], timeout_secs: u64) -> Self {
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_secs,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolCommands {
    pub lint: ToolCommand,
    /// Auto-fix command used by lint recovery.
    pub format: ToolCommand,
    pub test_fast: ToolCommand,
    pub test_full: ToolCommand,
    pub audit: ToolCommand,
    pub build: ToolCommand,
    /// File extensions the linter applies to; empty means every file.
    pub lint_extensions: Vec<String>,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            lint: ToolCommand::new(
                &["cargo", "clippy", "--all-targets", "--", "-D", "warnings"],
                120,
            ),
            format: ToolCommand::new(&["cargo", "fmt", "--all"], 60),
            test_fast: ToolCommand::new(&["cargo", "test", "--lib"], 60),
            // cargo already stops at the first failing test binary.
            test_full: ToolCommand::new(&["cargo", "test", "--workspace"], 600),
            audit: ToolCommand::new(&["cargo", "audit"], 120),
            build: ToolCommand::new(&["cargo", "build", "--workspace"], 300),
            lint_extensions: vec!["rs".to_string()],
        }
    }
}

macro_rules! toggles {
    ($(#[$meta:meta])* $name:ident { $($field:ident : $default:expr),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(default, rename_all = "camelCase")]
        pub struct $name {
            pub enabled: bool,
            $(pub $field: bool,)*
        }

        impl Default for $name {
            fn default() -> Self {
                Self { enabled: true, $($field: $default,)* }
            }
        }
    };
}

toggles!(PreCommitToggles { linting: true, testing: true, context_validation: true });
toggles!(CommitMsgToggles { gatekeeper: true, conventional_fallback: true });
toggles!(PrePushToggles { testing: true, full_tests: false, build: true, security: true, bmad_sync: true });
toggles!(PostCommitToggles { workflow: true });
toggles!(PostMergeToggles { workflow: true, context_validation: true });
toggles!(PreRebaseToggles { workflow: true });
toggles!(PostCheckoutToggles { context_validation: true });
toggles!(PreReceiveToggles { gatekeeper: true, workflow: true });

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HookToggles {
    pub pre_commit: PreCommitToggles,
    pub commit_msg: CommitMsgToggles,
    pub pre_push: PrePushToggles,
    pub post_commit: PostCommitToggles,
    pub post_merge: PostMergeToggles,
    pub pre_rebase: PreRebaseToggles,
    pub post_checkout: PostCheckoutToggles,
    pub pre_receive: PreReceiveToggles,
}

impl HookToggles {
    pub fn stage_enabled(&self, stage: HookStage) -> bool {
        match stage {
            HookStage::PreCommit => self.pre_commit.enabled,
            HookStage::CommitMsg => self.commit_msg.enabled,
            HookStage::PrePush => self.pre_push.enabled,
            HookStage::PostCommit => self.post_commit.enabled,
            HookStage::PostMerge => self.post_merge.enabled,
            HookStage::PreRebase => self.pre_rebase.enabled,
            HookStage::PostCheckout => self.post_checkout.enabled,
            HookStage::PreReceive => self.pre_receive.enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// Directory for cache, audit log, reports (relative to the repo root).
    pub state_dir: PathBuf,
    pub strict_mode: bool,
    pub development_mode: bool,
    pub auto_recovery: bool,
    pub max_recovery_attempts: u32,
    pub cache_ttl_secs: u64,
    pub metrics_window: usize,
    /// Report files kept per stage in `reports/` and `recovery/`.
    pub report_retention: usize,
    pub context_file: PathBuf,
    pub max_history: usize,
    pub context_max_age_hours: u64,
    pub coverage_threshold: Option<f64>,
    pub audit_level: AuditLevel,
    pub stage_budgets_ms: BTreeMap<HookStage, u64>,
    pub remote_ci: RemoteCi,
    pub hooks: HookToggles,
    pub tools: ToolCommands,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".hookgate"),
            strict_mode: true,
            development_mode: true,
            auto_recovery: true,
            max_recovery_attempts: 3,
            cache_ttl_secs: 300,
            metrics_window: 50,
            report_retention: 20,
            context_file: PathBuf::from("CURRENT_WORK.md"),
            max_history: 10,
            context_max_age_hours: 24,
            coverage_threshold: None,
            audit_level: AuditLevel::High,
            stage_budgets_ms: BTreeMap::new(),
            remote_ci: RemoteCi::default(),
            hooks: HookToggles::default(),
            tools: ToolCommands::default(),
        }
    }
}

/// Keys whose children are free-form and not checked for unknown names.
const FREE_FORM_KEYS: &[&str] = &["stageBudgetsMs", "env"];

/// Parsed configuration plus non-fatal findings.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: GateConfig,
    pub warnings: Vec<String>,
    /// Where the configuration came from; `None` for built-in defaults.
    pub source: Option<PathBuf>,
}

impl GateConfig {
    /// Default location inside a repository.
    pub fn default_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".hookgate").join("config.json")
    }

    /// Load from `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<LoadedConfig> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(LoadedConfig {
                    config: GateConfig::default(),
                    warnings: Vec::new(),
                    source: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let mut loaded = Self::from_json_str(&text)
            .map_err(|e| GateError::Config(format!("{}: {e}", path.display())))?;
        loaded.source = Some(path.to_path_buf());
        Ok(loaded)
    }

    pub fn from_json_str(text: &str) -> Result<LoadedConfig> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| GateError::Config(e.to_string()))?;
        if !value.is_object() {
            return Err(GateError::Config("top level must be a JSON object".to_string()));
        }
        let known = serde_json::to_value(GateConfig::default())?;
        let mut warnings = Vec::new();
        collect_unknown_keys(&value, &known, "", &mut warnings);
        for w in &warnings {
            tracing::warn!(warning = %w, "config");
        }

        let config: GateConfig =
            serde_json::from_value(value).map_err(|e| GateError::Config(e.to_string()))?;
        config.check()?;
        Ok(LoadedConfig {
            config,
            warnings,
            source: None,
        })
    }

    fn check(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(GateError::Config("maxHistory must be at least 1".to_string()));
        }
        if self.metrics_window == 0 {
            return Err(GateError::Config("metricsWindow must be at least 1".to_string()));
        }
        if self.report_retention == 0 {
            return Err(GateError::Config(
                "reportRetention must be at least 1".to_string(),
            ));
        }
        if let Some(t) = self.coverage_threshold {
            if !(0.0..=100.0).contains(&t) {
                return Err(GateError::Config(format!(
                    "coverageThreshold {t} is outside 0..=100"
                )));
            }
        }
        Ok(())
    }

    pub fn budget_ms(&self, stage: HookStage) -> u64 {
        self.stage_budgets_ms
            .get(&stage)
            .copied()
            .unwrap_or_else(|| stage.default_budget_ms())
    }

    pub fn state_dir_in(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.state_dir)
    }

    pub fn context_path_in(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.context_file)
    }
}

fn collect_unknown_keys(value: &Value, known: &Value, prefix: &str, out: &mut Vec<String>) {
    let (Value::Object(map), Value::Object(known_map)) = (value, known) else {
        return;
    };
    for (key, child) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match known_map.get(key) {
            None => out.push(format!("unknown key `{path}` ignored")),
            Some(_) if FREE_FORM_KEYS.contains(&key.as_str()) => {}
            Some(known_child) => collect_unknown_keys(child, known_child, &path, out),
        }
    }
}
