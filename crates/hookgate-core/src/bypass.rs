//! Bypass policy and the append-only audit ledger.
//!
//! A bypass is an operator override of a blocking or warning failure. Which
//! overrides exist is a table of [`BypassTrigger`] predicates; whether one is
//! allowed is decided by the failure's [`ErrorClassification`]. Every approved
//! bypass is appended to a JSON-lines log that is never rewritten.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{ErrorCategory, ErrorClassification, Severity};
use crate::error::{GateError, Result};
use crate::stage::HookStage;

/// Env flag that overrides a failing gate.
pub const ENV_OVERRIDE: &str = "HOOKGATE_BYPASS";
/// Env flag for the skip-all-validation escape hatch.
pub const ENV_SKIP_ALL: &str = "HOOKGATE_SKIP_ALL";
/// Env var carrying the operator's justification.
pub const ENV_REASON: &str = "HOOKGATE_BYPASS_REASON";

const DEV_PREFIXES: &[&str] = &["WIP:", "[WIP]", "DEV:"];
const DEV_KEYWORD: &str = "[skip-gate]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassMethod {
    /// Development-mode prefix or keyword in the commit message.
    DevPrefix,
    /// Environment-level override flag.
    EnvOverride,
    /// Skip-all-validation escape hatch.
    SkipAll,
}

impl std::fmt::Display for BypassMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BypassMethod::DevPrefix => "dev_prefix",
            BypassMethod::EnvOverride => "env_override",
            BypassMethod::SkipAll => "skip_all",
        };
        write!(f, "{s}")
    }
}

/// Everything a trigger predicate may look at.
#[derive(Debug, Clone, Default)]
pub struct BypassInput {
    /// Commit message or other operator-supplied text.
    pub text: Option<String>,
    pub env: HashMap<String, String>,
    pub development_mode: bool,
}

impl BypassInput {
    /// Snapshot the hookgate-related variables of the process environment.
    pub fn from_env(text: Option<String>, development_mode: bool) -> Self {
        let env = [ENV_OVERRIDE, ENV_SKIP_ALL, ENV_REASON]
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self {
            text,
            env,
            development_mode,
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.env
            .get(key)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    /// Operator justification, falling back to the triggering text.
    pub fn reason(&self, method: BypassMethod) -> String {
        if let Some(reason) = self.env.get(ENV_REASON).filter(|r| !r.trim().is_empty()) {
            return reason.trim().to_string();
        }
        match (method, &self.text) {
            (BypassMethod::DevPrefix, Some(text)) => {
                text.lines().next().unwrap_or_default().trim().to_string()
            }
            _ => format!("{method} requested without reason"),
        }
    }
}

/// One entry of the bypass trigger table.
pub struct BypassTrigger {
    pub method: BypassMethod,
    pub description: &'static str,
    predicate: fn(&BypassInput) -> bool,
}

fn dev_prefix_triggered(input: &BypassInput) -> bool {
    if !input.development_mode {
        return false;
    }
    let Some(text) = input.text.as_deref() else {
        return false;
    };
    let text = text.trim_start();
    DEV_PREFIXES.iter().any(|p| text.starts_with(p)) || text.contains(DEV_KEYWORD)
}

fn env_override_triggered(input: &BypassInput) -> bool {
    input.flag(ENV_OVERRIDE)
}

fn skip_all_triggered(input: &BypassInput) -> bool {
    input.flag(ENV_SKIP_ALL)
}

/// Trigger table, in precedence order. New bypass methods are new rows.
pub const BYPASS_TRIGGERS: &[BypassTrigger] = &[
    BypassTrigger {
        method: BypassMethod::DevPrefix,
        description: "prefix the message with WIP:, [WIP] or DEV:, or include [skip-gate]",
        predicate: dev_prefix_triggered,
    },
    BypassTrigger {
        method: BypassMethod::EnvOverride,
        description: "set HOOKGATE_BYPASS=1 (and HOOKGATE_BYPASS_REASON)",
        predicate: env_override_triggered,
    },
    BypassTrigger {
        method: BypassMethod::SkipAll,
        description: "set HOOKGATE_SKIP_ALL=1 to waive every bypassable check",
        predicate: skip_all_triggered,
    },
];

/// Whether `input` triggers bypass method `method`.
pub fn is_bypass_trigger(input: &BypassInput, method: BypassMethod) -> bool {
    BYPASS_TRIGGERS
        .iter()
        .find(|t| t.method == method)
        .map(|t| (t.predicate)(input))
        .unwrap_or(false)
}

/// The highest-precedence bypass method requested by `input`, if any.
pub fn requested_bypass(input: &BypassInput) -> Option<BypassMethod> {
    BYPASS_TRIGGERS
        .iter()
        .find(|t| (t.predicate)(input))
        .map(|t| t.method)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassOption {
    pub method: BypassMethod,
    pub description: String,
    pub requires_audit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassOptions {
    pub available: bool,
    pub methods: Vec<BypassOption>,
}

/// Bypass methods permitted for a classified failure.
pub fn get_bypass_options(classification: &ErrorClassification) -> BypassOptions {
    if classification.severity == Severity::NonBlocking || !classification.bypassable {
        return BypassOptions {
            available: false,
            methods: Vec::new(),
        };
    }
    BypassOptions {
        available: true,
        methods: BYPASS_TRIGGERS
            .iter()
            .map(|t| BypassOption {
                method: t.method,
                description: t.description.to_string(),
                requires_audit: true,
            })
            .collect(),
    }
}

/// Whether `method` may override a failure with this classification.
pub fn is_bypass_permitted(classification: &ErrorClassification, method: BypassMethod) -> bool {
    get_bypass_options(classification)
        .methods
        .iter()
        .any(|o| o.method == method)
}

/// One approved override. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: HookStage,
    pub error_category: ErrorCategory,
    pub error_severity: Severity,
    pub bypass_method: BypassMethod,
    pub reason: String,
    pub actor: String,
}

/// File-backed, append-only bypass ledger (`bypass.jsonl`).
#[derive(Debug, Clone)]
pub struct AuditLedger {
    path: PathBuf,
    actor: String,
}

impl AuditLedger {
    pub fn new(path: impl Into<PathBuf>, actor: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            actor: actor.into(),
        }
    }

    /// Ledger at `<state_dir>/audit/bypass.jsonl`.
    pub fn in_state_dir(state_dir: &Path, actor: impl Into<String>) -> Self {
        Self::new(state_dir.join("audit").join("bypass.jsonl"), actor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an approved bypass. Refuses methods the policy does not permit.
    pub fn record_bypass(
        &self,
        stage: HookStage,
        classification: &ErrorClassification,
        method: BypassMethod,
        reason: &str,
    ) -> Result<BypassRecord> {
        let mut records =
            self.record_bypasses(stage, std::slice::from_ref(classification), method, reason)?;
        records
            .pop()
            .ok_or_else(|| GateError::Ledger("no bypass record written".to_string()))
    }

    /// Append one record per classification in a single write. Nothing is
    /// written unless the method is permitted for every classification.
    pub fn record_bypasses(
        &self,
        stage: HookStage,
        classifications: &[ErrorClassification],
        method: BypassMethod,
        reason: &str,
    ) -> Result<Vec<BypassRecord>> {
        if let Some(denied) = classifications
            .iter()
            .find(|c| !is_bypass_permitted(c, method))
        {
            return Err(GateError::Ledger(format!(
                "bypass via {method} not permitted for {} ({:?})",
                denied.category, denied.severity
            )));
        }

        let timestamp = Utc::now();
        let records: Vec<BypassRecord> = classifications
            .iter()
            .map(|c| BypassRecord {
                timestamp,
                stage,
                error_category: c.category,
                error_severity: c.severity,
                bypass_method: method,
                reason: reason.to_string(),
                actor: self.actor.clone(),
            })
            .collect();
        self.append(&records)?;
        for record in &records {
            tracing::warn!(
                event = "bypass.recorded",
                stage = %stage,
                category = %record.error_category,
                method = %method,
                actor = %record.actor,
            );
        }
        Ok(records)
    }

    fn append(&self, records: &[BypassRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut lines = Vec::new();
        for record in records {
            serde_json::to_writer(&mut lines, record)?;
            lines.push(b'\n');
        }
        // Single write on an O_APPEND handle keeps concurrent writers line-atomic.
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&lines)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replay the ledger in write order. A missing log is an empty trail.
    pub fn trail(&self) -> Result<Vec<BypassRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                GateError::Ledger(format!("corrupt audit entry at line {}: {e}", idx + 1))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}
