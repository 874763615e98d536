use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::metrics::MetricsSummary;
use crate::result::{FailureEntry, RecoveryPayload, StageReport};
use crate::stage::HookStage;

/// Per-run report file consumed by dashboards and CI annotations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageReportArtifact {
    pub schema_version: String,
    pub report: StageReport,
    pub metrics: MetricsSummary,
}

/// Written for post-* stages whose internal checks failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryArtifact {
    pub schema_version: String,
    pub id: Uuid,
    pub stage: HookStage,
    pub generated_at: DateTime<Utc>,
    pub failures: Vec<FailureEntry>,
    pub recovery: Option<RecoveryPayload>,
    pub remediation: Option<String>,
}

const SCHEMA_VERSION: &str = "1.0";

fn file_name(stage: HookStage, id: Uuid) -> String {
    format!("{}-{}.json", stage.name(), id)
}

pub fn report_path(state_dir: &Path, report: &StageReport) -> PathBuf {
    state_dir
        .join("reports")
        .join(file_name(report.stage, report.id))
}

pub fn recovery_path(state_dir: &Path, report: &StageReport) -> PathBuf {
    state_dir
        .join("recovery")
        .join(file_name(report.stage, report.id))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{:?} has no parent directory", path))?;
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let content = serde_json::to_vec_pretty(value).context("serialize artifact")?;
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("temp file in {:?}", dir))?;
    tmp.write_all(&content)?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write `reports/<stage>-<id>.json`.
pub fn write_stage_report(
    state_dir: &Path,
    report: &StageReport,
    metrics: &MetricsSummary,
) -> Result<PathBuf> {
    let path = report_path(state_dir, report);
    let artifact = StageReportArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        report: report.clone(),
        metrics: metrics.clone(),
    };
    write_json_atomic(&path, &artifact)?;
    Ok(path)
}

/// Write `recovery/<stage>-<id>.json`.
pub fn write_recovery_report(state_dir: &Path, report: &StageReport) -> Result<PathBuf> {
    let path = recovery_path(state_dir, report);
    let artifact = RecoveryArtifact {
        schema_version: SCHEMA_VERSION.to_string(),
        id: report.id,
        stage: report.stage,
        generated_at: report.timestamp,
        failures: report.failure_report.clone().unwrap_or_default(),
        recovery: report.recovery.clone(),
        remediation: report.remediation.clone(),
    };
    write_json_atomic(&path, &artifact)?;
    Ok(path)
}

/// Delete all but the newest `keep` report files for `stage` in `dir`.
/// Returns how many were removed.
pub fn prune_reports(dir: &Path, stage: HookStage, keep: usize) -> Result<usize> {
    let prefix = format!("{}-", stage.name());
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("list {:?}", dir)),
    };

    let mut reports = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(".json"))
        else {
            continue;
        };
        if Uuid::parse_str(id).is_err() {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        reports.push((modified, entry.path()));
    }
    if reports.len() <= keep {
        return Ok(0);
    }

    // Newest first; ties broken by name so the order is stable.
    reports.sort_by(|a, b| b.cmp(a));
    let mut removed = 0;
    for (_, path) in reports.into_iter().skip(keep) {
        std::fs::remove_file(&path).with_context(|| format!("remove {:?}", path))?;
        removed += 1;
    }
    Ok(removed)
}

pub fn read_stage_report(path: &Path) -> Result<StageReportArtifact> {
    let bytes = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {:?}", path))
}
