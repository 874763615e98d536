//! The shared "current work" document.
//!
//! Rendered as markdown with three managed sections (`Active`,
//! `Recent Changes`, `History`). Any other `## ` section is carried through
//! untouched so humans can keep notes in the same file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::persona::Persona;

const TITLE: &str = "# Current Work";
const ACTIVE: &str = "Active";
const RECENT: &str = "Recent Changes";
const HISTORY: &str = "History";

/// One persona/step state of the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkEntry {
    pub timestamp: DateTime<Utc>,
    pub persona: Persona,
    pub step: String,
    pub phase: String,
}

impl WorkEntry {
    pub fn new(persona: Persona, step: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            persona,
            step: step.into(),
            phase: persona.phase().to_string(),
        }
    }

    fn history_line(&self) -> String {
        format!(
            "- {} | {} | {} | {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.persona,
            self.step,
            self.phase
        )
    }

    fn parse_history_line(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix("- ")?;
        let parts: Vec<&str> = body.split('|').map(str::trim).collect();
        if parts.len() != 4 {
            return None;
        }
        Some(Self {
            timestamp: DateTime::parse_from_rfc3339(parts[0]).ok()?.with_timezone(&Utc),
            persona: parts[1].parse().ok()?,
            step: parts[2].to_string(),
            phase: parts[3].to_string(),
        })
    }

    /// Same persona and step, ignoring time.
    pub fn same_state(&self, other: &WorkEntry) -> bool {
        self.persona == other.persona && self.step == other.step
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContextDocument {
    pub current: Option<WorkEntry>,
    pub recent_changes: Vec<String>,
    /// Newest first.
    pub history: Vec<WorkEntry>,
    /// Unmanaged sections as `(heading, body)`.
    pub extra_sections: Vec<(String, String)>,
}

impl WorkflowContextDocument {
    /// Parse the markdown form. Unreadable lines are dropped, not fatal.
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut active = ActiveFields::default();
        let mut section: Option<String> = None;
        let mut body = String::new();

        for line in text.lines() {
            if let Some(heading) = line.strip_prefix("## ") {
                doc.absorb_section(section.take(), &body, &mut active);
                section = Some(heading.trim().to_string());
                body.clear();
            } else if section.is_some() {
                body.push_str(line);
                body.push('\n');
            }
        }
        doc.absorb_section(section.take(), &body, &mut active);

        doc.current = active.into_entry();
        doc
    }

    fn absorb_section(&mut self, heading: Option<String>, body: &str, active: &mut ActiveFields) {
        let Some(heading) = heading else { return };
        match heading.as_str() {
            ACTIVE => {
                for line in body.lines() {
                    active.absorb(line);
                }
            }
            RECENT => {
                self.recent_changes = body
                    .lines()
                    .filter_map(|l| l.trim().strip_prefix("- "))
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
            }
            HISTORY => {
                self.history = body.lines().filter_map(WorkEntry::parse_history_line).collect();
            }
            _ => self
                .extra_sections
                .push((heading, body.trim_end().to_string())),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("{TITLE}\n\n## {ACTIVE}\n");
        match &self.current {
            Some(entry) => {
                out.push_str(&format!("- Persona: {}\n", entry.persona));
                out.push_str(&format!("- Step: {}\n", entry.step));
                out.push_str(&format!("- Phase: {}\n", entry.phase));
                out.push_str(&format!(
                    "- Updated: {}\n",
                    entry
                        .timestamp
                        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ));
            }
            None => out.push_str("- none\n"),
        }

        out.push_str(&format!("\n## {RECENT}\n"));
        for change in &self.recent_changes {
            out.push_str(&format!("- {change}\n"));
        }

        out.push_str(&format!("\n## {HISTORY}\n"));
        for entry in &self.history {
            out.push_str(&entry.history_line());
            out.push('\n');
        }

        for (heading, body) in &self.extra_sections {
            out.push_str(&format!("\n## {heading}\n"));
            if !body.is_empty() {
                out.push_str(body);
                out.push('\n');
            }
        }
        out
    }

    /// Text of the history section, used for step-regression checks.
    pub fn history_text(&self) -> String {
        self.history
            .iter()
            .map(WorkEntry::history_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the active state and prepend it to history, keeping at most
    /// `max_history` entries. Re-applying the current head only refreshes it.
    pub fn apply(&mut self, entry: WorkEntry, changes: Vec<String>, max_history: usize) {
        match self.history.first_mut() {
            Some(head) if head.same_state(&entry) => *head = entry.clone(),
            _ => self.history.insert(0, entry.clone()),
        }
        self.history.truncate(max_history);
        self.current = Some(entry);
        if !changes.is_empty() {
            self.recent_changes = changes;
        }
    }
}

#[derive(Default)]
struct ActiveFields {
    persona: Option<Persona>,
    step: Option<String>,
    phase: Option<String>,
    updated: Option<DateTime<Utc>>,
}

impl ActiveFields {
    fn absorb(&mut self, line: &str) {
        let Some(body) = line.trim().strip_prefix("- ") else {
            return;
        };
        let Some((key, value)) = body.split_once(':') else {
            return;
        };
        let value = value.trim();
        match key.trim() {
            "Persona" => self.persona = value.parse().ok(),
            "Step" => self.step = Some(value.to_string()),
            "Phase" => self.phase = Some(value.to_string()),
            "Updated" => {
                self.updated = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            _ => {}
        }
    }

    fn into_entry(self) -> Option<WorkEntry> {
        let persona = self.persona?;
        Some(WorkEntry {
            timestamp: self.updated.unwrap_or_else(Utc::now),
            persona,
            step: self.step?,
            phase: self
                .phase
                .unwrap_or_else(|| persona.phase().to_string()),
        })
    }
}
