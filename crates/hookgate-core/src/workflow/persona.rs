//! Persona vocabulary and the static allowed-transition graph.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// A named role in the agent workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Persona {
    Analyst,
    #[serde(rename = "PM")]
    ProductManager,
    Architect,
    UxExpert,
    #[serde(rename = "PO")]
    ProductOwner,
    #[serde(rename = "SM")]
    ScrumMaster,
    Developer,
    Qa,
}

impl Persona {
    pub const ALL: [Persona; 8] = [
        Persona::Analyst,
        Persona::ProductManager,
        Persona::Architect,
        Persona::UxExpert,
        Persona::ProductOwner,
        Persona::ScrumMaster,
        Persona::Developer,
        Persona::Qa,
    ];

    /// Tag used in commit messages, e.g. `[DEVELOPER]`.
    pub fn tag(&self) -> &'static str {
        match self {
            Persona::Analyst => "ANALYST",
            Persona::ProductManager => "PM",
            Persona::Architect => "ARCHITECT",
            Persona::UxExpert => "UX_EXPERT",
            Persona::ProductOwner => "PO",
            Persona::ScrumMaster => "SM",
            Persona::Developer => "DEVELOPER",
            Persona::Qa => "QA",
        }
    }

    /// Workflow phase a persona normally works in.
    pub fn phase(&self) -> &'static str {
        match self {
            Persona::Analyst | Persona::ProductManager => "planning",
            Persona::Architect | Persona::UxExpert => "design",
            Persona::ProductOwner | Persona::ScrumMaster => "preparation",
            Persona::Developer => "implementation",
            Persona::Qa => "validation",
        }
    }

    /// Personas that may directly follow this one.
    pub fn allowed_next(&self) -> &'static [Persona] {
        use Persona::*;
        match self {
            Analyst => &[ProductManager, Architect],
            ProductManager => &[Architect, UxExpert, ProductOwner],
            Architect => &[ProductManager, ProductOwner, Developer],
            UxExpert => &[Architect, ProductOwner],
            ProductOwner => &[ProductManager, ScrumMaster, Developer],
            ScrumMaster => &[ProductOwner, Developer],
            Developer => &[Architect, ScrumMaster, Qa],
            Qa => &[ProductOwner, ScrumMaster, Developer],
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Persona {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s
            .trim()
            .trim_matches(|c| c == '[' || c == ']')
            .to_ascii_uppercase()
            .replace([' ', '-'], "_");
        let persona = match key.as_str() {
            "ANALYST" | "BA" => Persona::Analyst,
            "PM" | "PRODUCT_MANAGER" => Persona::ProductManager,
            "ARCHITECT" => Persona::Architect,
            "UX_EXPERT" | "UX" | "DESIGN_ARCHITECT" => Persona::UxExpert,
            "PO" | "PRODUCT_OWNER" => Persona::ProductOwner,
            "SM" | "SCRUM_MASTER" => Persona::ScrumMaster,
            "DEVELOPER" | "DEV" => Persona::Developer,
            "QA" | "TESTER" => Persona::Qa,
            _ => return Err(GateError::UnknownPersona(s.to_string())),
        };
        Ok(persona)
    }
}

/// Verdict of a persona transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCheck {
    /// Same persona twice.
    Identity,
    /// Edge present in the allowed-transition graph.
    Allowed,
    /// Edge absent; reported as a warning, never a hard failure.
    Flagged,
}

pub fn check_transition(from: Persona, to: Persona) -> TransitionCheck {
    if from == to {
        TransitionCheck::Identity
    } else if from.allowed_next().contains(&to) {
        TransitionCheck::Allowed
    } else {
        TransitionCheck::Flagged
    }
}

/// Whether `from -> to` is in the allowed graph (identity always is).
pub fn validate_transition(from: Persona, to: Persona) -> bool {
    check_transition(from, to) != TransitionCheck::Flagged
}
