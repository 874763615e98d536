//! Checks that the shared context document exists and is recent.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::result::ValidationResult;
use crate::validator::{StageContext, Validator};
use crate::workflow::{ContextStore, FsContextStore};

pub const NAME: &str = "context-freshness";

pub struct ContextFreshnessValidator {
    max_age: Duration,
}

impl ContextFreshnessValidator {
    pub fn new(max_age_hours: u64) -> Self {
        Self {
            // A century is effectively "never stale".
            max_age: Duration::hours(max_age_hours.min(876_000) as i64),
        }
    }
}

#[async_trait]
impl Validator for ContextFreshnessValidator {
    fn name(&self) -> &str {
        NAME
    }

    async fn validate(&self, ctx: &StageContext) -> anyhow::Result<ValidationResult> {
        let path = ctx.context_path();
        let store = FsContextStore::new(&path);
        let remediation = "Run `hookgate sync --persona <PERSONA> --step <STEP-NNN>` to refresh the context document";

        let Some(doc) = store.read()? else {
            return Ok(ValidationResult::warning(format!(
                "context document missing: {}",
                path.display()
            ))
            .with_remediation(remediation));
        };
        let Some(current) = doc.current else {
            return Ok(ValidationResult::warning(
                "context document missing an active persona/step entry",
            )
            .with_remediation(remediation));
        };

        let age = Utc::now().signed_duration_since(current.timestamp);
        if age > self.max_age {
            return Ok(ValidationResult::warning(format!(
                "context is stale: last updated {}h ago for {} {}",
                age.num_hours(),
                current.persona,
                current.step
            ))
            .with_remediation(remediation));
        }

        Ok(ValidationResult::passed(format!(
            "context current: {} {} ({}m old)",
            current.persona,
            current.step,
            age.num_minutes().max(0)
        )))
    }
}
