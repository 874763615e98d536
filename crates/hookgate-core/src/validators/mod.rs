//! Validators that need no external tool.

pub mod context_freshness;
pub mod message_format;
pub mod workflow_sync;

pub use context_freshness::ContextFreshnessValidator;
pub use message_format::{check_message, MessageCheck, MessageFormatValidator};
pub use workflow_sync::{latest_tags, SyncMode, WorkflowSyncValidator};
