//! File-backed store for the "current work" document.
//!
//! Writes go to a temp file in the same directory followed by a rename, so
//! readers see either the old or the new document. Cross-process advisory
//! locking is owned by the external context manager.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::document::WorkflowContextDocument;
use crate::error::Result;

/// Narrow interface over the shared document.
pub trait ContextStore: Send + Sync {
    /// Current document, or `None` when none exists yet.
    fn read(&self) -> Result<Option<WorkflowContextDocument>>;

    /// Replace the document atomically; returns the SHA-256 of the bytes written.
    fn atomic_write(&self, doc: &WorkflowContextDocument) -> Result<String>;

    /// Last modification time, or `None` when the document is missing.
    fn last_modified(&self) -> Result<Option<SystemTime>>;
}

#[derive(Debug, Clone)]
pub struct FsContextStore {
    path: PathBuf,
}

impl FsContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextStore for FsContextStore {
    fn read(&self) -> Result<Option<WorkflowContextDocument>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(WorkflowContextDocument::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn atomic_write(&self, doc: &WorkflowContextDocument) -> Result<String> {
        let bytes = doc.render().into_bytes();
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    fn last_modified(&self) -> Result<Option<SystemTime>> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::document::WorkEntry;
    use crate::workflow::persona::Persona;

    #[test]
    fn test_missing_document_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContextStore::new(dir.path().join("CURRENT_WORK.md"));
        assert!(store.read().unwrap().is_none());
        assert!(store.last_modified().unwrap().is_none());
    }

    #[test]
    fn test_atomic_write_creates_parent_and_returns_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContextStore::new(dir.path().join("docs/CURRENT_WORK.md"));
        let mut doc = WorkflowContextDocument::default();
        doc.apply(WorkEntry::new(Persona::Architect, "STEP-003"), Vec::new(), 5);

        let hash = store.atomic_write(&doc).unwrap();
        assert_eq!(hash.len(), 64);

        let back = store.read().unwrap().unwrap();
        assert_eq!(back.current.unwrap().persona, Persona::Architect);
        let leftovers = fs::read_dir(dir.path().join("docs")).unwrap().count();
        assert_eq!(leftovers, 1, "temp file must not linger");
    }
}
