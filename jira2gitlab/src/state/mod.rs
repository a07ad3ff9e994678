//! Persistent migration state.
//!
//! A single versioned JSON file is the sole source of truth for what
//! has already been migrated. It is rewritten after every successful
//! issue transaction and at program exit, so a crash between issues
//! loses at most the in-progress issue.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Format version of the state file.
const STATE_VERSION: u32 = 1;

/// Errors that can occur while persisting the state file.
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to write the state file.
    #[error("Failed to write state file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the state.
    #[error("Failed to serialize state: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Persisted correspondence between one Jira issue and its GitLab
/// counterpart, written only after the full transaction succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Global GitLab issue (or epic) id.
    pub id: u64,

    /// GitLab project id the issue lives in (group id for epics).
    pub project_id: u64,

    /// Project-scoped issue iid used by most issue endpoints.
    pub iid: u64,

    /// Full human-readable reference, e.g. `group1/project1#42`.
    pub full_ref: String,

    /// Fingerprint of the Jira issue at import time.
    pub fingerprint: String,
}

/// An unresolved cross-issue link, keyed by Jira issue keys because the
/// GitLab counterparts may not exist yet when it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingLink {
    /// Jira key of the referencing issue.
    pub from: String,

    /// Jira link kind, e.g. `blocks`, `duplicates`.
    pub kind: String,

    /// Jira key of the referenced issue.
    pub to: String,
}

impl PendingLink {
    #[must_use]
    pub fn new(from: impl Into<String>, kind: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind: kind.into(),
            to: to.into(),
        }
    }
}

/// Durable migration state surviving process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportState {
    /// State file format version.
    version: u32,

    /// Jira issue key -> imported GitLab issue record.
    pub issue_mapping: BTreeMap<String, IssueRecord>,

    /// Links waiting for both endpoints to exist in GitLab.
    pub pending_links: BTreeSet<PendingLink>,

    /// GitLab usernames currently holding temporary admin privilege.
    /// Must be empty after a clean run.
    pub elevated_users: BTreeSet<String>,
}

impl Default for ImportState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            issue_mapping: BTreeMap::new(),
            pending_links: BTreeSet::new(),
            elevated_users: BTreeSet::new(),
        }
    }
}

impl ImportState {
    /// Loads the state file, starting fresh (with a warning) when the
    /// file is absent, unreadable, corrupt or of an unknown version.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No previous state file, starting fresh");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable state file, starting fresh");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(state) if state.version == STATE_VERSION => {
                info!(
                    issues = state.issue_mapping.len(),
                    pending_links = state.pending_links.len(),
                    elevated_users = state.elevated_users.len(),
                    "Loaded previous migration state"
                );
                state
            }
            Ok(state) => {
                warn!(
                    version = state.version,
                    expected = STATE_VERSION,
                    "Unknown state file version, starting fresh"
                );
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt state file, starting fresh");
                Self::default()
            }
        }
    }

    /// Atomically writes the state file (temp file + rename), so a
    /// crash mid-write can never leave a truncated state behind.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let serialized = serde_json::to_string_pretty(self)?;

        let tmp_path = path.with_extension("tmp");
        let io_err = |source| StateError::IoError {
            path: path.display().to_string(),
            source,
        };
        std::fs::write(&tmp_path, serialized).map_err(io_err)?;
        std::fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(fingerprint: &str) -> IssueRecord {
        IssueRecord {
            id: 77,
            project_id: 5,
            iid: 12,
            full_ref: "group1/project1#12".to_string(),
            fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import_status.json");

        let mut state = ImportState::default();
        state
            .issue_mapping
            .insert("P1-10".to_string(), sample_record("abc123"));
        state
            .pending_links
            .insert(PendingLink::new("P1-10", "blocks", "P1-11"));
        state.elevated_users.insert("alice".to_string());

        state.save(&path).unwrap();
        let loaded = ImportState::load(&path);

        assert_eq!(loaded.issue_mapping["P1-10"], sample_record("abc123"));
        assert!(loaded
            .pending_links
            .contains(&PendingLink::new("P1-10", "blocks", "P1-11")));
        assert!(loaded.elevated_users.contains("alice"));
    }

    #[test]
    fn absent_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let state = ImportState::load(&dir.path().join("missing.json"));
        assert!(state.issue_mapping.is_empty());
        assert!(state.pending_links.is_empty());
        assert!(state.elevated_users.is_empty());
    }

    #[test]
    fn corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import_status.json");
        std::fs::write(&path, "{not json").unwrap();

        let state = ImportState::load(&path);
        assert!(state.issue_mapping.is_empty());
    }

    #[test]
    fn unknown_version_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("import_status.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "issue_mapping": {}, "pending_links": [], "elevated_users": ["x"]}"#,
        )
        .unwrap();

        let state = ImportState::load(&path);
        assert!(state.elevated_users.is_empty());
    }

    #[test]
    fn pending_links_deduplicate() {
        let mut state = ImportState::default();
        state
            .pending_links
            .insert(PendingLink::new("P1-1", "blocks", "P1-2"));
        state
            .pending_links
            .insert(PendingLink::new("P1-1", "blocks", "P1-2"));
        assert_eq!(state.pending_links.len(), 1);
    }
}
