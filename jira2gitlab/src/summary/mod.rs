//! End-of-run reporting types.

use std::collections::BTreeMap;

/// Outcome of a single issue transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Already imported and unchanged; nothing was done.
    Skipped,

    /// Imported for the first time.
    Imported,

    /// Changed since last import; old item deleted, new one created.
    Recreated,

    /// Transaction failed; any created item was rolled back.
    Failed {
        /// Error message for the report.
        error: String,
    },
}

/// Summary of a complete run, printed by the CLI and used to derive
/// the exit status.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of project pairs processed.
    pub projects_processed: usize,

    /// Total issues seen across all projects.
    pub issues_seen: usize,

    /// Issues imported for the first time.
    pub issues_imported: usize,

    /// Issues deleted and re-imported because they changed.
    pub issues_recreated: usize,

    /// Issues skipped as already imported and unchanged.
    pub issues_skipped: usize,

    /// Issues whose transaction failed and was rolled back.
    pub issues_failed: usize,

    /// Links and link-annotations successfully created.
    pub links_resolved: usize,

    /// Links left pending because an endpoint was never imported.
    pub links_pending: usize,

    /// Links that failed to create this run (retried next run).
    pub links_failed: usize,

    /// Jira usernames with no mapping entry, with occurrence counts.
    /// All of these were impersonated by the administrator.
    pub unmapped_users: BTreeMap<String, u64>,

    /// Mapped GitLab usernames that don't exist and were not migrated,
    /// with occurrence counts.
    pub unmigrated_users: BTreeMap<String, u64>,

    /// Users whose temporary admin privilege could not be reverted.
    /// These require manual follow-up.
    pub unreverted_admins: Vec<String>,

    /// Whether the run was interrupted by the operator.
    pub interrupted: bool,
}

impl RunSummary {
    /// Updates the per-issue counters with one transaction outcome.
    pub fn record_issue(&mut self, outcome: &IssueOutcome) {
        self.issues_seen += 1;
        match outcome {
            IssueOutcome::Skipped => self.issues_skipped += 1,
            IssueOutcome::Imported => self.issues_imported += 1,
            IssueOutcome::Recreated => self.issues_recreated += 1,
            IssueOutcome::Failed { .. } => self.issues_failed += 1,
        }
    }

    /// Returns true if any item or link failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.issues_failed > 0 || self.links_failed > 0
    }

    /// Returns true if everything succeeded and the run completed.
    #[must_use]
    pub fn all_success(&self) -> bool {
        !self.has_failures() && !self.interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_issue_outcomes() {
        let mut summary = RunSummary::default();
        summary.record_issue(&IssueOutcome::Imported);
        summary.record_issue(&IssueOutcome::Skipped);
        summary.record_issue(&IssueOutcome::Failed {
            error: "boom".to_string(),
        });

        assert_eq!(summary.issues_seen, 3);
        assert_eq!(summary.issues_imported, 1);
        assert_eq!(summary.issues_skipped, 1);
        assert_eq!(summary.issues_failed, 1);
        assert!(summary.has_failures());
        assert!(!summary.all_success());
    }

    #[test]
    fn interrupted_run_is_not_a_success() {
        let summary = RunSummary {
            interrupted: true,
            ..Default::default()
        };
        assert!(!summary.has_failures());
        assert!(!summary.all_success());
    }
}
