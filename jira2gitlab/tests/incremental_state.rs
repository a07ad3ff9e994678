//! Skip/re-import decisions across simulated runs: fingerprints plus
//! the persisted state file.

use jira2gitlab::{issue_fingerprint, ImportState, IssueRecord, PendingLink};
use serde_json::json;
use tempfile::TempDir;

fn sample_issue(summary: &str, last_viewed: &str) -> serde_json::Value {
    json!({
        "id": "10001",
        "key": "PROJ-1",
        "fields": {
            "summary": summary,
            "issuetype": {"name": "Bug"},
            "lastViewed": last_viewed,
        }
    })
}

#[test]
fn unchanged_issue_keeps_its_fingerprint_across_runs() {
    let volatile = vec!["lastViewed".to_string()];
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("import_status.json");

    // First run: import and record.
    let first = issue_fingerprint(&sample_issue("A bug", "2023-01-01"), &volatile);
    let mut state = ImportState::default();
    state.issue_mapping.insert(
        "PROJ-1".to_string(),
        IssueRecord {
            id: 500,
            project_id: 7,
            iid: 1,
            full_ref: "group1/project1#1".to_string(),
            fingerprint: first.clone(),
        },
    );
    state.save(&path).unwrap();

    // Second run: same issue, only the volatile field moved.
    let state = ImportState::load(&path);
    let second = issue_fingerprint(&sample_issue("A bug", "2024-06-30"), &volatile);
    assert_eq!(state.issue_mapping["PROJ-1"].fingerprint, second);

    // Third run: the summary was edited, so the issue must be redone.
    let third = issue_fingerprint(&sample_issue("A worse bug", "2024-06-30"), &volatile);
    assert_ne!(state.issue_mapping["PROJ-1"].fingerprint, third);
}

#[test]
fn pending_links_survive_restarts_until_resolved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("import_status.json");

    let mut state = ImportState::default();
    state
        .pending_links
        .insert(PendingLink::new("PROJ-1", "blocks", "OTHER-9"));
    state
        .pending_links
        .insert(PendingLink::new("PROJ-2", "duplicates", "PROJ-1"));
    state.save(&path).unwrap();

    // Next run: one endpoint arrives, its link resolves and leaves the
    // set; the cross-project one stays pending.
    let mut state = ImportState::load(&path);
    assert_eq!(state.pending_links.len(), 2);
    state
        .pending_links
        .remove(&PendingLink::new("PROJ-2", "duplicates", "PROJ-1"));
    state.save(&path).unwrap();

    let state = ImportState::load(&path);
    assert_eq!(state.pending_links.len(), 1);
    assert!(state
        .pending_links
        .contains(&PendingLink::new("PROJ-1", "blocks", "OTHER-9")));
}

#[test]
fn elevation_ledger_is_durable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("import_status.json");

    let mut state = ImportState::default();
    state.elevated_users.insert("john.smith".to_string());
    state.save(&path).unwrap();

    // A crash before revocation leaves the ledger entry for the next
    // run's cleanup.
    let state = ImportState::load(&path);
    assert!(state.elevated_users.contains("john.smith"));
}
