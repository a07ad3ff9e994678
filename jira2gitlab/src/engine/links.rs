//! End-of-run resolution of the pending link set.
//!
//! Links are keyed by Jira issue keys and resolved only once both
//! endpoints have a mapping record, which may happen runs later for
//! cross-project references. Each entry is handled independently:
//! resolved and terminally unresolvable entries leave the set, missing
//! endpoints and transient failures keep it for the next run.

use super::MigrationEngine;
use crate::gitlab::ItemRef;
use tracing::{info, warn};

impl MigrationEngine {
    pub(crate) async fn resolve_pending_links(&mut self) {
        if self.state.pending_links.is_empty() {
            return;
        }
        info!(
            pending = self.state.pending_links.len(),
            "Resolving pending issue links"
        );

        for link in self.state.pending_links.clone() {
            let (Some(from), Some(to)) = (
                self.state.issue_mapping.get(&link.from).cloned(),
                self.state.issue_mapping.get(&link.to).cloned(),
            ) else {
                warn!(
                    from = %link.from,
                    kind = %link.kind,
                    to = %link.to,
                    "Link endpoint not imported yet, keeping link pending"
                );
                self.summary.links_pending += 1;
                continue;
            };

            let from_item = ItemRef::Issue {
                project_id: from.project_id,
                iid: from.iid,
            };

            let result = match link.kind.as_str() {
                "relates to" | "blocks" | "causes" => {
                    // Directional types need the premium tier; below it
                    // everything degrades to an undirected relation.
                    let link_type = match (self.config.gitlab.premium, link.kind.as_str()) {
                        (true, "blocks" | "causes") => "blocks",
                        _ => "relates_to",
                    };
                    self.gitlab
                        .create_issue_link(from_item, to.project_id, to.iid, link_type)
                        .await
                }
                // No first-class duplicate relation; the quick action
                // closes the duplicate and cross-references the other.
                "duplicates" => {
                    self.gitlab
                        .create_note(from_item, &format!("/duplicate {}", to.full_ref), None, None)
                        .await
                }
                // Clone relationships have no GitLab counterpart.
                "clones" => {
                    self.state.pending_links.remove(&link);
                    self.summary.links_resolved += 1;
                    continue;
                }
                other => {
                    warn!(
                        from = %link.from,
                        kind = other,
                        to = %link.to,
                        "Unknown link kind, dropping link"
                    );
                    self.state.pending_links.remove(&link);
                    self.summary.links_failed += 1;
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    info!(from = %from.full_ref, kind = %link.kind, to = %to.full_ref, "Created link");
                    self.state.pending_links.remove(&link);
                    self.summary.links_resolved += 1;
                }
                Err(e) => {
                    warn!(
                        from = %link.from,
                        kind = %link.kind,
                        to = %link.to,
                        error = %e,
                        "Could not create link, will retry next run"
                    );
                    self.summary.links_failed += 1;
                }
            }
        }
    }
}
