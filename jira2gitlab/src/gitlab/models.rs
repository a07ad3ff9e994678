//! Typed views over GitLab REST payloads.

use serde::{Deserialize, Serialize};

/// A GitLab user as returned by the users endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// A namespace (group or user) a project can live under.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabNamespace {
    pub id: u64,
    pub full_path: String,
}

/// A group, looked up to create epics in.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabGroup {
    pub id: u64,
    pub full_path: String,
}

/// A project milestone.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabMilestone {
    pub id: u64,
    pub title: String,
}

/// Body for issue (and epic) creation. Fields GitLab does not know for
/// a given endpoint are ignored server-side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewIssue {
    /// Original creation timestamp; honored only for admin callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<u64>>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
    /// Comma-separated label list.
    pub labels: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
}

/// The identity of a created issue or epic, as the engine records it.
#[derive(Debug, Clone)]
pub struct CreatedItem {
    /// Global id.
    pub id: u64,

    /// Project id for issues, group id for epics.
    pub container_id: u64,

    /// Container-scoped iid used in endpoint paths.
    pub iid: u64,

    /// Full reference, e.g. `group1/project1#42`.
    pub full_ref: String,
}

/// Addresses an existing issue or epic for notes, updates and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRef {
    /// A regular project issue.
    Issue { project_id: u64, iid: u64 },

    /// A group-level epic (premium tier).
    Epic { group_id: u64, iid: u64 },
}

impl ItemRef {
    /// Path of the item relative to the API base.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Issue { project_id, iid } => format!("projects/{project_id}/issues/{iid}"),
            Self::Epic { group_id, iid } => format!("groups/{group_id}/epics/{iid}"),
        }
    }
}

/// Response of the project file upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GitlabUpload {
    pub full_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_ref_paths() {
        let issue = ItemRef::Issue {
            project_id: 5,
            iid: 12,
        };
        assert_eq!(issue.path(), "projects/5/issues/12");

        let epic = ItemRef::Epic {
            group_id: 9,
            iid: 3,
        };
        assert_eq!(epic.path(), "groups/9/epics/3");
    }

    #[test]
    fn new_issue_omits_absent_fields() {
        let body = NewIssue {
            title: "t".to_string(),
            description: "d".to_string(),
            labels: "jira-import".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("created_at"));
        assert!(!json.contains("weight"));
        assert!(json.contains("\"labels\":\"jira-import\""));
    }
}
