//! Typed views over Jira REST payloads.
//!
//! Optional fields mirror what Jira genuinely leaves out: issues can
//! lack a reporter, a resolution, a priority or a description, and
//! worklogs can lack a comment.

use serde::Deserialize;
use serde_json::Value;

/// A Jira issue: the raw payload (kept for fingerprinting and for
/// custom-field access) plus the typed fields the engine works with.
#[derive(Debug, Clone)]
pub struct JiraIssue {
    /// Raw issue JSON exactly as returned by the search endpoint.
    pub raw: Value,

    /// Internal numeric id, used by the dev-status endpoint.
    pub id: String,

    /// Stable human-readable key, e.g. `PROJ-123`.
    pub key: String,

    pub fields: JiraFields,
}

impl JiraIssue {
    /// Parses a raw search-result entry.
    pub(crate) fn from_raw(raw: Value) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Shape {
            id: String,
            key: String,
            fields: JiraFields,
        }

        let shape: Shape = serde_json::from_value(raw.clone())?;
        Ok(Self {
            raw,
            id: shape.id,
            key: shape.key,
            fields: shape.fields,
        })
    }

    /// Returns a custom field value from the raw payload, `None` when
    /// absent or null.
    #[must_use]
    pub fn custom_field(&self, field: &str) -> Option<&Value> {
        let value = self.raw.get("fields")?.get(field)?;
        (!value.is_null()).then_some(value)
    }

    /// Custom epic-link field: the key of the containing epic.
    #[must_use]
    pub fn epic_key(&self, epic_field: Option<&str>) -> Option<&str> {
        self.custom_field(epic_field?)?.as_str()
    }

    /// Whether this issue is an epic (a container item).
    #[must_use]
    pub fn is_epic(&self) -> bool {
        self.fields.issuetype.name == "Epic"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraFields {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub resolutiondate: Option<String>,
    pub reporter: Option<JiraUserRef>,
    pub assignee: Option<JiraUserRef>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub issuetype: JiraNamed,
    pub status: Option<JiraStatus>,
    pub priority: Option<JiraNamed>,
    pub resolution: Option<JiraNamed>,
    #[serde(default)]
    pub components: Vec<JiraNamed>,
    #[serde(default, rename = "fixVersions")]
    pub fix_versions: Vec<JiraNamed>,
    #[serde(default, rename = "issuelinks")]
    pub issue_links: Vec<JiraIssueLink>,
    #[serde(default)]
    pub subtasks: Vec<JiraIssueRef>,
    #[serde(default)]
    pub attachment: Vec<JiraAttachment>,
    pub comment: Option<JiraComments>,
    pub worklog: Option<JiraWorklogs>,
}

/// An embedded user reference. Old Jira versions occasionally omit the
/// username even when the object is present.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraUserRef {
    pub name: Option<String>,
}

/// Anything Jira models as `{ "name": ... }` (type, priority,
/// resolution, component, fix version).
#[derive(Debug, Clone, Deserialize)]
pub struct JiraNamed {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraStatus {
    pub name: String,
    #[serde(rename = "statusCategory")]
    pub status_category: Option<JiraStatusCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraStatusCategory {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssueRef {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraIssueLink {
    #[serde(rename = "type")]
    pub link_type: JiraLinkType,
    #[serde(rename = "outwardIssue")]
    pub outward_issue: Option<JiraIssueRef>,
}

/// Only the outward direction is kept: (a blocks b) implies
/// (b blocked-by a), so inward links would create duplicates.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraLinkType {
    pub outward: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraAttachment {
    pub filename: String,
    /// Download URL of the binary.
    pub content: String,
    pub author: Option<JiraUserRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraComments {
    #[serde(default)]
    pub comments: Vec<JiraComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraComment {
    pub author: Option<JiraUserRef>,
    pub body: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraWorklogs {
    #[serde(default)]
    pub worklogs: Vec<JiraWorklog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraWorklog {
    pub author: Option<JiraUserRef>,
    pub comment: Option<String>,
    #[serde(rename = "timeSpent")]
    pub time_spent: String,
    pub started: Option<String>,
}

/// A standalone Jira user, fetched when provisioning a GitLab account.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraUser {
    #[serde(rename = "emailAddress")]
    pub email_address: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Development-status payload listing commits referencing an issue.
#[derive(Debug, Clone, Deserialize)]
pub struct DevStatusResponse {
    #[serde(default)]
    pub detail: Vec<DevStatusDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevStatusDetail {
    #[serde(default)]
    pub repositories: Vec<DevStatusRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevStatusRepository {
    #[serde(default)]
    pub commits: Vec<DevStatusCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevStatusCommit {
    pub id: String,
    #[serde(rename = "displayId")]
    pub display_id: String,
    pub url: String,
    pub message: String,
    pub author: DevStatusAuthor,
    /// Epoch milliseconds.
    #[serde(rename = "authorTimestamp")]
    pub author_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevStatusAuthor {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_issue() {
        let raw = json!({
            "id": "10001",
            "key": "P1-10",
            "fields": {
                "summary": "A bug",
                "issuetype": {"name": "Bug"},
            }
        });

        let issue = JiraIssue::from_raw(raw).unwrap();
        assert_eq!(issue.key, "P1-10");
        assert_eq!(issue.fields.issuetype.name, "Bug");
        assert!(issue.fields.reporter.is_none());
        assert!(issue.fields.attachment.is_empty());
        assert!(!issue.is_epic());
    }

    #[test]
    fn reads_epic_key_custom_field() {
        let raw = json!({
            "id": "10002",
            "key": "P1-11",
            "fields": {
                "issuetype": {"name": "Story"},
                "customfield_10103": "P1-1",
            }
        });

        let issue = JiraIssue::from_raw(raw).unwrap();
        assert_eq!(issue.epic_key(Some("customfield_10103")), Some("P1-1"));
        assert_eq!(issue.epic_key(Some("customfield_other")), None);
        assert_eq!(issue.epic_key(None), None);
    }

    #[test]
    fn null_custom_field_reads_as_absent() {
        let raw = json!({
            "id": "10003",
            "key": "P1-12",
            "fields": {
                "issuetype": {"name": "Task"},
                "customfield_10002": null,
            }
        });

        let issue = JiraIssue::from_raw(raw).unwrap();
        assert!(issue.custom_field("customfield_10002").is_none());
    }
}
