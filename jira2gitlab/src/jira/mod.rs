//! Jira REST client (read-only collaborator).
//!
//! Thin wrapper around `reqwest` covering exactly the reads the engine
//! needs: paginated issue search, single-issue summary, user lookup,
//! dev-status commit lookup and attachment download.

mod models;

pub use models::{
    DevStatusCommit, DevStatusRepository, JiraAttachment, JiraComment, JiraFields, JiraIssue,
    JiraIssueLink, JiraNamed, JiraUser, JiraUserRef, JiraWorklog,
};

use crate::config::JiraConfig;
use base64::Engine as _;
use models::DevStatusResponse;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// The dev-status endpoint has been observed hanging indefinitely, so
/// every call to it carries an explicit timeout.
const DEV_STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the Jira collaborator. All of them are item-scoped and
/// recoverable from the engine's point of view unless they hit the
/// initial project-wide issue fetch.
#[derive(Debug, Error)]
pub enum JiraError {
    /// Transport or HTTP status error.
    #[error("Jira API error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape.
    #[error("Unexpected Jira response from {url}: {source}")]
    UnexpectedResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Authenticated Jira client.
pub struct JiraClient {
    http: reqwest::Client,
    url: String,
    api_base: String,
    auth_header: String,
    pagination_size: usize,
}

impl JiraClient {
    /// Builds a client from the Jira configuration.
    ///
    /// # Errors
    ///
    /// Returns [`JiraError`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &JiraConfig, verify_ssl: bool) -> Result<Self, JiraError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;

        let credentials = format!("{}:{}", config.user, config.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        Ok(Self {
            http,
            url: config.url.clone(),
            api_base: config.api_base(),
            auth_header: format!("Basic {encoded}"),
            pagination_size: config.pagination_size,
        })
    }

    /// Fetches all issues of a project, ordered by key ascending, with
    /// attachments, comments and worklogs included.
    ///
    /// Pages through the search endpoint until an empty page comes
    /// back; the full set is held in memory.
    pub async fn fetch_project_issues(&self, project: &str) -> Result<Vec<JiraIssue>, JiraError> {
        let jql = format!("project=\"{project}\" ORDER BY key");
        let mut issues = Vec::new();
        let mut start_at = 0;

        loop {
            let url = format!(
                "{}/search?jql={}&fields=*navigable,attachment,comment,worklog&maxResults={}&startAt={}",
                self.api_base,
                urlencoding::encode(&jql),
                self.pagination_size,
                start_at
            );

            let page: serde_json::Value = self.get_json(&url, None).await?;
            let batch = page
                .get("issues")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();

            if batch.is_empty() {
                break;
            }

            start_at += batch.len();
            for raw in batch {
                let issue =
                    JiraIssue::from_raw(raw).map_err(|e| JiraError::UnexpectedResponse {
                        url: url.clone(),
                        source: e,
                    })?;
                issues.push(issue);
            }

            info!(project, loaded = start_at, "Loading Jira issues");
        }

        Ok(issues)
    }

    /// Fetches just the summary (title) of an issue by key or id.
    pub async fn fetch_issue_summary(&self, key: &str) -> Result<Option<String>, JiraError> {
        let url = format!("{}/issue/{}?fields=summary", self.api_base, key);
        let value: serde_json::Value = self.get_json(&url, None).await?;
        Ok(value
            .pointer("/fields/summary")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string))
    }

    /// Looks up a Jira user by username.
    pub async fn fetch_user(&self, username: &str) -> Result<JiraUser, JiraError> {
        let url = format!(
            "{}/user?username={}",
            self.api_base,
            urlencoding::encode(username)
        );
        self.get_json(&url, None).await
    }

    /// Fetches the repositories/commits referencing an issue through
    /// the development-status integration.
    ///
    /// This is an internal Jira endpoint, not part of the public API,
    /// and it can stall; the call is bounded by [`DEV_STATUS_TIMEOUT`].
    pub async fn fetch_commit_references(
        &self,
        issue_id: &str,
    ) -> Result<Vec<DevStatusRepository>, JiraError> {
        let url = format!(
            "{}/rest/dev-status/latest/issue/detail?issueId={}&applicationType=stash&dataType=repository",
            self.url, issue_id
        );

        let response: DevStatusResponse = self.get_json(&url, Some(DEV_STATUS_TIMEOUT)).await?;
        Ok(response
            .detail
            .into_iter()
            .flat_map(|detail| detail.repositories)
            .collect())
    }

    /// Downloads an attachment binary.
    pub async fn download_attachment(&self, content_url: &str) -> Result<Vec<u8>, JiraError> {
        debug!(url = content_url, "Downloading attachment");
        let response = self
            .http
            .get(content_url)
            .header("Authorization", &self.auth_header)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<T, JiraError> {
        let mut request = self
            .http
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json");
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let body = request
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str(&body).map_err(|e| JiraError::UnexpectedResponse {
            url: url.to_string(),
            source: e,
        })
    }
}
