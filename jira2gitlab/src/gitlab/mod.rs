//! GitLab REST client (write collaborator).
//!
//! Covers exactly the surface the engine needs: namespace/user enumeration,
//! project and milestone lookup-or-create, issue and epic lifecycle,
//! notes, links, uploads and user administration. Impersonation is done
//! through the `Sudo` header, which requires the token to belong to an
//! administrator.

mod models;

pub use models::{
    CreatedItem, GitlabGroup, GitlabMilestone, GitlabNamespace, GitlabUpload, GitlabUser, ItemRef,
    NewIssue,
};

use crate::config::GitlabConfig;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the GitLab collaborator.
#[derive(Debug, Error)]
pub enum GitlabError {
    /// Transport or HTTP status error.
    #[error("GitLab API error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape.
    #[error("Unexpected GitLab response from {url}: {source}")]
    UnexpectedResponse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Authenticated GitLab client.
pub struct GitlabClient {
    http: reqwest::Client,
    url: String,
    api_base: String,
    token: String,
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: u64,
    iid: u64,
    project_id: Option<u64>,
    group_id: Option<u64>,
    references: Option<CreatedReferences>,
}

#[derive(Deserialize)]
struct CreatedReferences {
    full: String,
}

impl CreatedResponse {
    fn into_item(self) -> CreatedItem {
        CreatedItem {
            id: self.id,
            container_id: self.project_id.or(self.group_id).unwrap_or_default(),
            iid: self.iid,
            full_ref: self
                .references
                .map_or_else(|| format!("#{}", self.iid), |r| r.full),
        }
    }
}

impl GitlabClient {
    /// Builds a client from the GitLab configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GitlabError`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &GitlabConfig) -> Result<Self, GitlabError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
            api_base: config.api_base(),
            token: config.token.clone(),
        })
    }

    /// Base URL of the instance, used to build absolute upload links.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.url
    }

    /// Enumerates all namespaces, keyed by full path.
    pub async fn list_namespaces(&self) -> Result<BTreeMap<String, u64>, GitlabError> {
        let namespaces: Vec<GitlabNamespace> = self.get_paginated("namespaces").await?;
        Ok(namespaces
            .into_iter()
            .map(|n| (n.full_path, n.id))
            .collect())
    }

    /// Enumerates all users, keyed by username.
    pub async fn list_users(&self) -> Result<BTreeMap<String, GitlabUser>, GitlabError> {
        let users: Vec<GitlabUser> = self.get_paginated("users").await?;
        Ok(users.into_iter().map(|u| (u.username.clone(), u)).collect())
    }

    /// Finds a group id by its full path.
    pub async fn find_group(&self, full_path: &str) -> Result<Option<u64>, GitlabError> {
        let url = format!(
            "{}/groups?search={}",
            self.api_base,
            urlencoding::encode(full_path)
        );
        let groups: Vec<GitlabGroup> = self.get_json(&url).await?;
        Ok(groups
            .into_iter()
            .find(|g| g.full_path == full_path)
            .map(|g| g.id))
    }

    /// Looks up a project id by `group/project` path.
    pub async fn find_project(&self, path: &str) -> Result<Option<u64>, GitlabError> {
        let url = format!(
            "{}/projects/{}",
            self.api_base,
            urlencoding::encode(path)
        );
        let response = self.request(self.http.get(&url), None).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.error_for_status()?.text().await?;
        let value: serde_json::Value = parse(&url, &body)?;
        Ok(value.get("id").and_then(serde_json::Value::as_u64))
    }

    /// Creates a project under an existing namespace, with internal
    /// visibility.
    pub async fn create_project(
        &self,
        name: &str,
        namespace_id: u64,
    ) -> Result<u64, GitlabError> {
        info!(project = name, namespace_id, "Creating GitLab project");
        let url = format!("{}/projects", self.api_base);
        let body = json!({
            "path": name,
            "namespace_id": namespace_id,
            "visibility": "internal",
        });
        let value: serde_json::Value = self.post_json(&url, &body, None).await?;
        Ok(value
            .get("id")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or_default())
    }

    /// Lists the milestones of a project.
    pub async fn list_milestones(
        &self,
        project_id: u64,
    ) -> Result<Vec<GitlabMilestone>, GitlabError> {
        let url = format!("{}/projects/{project_id}/milestones", self.api_base);
        self.get_json(&url).await
    }

    /// Searches project milestones by exact title.
    pub async fn search_milestone(
        &self,
        project_id: u64,
        title: &str,
    ) -> Result<Option<GitlabMilestone>, GitlabError> {
        let url = format!(
            "{}/projects/{project_id}/milestones?title={}",
            self.api_base,
            urlencoding::encode(title)
        );
        let milestones: Vec<GitlabMilestone> = self.get_json(&url).await?;
        Ok(milestones.into_iter().next())
    }

    /// Creates a project milestone.
    pub async fn create_milestone(
        &self,
        project_id: u64,
        title: &str,
    ) -> Result<GitlabMilestone, GitlabError> {
        let url = format!("{}/projects/{project_id}/milestones", self.api_base);
        self.post_json(&url, &json!({ "title": title }), None).await
    }

    /// Creates an issue, optionally impersonating the given username.
    pub async fn create_issue(
        &self,
        project_id: u64,
        issue: &NewIssue,
        sudo: Option<&str>,
    ) -> Result<CreatedItem, GitlabError> {
        let url = format!("{}/projects/{project_id}/issues", self.api_base);
        let response: CreatedResponse = self.post_json(&url, issue, sudo).await?;
        Ok(response.into_item())
    }

    /// Creates a group-level epic (premium tier only).
    pub async fn create_epic(
        &self,
        group_id: u64,
        issue: &NewIssue,
        sudo: Option<&str>,
    ) -> Result<CreatedItem, GitlabError> {
        let url = format!("{}/groups/{group_id}/epics", self.api_base);
        let response: CreatedResponse = self.post_json(&url, issue, sudo).await?;
        Ok(response.into_item())
    }

    /// Deletes an issue or epic.
    pub async fn delete_item(&self, item: ItemRef) -> Result<(), GitlabError> {
        debug!(item = %item.path(), "Deleting GitLab item");
        let url = format!("{}/{}", self.api_base, item.path());
        self.request(self.http.delete(&url), None)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Closes an issue or epic, optionally back-dating the update.
    pub async fn close_item(
        &self,
        item: ItemRef,
        updated_at: Option<&str>,
    ) -> Result<(), GitlabError> {
        let url = format!("{}/{}", self.api_base, item.path());
        let mut body = json!({ "state_event": "close" });
        if let Some(updated_at) = updated_at {
            body["updated_at"] = json!(updated_at);
        }
        self.request(self.http.put(&url), None)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Adds a comment to an issue or epic, optionally back-dated and
    /// impersonated.
    pub async fn create_note(
        &self,
        item: ItemRef,
        body: &str,
        created_at: Option<&str>,
        sudo: Option<&str>,
    ) -> Result<(), GitlabError> {
        let url = format!("{}/{}/notes", self.api_base, item.path());
        let mut payload = json!({ "body": body });
        if let Some(created_at) = created_at {
            payload["created_at"] = json!(created_at);
        }
        let _: serde_json::Value = self.post_json(&url, &payload, sudo).await?;
        Ok(())
    }

    /// Creates a typed link between two issues.
    pub async fn create_issue_link(
        &self,
        from: ItemRef,
        target_project_id: u64,
        target_issue_iid: u64,
        link_type: &str,
    ) -> Result<(), GitlabError> {
        let url = format!("{}/{}/links", self.api_base, from.path());
        let body = json!({
            "target_project_id": target_project_id,
            "target_issue_iid": target_issue_iid,
            "link_type": link_type,
        });
        let _: serde_json::Value = self.post_json(&url, &body, None).await?;
        Ok(())
    }

    /// Uploads a file to a project, impersonating the given username.
    /// Returns the markup-ready path of the upload.
    pub async fn upload_file(
        &self,
        project_id: u64,
        filename: &str,
        bytes: Vec<u8>,
        sudo: Option<&str>,
    ) -> Result<GitlabUpload, GitlabError> {
        let url = format!("{}/projects/{project_id}/uploads", self.api_base);
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let body = self
            .request(self.http.post(&url), sudo)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse(&url, &body)
    }

    /// Creates a user with a placeholder password.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        name: &str,
        password: &str,
        admin: bool,
    ) -> Result<GitlabUser, GitlabError> {
        info!(username, "Creating GitLab user");
        let url = format!("{}/users", self.api_base);
        let body = json!({
            "admin": admin,
            "email": email,
            "username": username,
            "name": name,
            "password": password,
        });
        self.post_json(&url, &body, None).await
    }

    /// Grants or revokes the admin flag of a user.
    pub async fn set_user_admin(
        &self,
        user_id: u64,
        admin: bool,
    ) -> Result<GitlabUser, GitlabError> {
        let url = format!("{}/users/{user_id}", self.api_base);
        let body = self
            .request(self.http.put(&url), None)
            .json(&json!({ "admin": admin }))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse(&url, &body)
    }

    /// Assigns an existing issue to an epic (premium tier only).
    pub async fn assign_issue_to_epic(
        &self,
        group_id: u64,
        epic_iid: u64,
        issue_id: u64,
        sudo: Option<&str>,
    ) -> Result<(), GitlabError> {
        let url = format!(
            "{}/groups/{group_id}/epics/{epic_iid}/issues/{issue_id}",
            self.api_base
        );
        self.request(self.http.post(&url), sudo)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
        sudo: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let builder = builder.header("PRIVATE-TOKEN", &self.token);
        match sudo {
            Some(username) => builder.header("Sudo", username),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, GitlabError> {
        let body = self
            .request(self.http.get(url), None)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse(url, &body)
    }

    async fn post_json<T: serde::de::DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        sudo: Option<&str>,
    ) -> Result<T, GitlabError> {
        let response_body = self
            .request(self.http.post(url), sudo)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse(url, &response_body)
    }

    /// Pages through a collection endpoint using GitLab's `x-page` /
    /// `x-total-pages` / `x-next-page` response headers.
    async fn get_paginated<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, GitlabError> {
        let mut items = Vec::new();
        let mut page: u64 = 1;

        loop {
            let url = format!("{}/{path}?page={page}&per_page=100", self.api_base);
            let response = self
                .request(self.http.get(&url), None)
                .send()
                .await?
                .error_for_status()?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            let body = response.text().await?;
            let batch: Vec<T> = parse(&url, &body)?;
            items.extend(batch);

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(items)
    }
}

fn parse<T: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<T, GitlabError> {
    serde_json::from_str(body).map_err(|e| GitlabError::UnexpectedResponse {
        url: url.to_string(),
        source: e,
    })
}
