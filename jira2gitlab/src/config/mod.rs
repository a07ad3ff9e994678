//! Configuration loading.
//!
//! The whole migration is driven by a single TOML file: endpoints and
//! credentials for both trackers, the Jira-to-GitLab project pairs, the
//! static mapping tables (users, issue types, priorities, components,
//! statuses, resolutions) and the import policy flags.

mod error;

pub use error::ConfigError;

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

/// Jira connection and field configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JiraConfig {
    /// Base URL of the Jira instance, without trailing slash.
    pub url: String,

    /// Jira account username used for all reads.
    pub user: String,

    /// Password or API token for the Jira account.
    pub password: String,

    /// How many issues to request per search page.
    #[serde(default = "default_pagination_size")]
    pub pagination_size: usize,

    /// Custom field id holding the epic link (e.g. "customfield_10103").
    pub epic_field: Option<String>,

    /// Custom field id holding story points.
    pub story_points_field: Option<String>,

    /// Custom fields to surface as a metadata table comment,
    /// field id -> human readable description.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,

    /// Fields zeroed before fingerprinting because they change without
    /// the issue itself changing.
    #[serde(default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,

    /// Bitbucket base URL, used only to pattern-match commit references.
    pub bitbucket_url: Option<String>,
}

impl JiraConfig {
    /// Returns the REST API base, e.g. `https://jira.example.com/rest/api/2`.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/rest/api/2", self.url)
    }
}

/// GitLab connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitlabConfig {
    /// Base URL of the GitLab instance, without trailing slash.
    pub url: String,

    /// Private token of an administrator account.
    pub token: String,

    /// Username of the administrator account backing the token.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    /// Whether the instance supports premium features (epics,
    /// directional issue links).
    #[serde(default)]
    pub premium: bool,

    /// Set to false for instances with self-signed certificates.
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

impl GitlabConfig {
    /// Returns the REST API base, e.g. `https://gitlab.example.com/api/v4`.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}/api/v4", self.url)
    }
}

/// Import policy flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImportOptions {
    /// Whether to migrate issue attachments.
    #[serde(default = "default_true")]
    pub migrate_attachments: bool,

    /// Whether to migrate worklogs as comments with a `/spend` quick action.
    #[serde(default = "default_true")]
    pub migrate_worklogs: bool,

    /// Whether mapped users that don't exist in GitLab yet may be created.
    #[serde(default)]
    pub migrate_users: bool,

    /// Temporary password assigned to newly created GitLab users.
    #[serde(default = "default_new_users_password")]
    pub new_users_password: String,

    /// Temporarily grant admin to impersonated users so original
    /// timestamps can be preserved. Reverted at the end of the run.
    #[serde(default)]
    pub make_users_temporarily_admins: bool,

    /// Prefix issue titles with the Jira issue key, e.g. "[PROJ-123] ".
    #[serde(default = "default_true")]
    pub add_jira_key_to_title: bool,

    /// Translate Bitbucket commit references into GitLab commit links.
    #[serde(default)]
    pub reference_bitbucket_commits: bool,

    /// Best-effort recovery of Jira tables with no `||`-marked header.
    #[serde(default)]
    pub force_repair_tables: bool,

    /// Keep original attachment filenames (diacritics stripped) instead
    /// of opaque generated names.
    #[serde(default)]
    pub keep_original_attachment_filenames: bool,

    /// Prefix applied to migrated Jira labels.
    #[serde(default)]
    pub label_prefix: String,

    /// Prefix applied to components with no mapping entry.
    #[serde(default)]
    pub component_prefix: String,

    /// Prefix applied to priorities with no mapping entry.
    #[serde(default = "default_priority_prefix")]
    pub priority_prefix: String,
}

/// Static mapping tables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Mappings {
    /// Jira project key -> GitLab `group/project` path. Groups must
    /// already exist in GitLab.
    pub projects: BTreeMap<String, String>,

    /// Bitbucket `PROJECT/repository` -> GitLab `group/project`, used
    /// to rewrite commit references.
    #[serde(default)]
    pub bitbucket_projects: BTreeMap<String, String>,

    /// Jira username -> GitLab username.
    #[serde(default)]
    pub users: BTreeMap<String, String>,

    /// Jira issue type -> GitLab label.
    #[serde(default)]
    pub issue_types: BTreeMap<String, String>,

    /// Jira component -> GitLab label.
    #[serde(default)]
    pub components: BTreeMap<String, String>,

    /// Jira priority -> GitLab label.
    #[serde(default)]
    pub priorities: BTreeMap<String, String>,

    /// Jira resolution -> GitLab label.
    #[serde(default)]
    pub resolutions: BTreeMap<String, String>,

    /// Jira status -> GitLab label.
    #[serde(default)]
    pub statuses: BTreeMap<String, String>,

    /// Jira statuses that close the corresponding GitLab issue.
    #[serde(default)]
    pub closed_statuses: BTreeSet<String>,
}

/// Fully parsed and validated migration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub jira: JiraConfig,
    pub gitlab: GitlabConfig,
    #[serde(default)]
    pub import: ImportOptions,
    pub mappings: Mappings,
}

impl Config {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or
    /// if validation fails (no project pairs, malformed GitLab paths).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::TomlError {
            path: path.display().to_string(),
            source: e,
        })?;

        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let fail = |message: String| ConfigError::ValidationError {
            path: path.display().to_string(),
            message,
        };

        if self.mappings.projects.is_empty() {
            return Err(fail("no project pairs configured".to_string()));
        }

        for (jira_project, gitlab_project) in &self.mappings.projects {
            if !gitlab_project.contains('/') {
                return Err(fail(format!(
                    "GitLab project for {jira_project} must be a 'group/project' path, got '{gitlab_project}'"
                )));
            }
        }

        if self.jira.url.ends_with('/') || self.gitlab.url.ends_with('/') {
            return Err(fail("tracker URLs must not end with a slash".to_string()));
        }

        if self.import.reference_bitbucket_commits && self.jira.bitbucket_url.is_none() {
            return Err(fail(
                "reference-bitbucket-commits requires jira.bitbucket-url".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_pagination_size() -> usize {
    100
}

fn default_volatile_fields() -> Vec<String> {
    vec!["lastViewed".to_string()]
}

fn default_admin_user() -> String {
    "root".to_string()
}

fn default_new_users_password() -> String {
    "changeMe".to_string()
}

fn default_priority_prefix() -> String {
    "P::".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            migrate_attachments: true,
            migrate_worklogs: true,
            migrate_users: false,
            new_users_password: default_new_users_password(),
            make_users_temporarily_admins: false,
            add_jira_key_to_title: true,
            reference_bitbucket_commits: false,
            force_repair_tables: false,
            keep_original_attachment_filenames: false,
            label_prefix: String::new(),
            component_prefix: String::new(),
            priority_prefix: default_priority_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_config() -> &'static str {
        r#"
[jira]
url = "https://jira.example.com"
user = "importer"
password = "secret"

[gitlab]
url = "https://gitlab.example.com"
token = "glpat-xyz"

[mappings]
projects = { P1 = "group1/project1" }
"#
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn can_load_minimal_config() {
        let file = write_config(minimal_config());
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.jira.api_base(), "https://jira.example.com/rest/api/2");
        assert_eq!(config.gitlab.api_base(), "https://gitlab.example.com/api/v4");
        assert_eq!(config.jira.pagination_size, 100);
        assert_eq!(config.gitlab.admin_user, "root");
        assert!(config.import.migrate_attachments);
        assert!(!config.import.migrate_users);
        assert_eq!(config.import.priority_prefix, "P::");
        assert!(config.gitlab.verify_ssl);
    }

    #[test]
    fn rejects_empty_projects() {
        let file = write_config(
            r#"
[jira]
url = "https://jira.example.com"
user = "importer"
password = "secret"

[gitlab]
url = "https://gitlab.example.com"
token = "glpat-xyz"

[mappings]
projects = {}
"#,
        );
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn rejects_gitlab_project_without_group() {
        let file = write_config(
            r#"
[jira]
url = "https://jira.example.com"
user = "importer"
password = "secret"

[gitlab]
url = "https://gitlab.example.com"
token = "glpat-xyz"

[mappings]
projects = { P1 = "bareproject" }
"#,
        );
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn rejects_bitbucket_commits_without_url() {
        let file = write_config(
            r#"
[jira]
url = "https://jira.example.com"
user = "importer"
password = "secret"

[gitlab]
url = "https://gitlab.example.com"
token = "glpat-xyz"

[import]
reference-bitbucket-commits = true

[mappings]
projects = { P1 = "group1/project1" }
"#,
        );
        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::load(Path::new("/nonexistent/jira2gitlab.toml"));
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
