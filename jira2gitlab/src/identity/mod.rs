//! Identity resolution and the impersonation ledger.
//!
//! Every authored action (issue, comment, worklog) is performed under
//! the GitLab account matching the original Jira author. Accounts that
//! cannot be resolved fall back to the administrator, and that fallback
//! is counted for the end-of-run report. When the policy allows it,
//! resolved accounts are temporarily elevated to admin so GitLab
//! accepts the original timestamps; every elevation is recorded in the
//! persistent ledger so it can be reverted even after a crash.

use crate::config::Config;
use crate::gitlab::{GitlabClient, GitlabError, GitlabUser};
use crate::jira::{JiraClient, JiraError};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{info, warn};

/// The Jira system account; its actions are attributed to the GitLab
/// administrator directly.
const JIRA_SYSTEM_USER: &str = "jira";

/// Errors that can occur while resolving an identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// GitLab call failed (elevation, provisioning).
    #[error(transparent)]
    Gitlab(#[from] GitlabError),

    /// Jira user lookup failed during provisioning.
    #[error(transparent)]
    Jira(#[from] JiraError),

    /// The configured administrator account does not exist in GitLab.
    #[error("GitLab admin user '{username}' not found")]
    MissingAdmin { username: String },
}

/// Resolves Jira usernames to GitLab accounts, owning the user cache
/// and the miss counters for one run.
pub struct IdentityResolver {
    admin_user: String,
    user_map: BTreeMap<String, String>,
    users: BTreeMap<String, GitlabUser>,
    migrate_users: bool,
    make_admins: bool,
    new_users_password: String,

    /// Jira usernames with no mapping entry, with occurrence counts.
    pub unmapped: BTreeMap<String, u64>,

    /// Mapped GitLab usernames that do not exist and could not be
    /// provisioned, with occurrence counts.
    pub unmigrated: BTreeMap<String, u64>,
}

impl IdentityResolver {
    /// Creates a resolver over the pre-enumerated GitLab user set.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MissingAdmin`] when the configured
    /// administrator is not among the enumerated users.
    pub fn new(
        config: &Config,
        users: BTreeMap<String, GitlabUser>,
    ) -> Result<Self, IdentityError> {
        if !users.contains_key(&config.gitlab.admin_user) {
            return Err(IdentityError::MissingAdmin {
                username: config.gitlab.admin_user.clone(),
            });
        }

        Ok(Self {
            admin_user: config.gitlab.admin_user.clone(),
            user_map: config.mappings.users.clone(),
            users,
            migrate_users: config.import.migrate_users,
            make_admins: config.import.make_users_temporarily_admins,
            new_users_password: config.import.new_users_password.clone(),
            unmapped: BTreeMap::new(),
            unmigrated: BTreeMap::new(),
        })
    }

    /// The administrator account. Guaranteed present by construction.
    #[must_use]
    pub fn admin(&self) -> &GitlabUser {
        &self.users[&self.admin_user]
    }

    /// Username of the administrator account.
    #[must_use]
    pub fn admin_username(&self) -> &str {
        &self.admin_user
    }

    /// Resolves a Jira username to a GitLab account, falling back to
    /// the administrator for unmapped or unmigrated identities.
    ///
    /// With the elevation policy enabled, resolved non-admin accounts
    /// are granted admin and recorded in `ledger` before being
    /// returned; the administrator itself is never elevated.
    pub async fn resolve(
        &mut self,
        gitlab: &GitlabClient,
        jira: &JiraClient,
        ledger: &mut BTreeSet<String>,
        jira_username: &str,
    ) -> Result<GitlabUser, IdentityError> {
        if jira_username == JIRA_SYSTEM_USER {
            return Ok(self.admin().clone());
        }

        let Some(gl_username) = self.user_map.get(jira_username).cloned() else {
            *self.unmapped.entry(jira_username.to_string()).or_insert(0) += 1;
            return Ok(self.admin().clone());
        };

        if self.users.contains_key(&gl_username) {
            if self.make_admins && !self.users[&gl_username].is_admin {
                self.elevate(gitlab, ledger, &gl_username).await?;
            }
            return Ok(self.users[&gl_username].clone());
        }

        if self.migrate_users {
            return self
                .provision(gitlab, jira, ledger, jira_username, &gl_username)
                .await;
        }

        *self.unmigrated.entry(gl_username).or_insert(0) += 1;
        Ok(self.admin().clone())
    }

    /// Grants admin to an existing account and records the elevation.
    async fn elevate(
        &mut self,
        gitlab: &GitlabClient,
        ledger: &mut BTreeSet<String>,
        gl_username: &str,
    ) -> Result<(), IdentityError> {
        // The administrator's own privilege is never touched.
        if gl_username == self.admin_user {
            return Ok(());
        }

        let user_id = self.users[gl_username].id;
        let updated = gitlab.set_user_admin(user_id, true).await?;
        info!(username = gl_username, "Temporarily elevated user to admin");
        ledger.insert(updated.username.clone());
        self.users.insert(updated.username.clone(), updated);
        Ok(())
    }

    /// Creates the mapped GitLab account from its Jira counterpart,
    /// applying the elevation policy to the new account as well.
    async fn provision(
        &mut self,
        gitlab: &GitlabClient,
        jira: &JiraClient,
        ledger: &mut BTreeSet<String>,
        jira_username: &str,
        gl_username: &str,
    ) -> Result<GitlabUser, IdentityError> {
        info!(jira_user = jira_username, gitlab_user = gl_username, "Provisioning user");

        let jira_user = jira.fetch_user(jira_username).await?;
        let created = gitlab
            .create_user(
                gl_username,
                &jira_user.email_address,
                &jira_user.display_name,
                &self.new_users_password,
                self.make_admins,
            )
            .await?;

        if self.make_admins {
            ledger.insert(created.username.clone());
        }
        self.users.insert(created.username.clone(), created.clone());
        Ok(created)
    }

    /// Reverts every ledger entry. Entries that fail to revert stay in
    /// the ledger and are surfaced to the caller; they are never
    /// silently dropped.
    pub async fn revoke_all(&mut self, gitlab: &GitlabClient, ledger: &mut BTreeSet<String>) {
        for username in ledger.clone() {
            // Never demote the administrator, whatever the ledger says.
            if username == self.admin_user {
                ledger.remove(&username);
                continue;
            }

            let Some(user) = self.users.get(&username) else {
                warn!(username, "Elevated user not found in GitLab, leaving in ledger");
                continue;
            };

            match gitlab.set_user_admin(user.id, false).await {
                Ok(updated) => {
                    info!(username, "Reverted temporary admin privilege");
                    ledger.remove(&username);
                    self.users.insert(updated.username.clone(), updated);
                }
                Err(e) => {
                    warn!(username, error = %e, "Could not revert admin privilege");
                }
            }
        }
    }
}
