//! The migration engine.
//!
//! Drives one run: enumerate GitLab users and namespaces, then walk the
//! configured project pairs issue by issue, and finally resolve the
//! accumulated cross-issue links. Each issue is one transaction (skip,
//! import or re-import) and the persistent state is rewritten after
//! every transaction, so the run can be interrupted and resumed at any
//! point. Cleanup (admin revocation, final state write) happens
//! unconditionally, whatever the run outcome was.

mod issue;
mod links;

use crate::config::Config;
use crate::gitlab::{GitlabClient, GitlabError, GitlabMilestone};
use crate::identity::{IdentityError, IdentityResolver};
use crate::jira::{JiraClient, JiraError};
use crate::markup::MarkupTranslator;
use crate::state::{ImportState, StateError};
use crate::summary::{IssueOutcome, RunSummary};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that abort the whole run. Anything item-scoped is handled
/// inside the issue transaction and never reaches this type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Jira(#[from] JiraError),

    #[error(transparent)]
    Gitlab(#[from] GitlabError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    State(#[from] StateError),

    /// A required remote object (group, namespace) does not exist.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },
}

/// Errors that fail a single issue transaction. The engine logs them,
/// rolls the item back and moves on to the next issue.
#[derive(Debug, Error)]
pub(crate) enum ItemError {
    #[error(transparent)]
    Jira(#[from] JiraError),

    #[error(transparent)]
    Gitlab(#[from] GitlabError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Result of a full run: the summary is always produced, even when the
/// run was aborted by a fatal error.
pub struct RunOutcome {
    pub summary: RunSummary,
    pub error: Option<EngineError>,
}

/// Per-project working set, rebuilt for every project pair.
pub(crate) struct ProjectContext {
    pub jira_project: String,
    pub project_id: u64,
    /// Group id of the target project; `Some` only on premium tier.
    pub group_id: Option<u64>,
    pub milestones: Vec<GitlabMilestone>,
    /// Jira epic key -> GitLab epic iid, for this project's epics.
    pub epic_map: BTreeMap<String, u64>,
}

pub struct MigrationEngine {
    config: Config,
    jira: JiraClient,
    gitlab: GitlabClient,
    identity: IdentityResolver,
    translator: MarkupTranslator,
    state: ImportState,
    state_path: PathBuf,
    summary: RunSummary,
    cancel: Arc<AtomicBool>,
    namespaces: BTreeMap<String, u64>,
    /// Matches commit URLs of the configured Bitbucket instance,
    /// capturing project and repository.
    commit_pattern: Option<Regex>,
}

impl MigrationEngine {
    /// Builds the engine: connects both clients, enumerates GitLab
    /// users and namespaces, and loads the previous migration state.
    ///
    /// # Errors
    ///
    /// Fails when a client cannot be built, the initial enumerations
    /// fail, or the configured admin account does not exist.
    pub async fn new(
        config: Config,
        state_path: PathBuf,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, EngineError> {
        let jira = JiraClient::new(&config.jira, config.gitlab.verify_ssl)?;
        let gitlab = GitlabClient::new(&config.gitlab)?;

        let users = gitlab.list_users().await?;
        let namespaces = gitlab.list_namespaces().await?;
        info!(
            users = users.len(),
            namespaces = namespaces.len(),
            "Connected to GitLab"
        );

        let identity = IdentityResolver::new(&config, users)?;
        let translator =
            MarkupTranslator::new(config.jira.url.clone(), config.import.force_repair_tables);
        let state = ImportState::load(&state_path);

        let commit_pattern = match (
            config.import.reference_bitbucket_commits,
            config.jira.bitbucket_url.as_deref(),
        ) {
            (true, Some(bitbucket_url)) => {
                let pattern = format!(
                    r"^{}/projects/([^/]+)/repos/([^/]+)/commits/\w+$",
                    regex::escape(bitbucket_url)
                );
                Some(Regex::new(&pattern).map_err(|e| EngineError::Precondition {
                    message: format!("invalid Bitbucket URL pattern: {e}"),
                })?)
            }
            _ => None,
        };

        Ok(Self {
            config,
            jira,
            gitlab,
            identity,
            translator,
            state,
            state_path,
            summary: RunSummary::default(),
            cancel,
            namespaces,
            commit_pattern,
        })
    }

    /// Runs the full migration and consumes the engine.
    ///
    /// Cleanup always runs: temporary admin privileges are reverted and
    /// the state file is written even when the run failed or was
    /// interrupted.
    pub async fn run(mut self) -> RunOutcome {
        let error = self.run_inner().await.err();
        self.finish().await;
        RunOutcome {
            summary: self.summary,
            error,
        }
    }

    async fn run_inner(&mut self) -> Result<(), EngineError> {
        let project_pairs: Vec<(String, String)> =
            self.config.mappings.projects.clone().into_iter().collect();

        for (jira_project, gitlab_path) in project_pairs {
            if self.cancelled() {
                return Ok(());
            }
            self.migrate_project(&jira_project, &gitlab_path).await?;
            self.summary.projects_processed += 1;
        }

        if self.cancelled() {
            return Ok(());
        }
        self.resolve_pending_links().await;
        Ok(())
    }

    async fn migrate_project(
        &mut self,
        jira_project: &str,
        gitlab_path: &str,
    ) -> Result<(), EngineError> {
        info!(jira_project, gitlab_path, "Migrating project");

        // Validation guarantees a group/project shape.
        let (group_path, project_name) =
            gitlab_path.rsplit_once('/').unwrap_or(("", gitlab_path));

        let group_id = if self.config.gitlab.premium {
            match self.gitlab.find_group(group_path).await? {
                Some(id) => Some(id),
                None => {
                    return Err(EngineError::Precondition {
                        message: format!("GitLab group '{group_path}' not found"),
                    })
                }
            }
        } else {
            None
        };

        let project_id = match self.gitlab.find_project(gitlab_path).await? {
            Some(id) => id,
            None => {
                let Some(&namespace_id) = self.namespaces.get(group_path) else {
                    return Err(EngineError::Precondition {
                        message: format!("GitLab namespace '{group_path}' does not exist"),
                    });
                };
                self.gitlab.create_project(project_name, namespace_id).await?
            }
        };

        let milestones = self.gitlab.list_milestones(project_id).await?;
        let mut issues = self.jira.fetch_project_issues(jira_project).await?;

        // Epics first, so member issues find their epic already
        // imported. The sort is stable, so key order is kept within
        // each half.
        if self.config.gitlab.premium {
            issues.sort_by_key(|issue| !issue.is_epic());
        }

        let mut ctx = ProjectContext {
            jira_project: jira_project.to_string(),
            project_id,
            group_id,
            milestones,
            epic_map: BTreeMap::new(),
        };

        for issue in &issues {
            if self.cancelled() {
                return Ok(());
            }

            let outcome = match self.migrate_issue(&mut ctx, issue).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        issue = %issue.key,
                        error = %e,
                        "Issue migration failed, continuing with next issue"
                    );
                    IssueOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            // Harvested links and the new mapping must survive a
            // crash. A skipped issue leaves the state untouched, so
            // only the other outcomes go to disk.
            if !matches!(outcome, IssueOutcome::Skipped) {
                self.state.save(&self.state_path)?;
            }
            self.summary.record_issue(&outcome);
        }

        Ok(())
    }

    /// Unconditional end-of-run cleanup.
    async fn finish(&mut self) {
        self.identity
            .revoke_all(&self.gitlab, &mut self.state.elevated_users)
            .await;

        self.summary.unreverted_admins =
            self.state.elevated_users.iter().cloned().collect();
        self.summary.unmapped_users = self.identity.unmapped.clone();
        self.summary.unmigrated_users = self.identity.unmigrated.clone();

        if let Err(e) = self.state.save(&self.state_path) {
            warn!(error = %e, "Could not write final state file");
        }
    }

    fn cancelled(&mut self) -> bool {
        if self.cancel.load(Ordering::Relaxed) {
            warn!("Interrupt requested, stopping after current issue");
            self.summary.interrupted = true;
            return true;
        }
        false
    }
}
