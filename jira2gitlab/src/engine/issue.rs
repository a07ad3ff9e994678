//! The per-issue transaction.
//!
//! One issue goes through: fingerprint check (skip or delete-and-redo),
//! link harvesting, field derivation, attachment relocation, creation,
//! then enrichment (epic assignment, comments, metadata, worklogs,
//! commit references, closing). The mapping record is written right
//! after creation; if any enrichment step fails the created item is
//! deleted again and the record removed, so a half-enriched issue never
//! survives into the next run.

use super::{ItemError, MigrationEngine, ProjectContext};
use crate::attachments::{relocate_attachments, FilenamePolicy};
use crate::fingerprint::issue_fingerprint;
use crate::gitlab::{CreatedItem, GitlabUser, ItemRef, NewIssue};
use crate::jira::JiraIssue;
use crate::markup::Replacement;
use crate::state::{ImportState, IssueRecord, PendingLink};
use crate::summary::IssueOutcome;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// GitLab's hard limit on issue titles.
const MAX_TITLE_CHARS: usize = 255;

impl MigrationEngine {
    pub(crate) async fn migrate_issue(
        &mut self,
        ctx: &mut ProjectContext,
        issue: &JiraIssue,
    ) -> Result<IssueOutcome, ItemError> {
        let fingerprint = issue_fingerprint(&issue.raw, &self.config.jira.volatile_fields);
        let is_epic_item = issue.is_epic() && ctx.group_id.is_some();

        let mut recreated = false;
        match import_decision(self.state.issue_mapping.get(&issue.key), &fingerprint) {
            ImportDecision::Skip => {
                debug!(issue = %issue.key, "Unchanged since last import, skipping");
                if is_epic_item {
                    if let Some(record) = self.state.issue_mapping.get(&issue.key) {
                        ctx.epic_map.insert(issue.key.clone(), record.iid);
                    }
                }
                return Ok(IssueOutcome::Skipped);
            }
            ImportDecision::Recreate => {
                info!(issue = %issue.key, "Changed since last import, re-importing");
                if let Some(record) = self.state.issue_mapping.remove(&issue.key) {
                    let old_item = if is_epic_item {
                        ItemRef::Epic {
                            group_id: record.project_id,
                            iid: record.iid,
                        }
                    } else {
                        ItemRef::Issue {
                            project_id: record.project_id,
                            iid: record.iid,
                        }
                    };
                    if let Err(e) = self.gitlab.delete_item(old_item).await {
                        warn!(issue = %issue.key, error = %e, "Could not delete outdated item");
                    }
                }
                recreated = true;
            }
            ImportDecision::Import => {}
        }

        // Links are harvested only for issues actually being
        // (re)imported; a skipped issue's triples were already handled
        // by the run that imported it. The set persists independently
        // of the transaction outcome below, because the endpoints may
        // only exist after later issues or later runs.
        harvest_pending_links(issue, &mut self.state.pending_links);

        let reporter = issue
            .fields
            .reporter
            .as_ref()
            .and_then(|r| r.name.clone())
            .unwrap_or_else(|| "jira".to_string());
        let gl_reporter = self
            .identity
            .resolve(
                &self.gitlab,
                &self.jira,
                &mut self.state.elevated_users,
                &reporter,
            )
            .await?;

        let assignee_ids = match issue.fields.assignee.as_ref().and_then(|a| a.name.clone()) {
            Some(assignee) => {
                let gl_assignee = self
                    .identity
                    .resolve(
                        &self.gitlab,
                        &self.jira,
                        &mut self.state.elevated_users,
                        &assignee,
                    )
                    .await?;
                Some(vec![gl_assignee.id])
            }
            None => None,
        };

        let labels = self.derive_labels(ctx, issue).await;
        let weight = self.derive_weight(issue);

        // Last fix version wins, like the milestone field itself is
        // single-valued on the GitLab side.
        let mut milestone_id = None;
        for version in &issue.fields.fix_versions {
            milestone_id = Some(self.resolve_milestone(ctx, &version.name).await?);
        }

        let replacements = if self.config.import.migrate_attachments
            && !issue.fields.attachment.is_empty()
        {
            let policy = if self.config.import.keep_original_attachment_filenames {
                FilenamePolicy::Original
            } else {
                FilenamePolicy::Opaque
            };
            relocate_attachments(
                &self.jira,
                &self.gitlab,
                &mut self.identity,
                &mut self.state.elevated_users,
                &issue.fields.attachment,
                ctx.project_id,
                policy,
            )
            .await?
        } else {
            Vec::new()
        };

        let mut description = self.translator.translate(
            &ctx.jira_project,
            issue.fields.description.as_deref(),
            &replacements,
        );
        description.push_str(&format!(
            "\n\n___\n\n**Imported from Jira issue [{key}]({url}/browse/{key})**\n\n",
            key = issue.key,
            url = self.config.jira.url,
        ));
        if gl_reporter.username == self.identity.admin_username() && reporter != "jira" {
            description.push_str(&format!(
                "**Original creator of the issue: Jira user {reporter}**\n\n"
            ));
        }
        // Attachments never referenced in the text still need to be
        // reachable from the issue.
        for replacement in &replacements {
            if !description.contains(&replacement.markup) {
                description.push_str(&format!(
                    "Attachment imported from Jira issue [{key}]({url}/browse/{key}): {markup}\n\n",
                    key = issue.key,
                    url = self.config.jira.url,
                    markup = replacement.markup,
                ));
            }
        }

        let summary = issue.fields.summary.as_deref().unwrap_or("");
        let mut title = if self.config.import.add_jira_key_to_title {
            format!("[{}] {}", issue.key, summary)
        } else {
            summary.to_string()
        };
        if title.chars().count() > MAX_TITLE_CHARS {
            description = format!("Full original title:\n\n{title}\n\n{description}");
            title = title
                .chars()
                .take(MAX_TITLE_CHARS - 3)
                .chain("...".chars())
                .collect();
        }

        let new_issue = NewIssue {
            created_at: issue.fields.created.clone(),
            assignee_ids,
            title,
            description,
            milestone_id,
            labels: labels.join(", "),
            weight,
        };

        let sudo = Some(gl_reporter.username.as_str());
        let created = match ctx.group_id.filter(|_| issue.is_epic()) {
            Some(group_id) => self.gitlab.create_epic(group_id, &new_issue, sudo).await?,
            None => {
                self.gitlab
                    .create_issue(ctx.project_id, &new_issue, sudo)
                    .await?
            }
        };
        info!(issue = %issue.key, gitlab_ref = %created.full_ref, "Created GitLab item");

        // Commit point: from here the item exists and is recorded; a
        // failure below rolls both back together.
        self.state.issue_mapping.insert(
            issue.key.clone(),
            IssueRecord {
                id: created.id,
                project_id: created.container_id,
                iid: created.iid,
                full_ref: created.full_ref.clone(),
                fingerprint,
            },
        );
        if is_epic_item {
            ctx.epic_map.insert(issue.key.clone(), created.iid);
        }

        if let Err(e) = self
            .enrich_issue(ctx, issue, &created, &gl_reporter, &replacements)
            .await
        {
            warn!(issue = %issue.key, error = %e, "Enrichment failed, rolling back created item");
            let item = if is_epic_item {
                ItemRef::Epic {
                    group_id: created.container_id,
                    iid: created.iid,
                }
            } else {
                ItemRef::Issue {
                    project_id: created.container_id,
                    iid: created.iid,
                }
            };
            if let Err(delete_error) = self.gitlab.delete_item(item).await {
                warn!(
                    issue = %issue.key,
                    error = %delete_error,
                    "Rollback delete failed, item may be left behind"
                );
            }
            rollback_import(&mut self.state, &mut ctx.epic_map, &issue.key);
            return Err(e);
        }

        Ok(if recreated {
            IssueOutcome::Recreated
        } else {
            IssueOutcome::Imported
        })
    }

    /// Everything that happens to an item after it exists: epic
    /// assignment, comments, metadata, worklogs, commit references and
    /// closing.
    async fn enrich_issue(
        &mut self,
        ctx: &ProjectContext,
        issue: &JiraIssue,
        created: &CreatedItem,
        gl_reporter: &GitlabUser,
        replacements: &[Replacement],
    ) -> Result<(), ItemError> {
        let is_epic_item = issue.is_epic() && ctx.group_id.is_some();
        let item = if is_epic_item {
            ItemRef::Epic {
                group_id: created.container_id,
                iid: created.iid,
            }
        } else {
            ItemRef::Issue {
                project_id: created.container_id,
                iid: created.iid,
            }
        };

        if let Some(group_id) = ctx.group_id {
            if !issue.is_epic() {
                if let Some(epic_key) = issue.epic_key(self.config.jira.epic_field.as_deref()) {
                    match ctx.epic_map.get(epic_key) {
                        Some(&epic_iid) => {
                            self.gitlab
                                .assign_issue_to_epic(
                                    group_id,
                                    epic_iid,
                                    created.id,
                                    Some(gl_reporter.username.as_str()),
                                )
                                .await?;
                        }
                        None => warn!(
                            issue = %issue.key,
                            epic = epic_key,
                            "Epic not imported with this project, skipping epic assignment"
                        ),
                    }
                }
            }
        }

        if let Some(comments) = &issue.fields.comment {
            for comment in &comments.comments {
                let author = comment
                    .author
                    .as_ref()
                    .and_then(|a| a.name.as_deref())
                    .unwrap_or("jira");
                let gl_author = self
                    .identity
                    .resolve(
                        &self.gitlab,
                        &self.jira,
                        &mut self.state.elevated_users,
                        author,
                    )
                    .await?;

                let mut body = String::new();
                if gl_author.username == self.identity.admin_username() && author != "jira" {
                    body.push_str(&format!("**Original comment by Jira user {author}:**\n\n"));
                }
                body.push_str(&self.translator.translate(
                    &ctx.jira_project,
                    comment.body.as_deref(),
                    replacements,
                ));

                self.gitlab
                    .create_note(
                        item,
                        &body,
                        comment.created.as_deref(),
                        Some(gl_author.username.as_str()),
                    )
                    .await?;
            }
        }

        self.add_metadata_note(issue, item).await?;

        if self.config.import.migrate_worklogs {
            if let Some(worklogs) = &issue.fields.worklog {
                for worklog in &worklogs.worklogs {
                    let author = worklog
                        .author
                        .as_ref()
                        .and_then(|a| a.name.as_deref())
                        .unwrap_or("jira");
                    let gl_author = self
                        .identity
                        .resolve(
                            &self.gitlab,
                            &self.jira,
                            &mut self.state.elevated_users,
                            author,
                        )
                        .await?;

                    let mut body =
                        if gl_author.username == self.identity.admin_username() && author != "jira" {
                            format!(
                                "[ Worklog {} (Original worklog by Jira user {author}) ]\n\n",
                                worklog.time_spent
                            )
                        } else {
                            format!("[ Worklog {} ]\n\n", worklog.time_spent)
                        };
                    body.push_str(&self.translator.translate(
                        &ctx.jira_project,
                        worklog.comment.as_deref(),
                        replacements,
                    ));
                    // The quick action books the time onto the issue's
                    // time tracking, dated on the original day.
                    match worklog.started.as_deref().and_then(|s| s.get(..10)) {
                        Some(date) => {
                            body.push_str(&format!("\n/spend {} {date}", worklog.time_spent));
                        }
                        None => body.push_str(&format!("\n/spend {}", worklog.time_spent)),
                    }

                    self.gitlab
                        .create_note(
                            item,
                            &body,
                            worklog.started.as_deref(),
                            Some(gl_author.username.as_str()),
                        )
                        .await?;
                }
            }
        }

        self.add_commit_references(issue, item).await?;

        let done = issue.fields.status.as_ref().is_some_and(|status| {
            status
                .status_category
                .as_ref()
                .is_some_and(|category| category.key == "done")
                || self.config.mappings.closed_statuses.contains(&status.name)
        });
        if done {
            self.gitlab
                .close_item(item, issue.fields.resolutiondate.as_deref())
                .await?;
        }

        Ok(())
    }

    /// Surfaces configured custom fields as one table-formatted note.
    async fn add_metadata_note(
        &mut self,
        issue: &JiraIssue,
        item: ItemRef,
    ) -> Result<(), ItemError> {
        let mut rows = Vec::new();
        for (field, description) in &self.config.jira.custom_fields {
            if let Some(value) = issue.custom_field(field) {
                let text = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                rows.push(format!("| {description} | {} |", text.replace('\n', "<br>")));
            }
        }
        if rows.is_empty() {
            return Ok(());
        }

        let body = format!(
            "| Additional metadata | Content |\n| --- | --- |\n{}",
            rows.join("\n")
        );
        self.gitlab.create_note(item, &body, None, None).await?;
        Ok(())
    }

    /// Turns Bitbucket commit references from the dev-status endpoint
    /// into notes linking the migrated GitLab repositories.
    async fn add_commit_references(
        &mut self,
        issue: &JiraIssue,
        item: ItemRef,
    ) -> Result<(), ItemError> {
        let Some(pattern) = self.commit_pattern.clone() else {
            return Ok(());
        };

        let repositories = self.jira.fetch_commit_references(&issue.id).await?;
        for repository in repositories {
            for commit in repository.commits {
                let Some(captures) = pattern.captures(&commit.url) else {
                    warn!(
                        issue = %issue.key,
                        url = %commit.url,
                        "Commit reference outside the configured Bitbucket instance"
                    );
                    continue;
                };
                let bitbucket_ref = format!("{}/{}", &captures[1], &captures[2]);

                let reference = match self
                    .config
                    .mappings
                    .bitbucket_projects
                    .get(&bitbucket_ref)
                {
                    Some(gitlab_path) => format!(
                        "[{} in {bitbucket_ref}]({}/{gitlab_path}/-/commit/{})",
                        commit.display_id,
                        self.gitlab.base_url(),
                        commit.id,
                    ),
                    None => {
                        warn!(
                            issue = %issue.key,
                            repository = %bitbucket_ref,
                            "No GitLab mapping for Bitbucket repository, linking the original commit"
                        );
                        format!("[{} in {bitbucket_ref}]({})", commit.display_id, commit.url)
                    }
                };

                let gl_author = self
                    .identity
                    .resolve(
                        &self.gitlab,
                        &self.jira,
                        &mut self.state.elevated_users,
                        &commit.author.name,
                    )
                    .await?;
                let created_at = commit
                    .author_timestamp
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .map(|timestamp| timestamp.to_rfc3339());
                let body = format!(
                    "{} committed {reference}:\n\n{}",
                    commit.author.name, commit.message
                );

                self.gitlab
                    .create_note(
                        item,
                        &body,
                        created_at.as_deref(),
                        Some(gl_author.username.as_str()),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Derives the label set: the import marker, Jira labels, and the
    /// mapped issue type, priority, components, status and resolution.
    async fn derive_labels(&mut self, ctx: &ProjectContext, issue: &JiraIssue) -> Vec<String> {
        let mappings = &self.config.mappings;
        let options = &self.config.import;

        let mut labels = vec!["jira-import".to_string()];
        for label in &issue.fields.labels {
            labels.push(format!("{}{label}", options.label_prefix));
        }

        let type_name = &issue.fields.issuetype.name;
        match mappings.issue_types.get(type_name) {
            Some(mapped) => labels.push(mapped.clone()),
            None => {
                warn!(
                    issue = %issue.key,
                    issue_type = %type_name,
                    "No mapping for issue type, using lowercased name"
                );
                labels.push(type_name.to_lowercase());
            }
        }

        if let Some(priority) = &issue.fields.priority {
            match mappings.priorities.get(&priority.name) {
                Some(mapped) => labels.push(mapped.clone()),
                None => {
                    warn!(
                        issue = %issue.key,
                        priority = %priority.name,
                        "No mapping for priority, using prefixed name"
                    );
                    labels.push(format!(
                        "{}{}",
                        options.priority_prefix,
                        priority.name.to_lowercase()
                    ));
                }
            }
        }

        for component in &issue.fields.components {
            match mappings.components.get(&component.name) {
                Some(mapped) => labels.push(mapped.clone()),
                None => {
                    warn!(
                        issue = %issue.key,
                        component = %component.name,
                        "No mapping for component, using prefixed name"
                    );
                    labels.push(format!(
                        "{}{}",
                        options.component_prefix,
                        component.name.to_lowercase()
                    ));
                }
            }
        }

        if let Some(status) = &issue.fields.status {
            if let Some(mapped) = mappings.statuses.get(&status.name) {
                labels.push(mapped.clone());
            }
        }
        if let Some(resolution) = &issue.fields.resolution {
            if let Some(mapped) = mappings.resolutions.get(&resolution.name) {
                labels.push(mapped.clone());
            }
        }

        // Without epics, membership degrades to a label carrying the
        // epic's title.
        if ctx.group_id.is_none() {
            if let Some(epic_key) = issue.epic_key(self.config.jira.epic_field.as_deref()) {
                match self.jira.fetch_issue_summary(epic_key).await {
                    Ok(Some(epic_title)) => labels.push(epic_title),
                    Ok(None) => warn!(
                        issue = %issue.key,
                        epic = epic_key,
                        "Epic has no summary, skipping epic label"
                    ),
                    Err(e) => warn!(
                        issue = %issue.key,
                        epic = epic_key,
                        error = %e,
                        "Could not fetch epic summary, skipping epic label"
                    ),
                }
            }
        }

        labels
    }

    fn derive_weight(&self, issue: &JiraIssue) -> Option<u64> {
        self.config
            .jira
            .story_points_field
            .as_deref()
            .and_then(|field| issue.custom_field(field))
            .and_then(Value::as_f64)
            .map(|points| points.round() as u64)
    }

    /// Finds or creates the milestone with the given title, keeping the
    /// per-project cache current.
    async fn resolve_milestone(
        &mut self,
        ctx: &mut ProjectContext,
        title: &str,
    ) -> Result<u64, ItemError> {
        if let Some(milestone) = ctx.milestones.iter().find(|m| m.title == title) {
            return Ok(milestone.id);
        }

        let milestone = match self.gitlab.search_milestone(ctx.project_id, title).await? {
            Some(milestone) => milestone,
            None => {
                info!(project_id = ctx.project_id, title, "Creating milestone");
                self.gitlab.create_milestone(ctx.project_id, title).await?
            }
        };
        let id = milestone.id;
        ctx.milestones.push(milestone);
        Ok(id)
    }
}

/// What to do with an issue, given its previous Migration Record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportDecision {
    /// Never imported before.
    Import,

    /// Imported and unchanged since.
    Skip,

    /// Imported but changed since; delete and redo.
    Recreate,
}

fn import_decision(record: Option<&IssueRecord>, fingerprint: &str) -> ImportDecision {
    match record {
        None => ImportDecision::Import,
        Some(record) if record.fingerprint == fingerprint => ImportDecision::Skip,
        Some(_) => ImportDecision::Recreate,
    }
}

/// Collects the issue's outward links and sub-task relations into the
/// pending set. Inward links are implied by their outward counterpart
/// on the other issue and would only create duplicates.
fn harvest_pending_links(issue: &JiraIssue, pending: &mut BTreeSet<PendingLink>) {
    for link in &issue.fields.issue_links {
        if let Some(target) = &link.outward_issue {
            pending.insert(PendingLink::new(
                issue.key.as_str(),
                link.link_type.outward.as_str(),
                target.key.as_str(),
            ));
        }
    }
    for subtask in &issue.fields.subtasks {
        pending.insert(PendingLink::new(
            subtask.key.as_str(),
            "blocks",
            issue.key.as_str(),
        ));
    }
}

/// Undoes the bookkeeping of a created item: the Migration Record and
/// the epic-map entry go away, harvested links stay.
fn rollback_import(state: &mut ImportState, epic_map: &mut BTreeMap<String, u64>, key: &str) {
    state.issue_mapping.remove(key);
    epic_map.remove(key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_with_links() -> JiraIssue {
        JiraIssue::from_raw(json!({
            "id": "10001",
            "key": "P1-10",
            "fields": {
                "summary": "A bug",
                "issuetype": {"name": "Bug"},
                "issuelinks": [
                    {"type": {"outward": "duplicates"}, "outwardIssue": {"key": "P1-2"}},
                    {"type": {"outward": "blocks"}}
                ],
                "subtasks": [{"key": "P1-11"}],
            }
        }))
        .unwrap()
    }

    fn record(fingerprint: &str) -> IssueRecord {
        IssueRecord {
            id: 9,
            project_id: 7,
            iid: 1,
            full_ref: "group1/project1#1".to_string(),
            fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn harvests_outward_links_and_subtasks() {
        let mut pending = BTreeSet::new();
        harvest_pending_links(&issue_with_links(), &mut pending);

        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&PendingLink::new("P1-10", "duplicates", "P1-2")));
        assert!(pending.contains(&PendingLink::new("P1-11", "blocks", "P1-10")));
    }

    #[test]
    fn decision_follows_the_fingerprint() {
        let record = record("aaa");
        assert_eq!(import_decision(None, "aaa"), ImportDecision::Import);
        assert_eq!(import_decision(Some(&record), "aaa"), ImportDecision::Skip);
        assert_eq!(import_decision(Some(&record), "bbb"), ImportDecision::Recreate);
    }

    #[test]
    fn skipped_issues_do_not_replay_resolved_links() {
        let issue = issue_with_links();
        let fingerprint = issue_fingerprint(&issue.raw, &[]);
        let mut state = ImportState::default();

        // First run: new issue, links harvested and later resolved.
        assert_eq!(
            import_decision(state.issue_mapping.get(&issue.key), &fingerprint),
            ImportDecision::Import
        );
        harvest_pending_links(&issue, &mut state.pending_links);
        state
            .issue_mapping
            .insert(issue.key.clone(), record(&fingerprint));
        state.pending_links.clear();

        // Second run: the unchanged issue is skipped and nothing is
        // harvested, so resolved triples never re-enter the set.
        assert_eq!(
            import_decision(state.issue_mapping.get(&issue.key), &fingerprint),
            ImportDecision::Skip
        );
        assert!(state.pending_links.is_empty());
    }

    #[test]
    fn rollback_leaves_no_record_but_keeps_links() {
        let issue = issue_with_links();
        let mut state = ImportState::default();
        let mut epic_map = BTreeMap::new();

        harvest_pending_links(&issue, &mut state.pending_links);
        state.issue_mapping.insert(issue.key.clone(), record("fff"));
        epic_map.insert(issue.key.clone(), 1);

        rollback_import(&mut state, &mut epic_map, &issue.key);

        assert!(state.issue_mapping.is_empty());
        assert!(epic_map.is_empty());
        assert_eq!(state.pending_links.len(), 2);
    }
}

