//! Attachment relocation.
//!
//! Each Jira attachment is downloaded and re-uploaded to the target
//! GitLab project under the resolved author identity. The result is a
//! replacement map handed to the markup translator so embedded
//! references like `!photo.png|thumbnail!` are rewritten to point at
//! the new upload. A failed transfer skips that one attachment and
//! never aborts the batch.

use crate::gitlab::GitlabClient;
use crate::identity::{IdentityError, IdentityResolver};
use crate::jira::{JiraAttachment, JiraClient};
use crate::markup::Replacement;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

/// How uploaded files are named on the GitLab side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenamePolicy {
    /// Opaque generated names; immune to encoding issues in the
    /// original filename.
    Opaque,

    /// Keep the original name, with diacritics stripped.
    Original,
}

/// Relocates a list of attachments into a GitLab project.
///
/// Returns one [`Replacement`] per successfully transferred attachment,
/// keyed on the original filename as it appears embedded in Jira text.
///
/// # Errors
///
/// Only identity resolution errors abort the batch; transfer failures
/// are logged and skipped.
pub async fn relocate_attachments(
    jira: &JiraClient,
    gitlab: &GitlabClient,
    identity: &mut IdentityResolver,
    ledger: &mut BTreeSet<String>,
    attachments: &[JiraAttachment],
    gitlab_project_id: u64,
    policy: FilenamePolicy,
) -> Result<Vec<Replacement>, IdentityError> {
    let mut replacements = Vec::new();

    for attachment in attachments {
        let author = attachment
            .author
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .unwrap_or("jira");
        let uploader = identity.resolve(gitlab, jira, ledger, author).await?;

        let bytes = match jira.download_attachment(&attachment.content).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %attachment.content, error = %e, "Unable to migrate attachment");
                continue;
            }
        };

        let upload_name = match policy {
            FilenamePolicy::Opaque => Uuid::new_v4().to_string(),
            FilenamePolicy::Original => strip_diacritics(&attachment.filename),
        };

        let upload = match gitlab
            .upload_file(gitlab_project_id, &upload_name, bytes, Some(&uploader.username))
            .await
        {
            Ok(upload) => upload,
            Err(e) => {
                warn!(url = %attachment.content, error = %e, "Unable to migrate attachment");
                continue;
            }
        };

        // Full URL rather than a project-relative path, so the markup
        // stays valid when it ends up in a group-level epic.
        let markup = format!(
            "![{}]({}{})",
            attachment.filename,
            gitlab.base_url(),
            upload.full_path
        );

        let Ok(pattern) = Regex::new(&format!("!{}[^!]*!", regex::escape(&attachment.filename)))
        else {
            warn!(filename = %attachment.filename, "Could not build replacement pattern");
            continue;
        };

        replacements.push(Replacement { pattern, markup });
    }

    Ok(replacements)
}

/// Strips diacritics from Latin characters and drops combining marks,
/// approximating an NFD-decompose-and-filter pass for the character
/// ranges that actually show up in attachment names.
#[must_use]
pub fn strip_diacritics(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '\u{0300}'..='\u{036f}'))
        .map(fold_latin)
        .collect()
}

fn fold_latin(c: char) -> char {
    match c {
        'à'..='å' | 'ā' | 'ă' | 'ą' => 'a',
        'À'..='Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Ć' | 'Č' => 'C',
        'è'..='ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'È'..='Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'ì'..='ï' | 'ī' | 'į' => 'i',
        'Ì'..='Ï' | 'Ī' | 'Į' => 'I',
        'ñ' | 'ń' | 'ň' => 'n',
        'Ñ' | 'Ń' | 'Ň' => 'N',
        'ò'..='ö' | 'ø' | 'ō' | 'ő' => 'o',
        'Ò'..='Ö' | 'Ø' | 'Ō' | 'Ő' => 'O',
        'ù'..='ü' | 'ū' | 'ů' | 'ű' => 'u',
        'Ù'..='Ü' | 'Ū' | 'Ů' | 'Ű' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        'š' | 'ś' => 's',
        'Š' | 'Ś' => 'S',
        'ž' | 'ź' | 'ż' => 'z',
        'Ž' | 'Ź' | 'Ż' => 'Z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_from_latin_names() {
        assert_eq!(strip_diacritics("résumé.pdf"), "resume.pdf");
        assert_eq!(strip_diacritics("Přehled žádostí.xlsx"), "Prehled zadosti.xlsx");
    }

    #[test]
    fn drops_combining_marks() {
        // 'e' followed by a combining acute accent.
        assert_eq!(strip_diacritics("caf\u{0065}\u{0301}.png"), "cafe.png");
    }

    #[test]
    fn plain_ascii_is_untouched() {
        assert_eq!(strip_diacritics("report_final (2).txt"), "report_final (2).txt");
    }
}
