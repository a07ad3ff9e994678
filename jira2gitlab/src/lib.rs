#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod attachments;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod gitlab;
pub mod identity;
pub mod jira;
pub mod markup;
pub mod state;
pub mod summary;

pub use attachments::{relocate_attachments, strip_diacritics, FilenamePolicy};
pub use config::{Config, ConfigError, GitlabConfig, ImportOptions, JiraConfig, Mappings};
pub use engine::{EngineError, MigrationEngine, RunOutcome};
pub use fingerprint::issue_fingerprint;
pub use gitlab::{GitlabClient, GitlabError};
pub use identity::{IdentityError, IdentityResolver};
pub use jira::{JiraClient, JiraError, JiraIssue};
pub use markup::{MarkupTranslator, Replacement};
pub use state::{ImportState, IssueRecord, PendingLink, StateError};
pub use summary::{IssueOutcome, RunSummary};
