//! Mapping of ref updates to notification facts.
//!
//! A ref update is notifiable when its classification has a color and the
//! envelope's resource name identifies a project and repository. Anything else
//! is skipped; skipping is a normal outcome, not an error.

use crate::event::{ChangeEnvelope, RefUpdate, UpdateType};
use chrono::{DateTime, Utc};
use std::fmt;

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;

/// Base URL of the repository browser
pub const SOURCE_BROWSER_BASE_URL: &str = "https://source.cloud.google.com";

const COLOR_TABLE: [(UpdateType, &str); 4] = [
    (UpdateType::Create, "#2e77ff"),
    (UpdateType::UpdateFastForward, "#60ff55"),
    (UpdateType::UpdateNonFastForward, "#ff2e2e"),
    (UpdateType::Delete, "#ff6d2e"),
];

/// Everything needed to render one notification
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFact {
    pub resource_name: String,
    pub project_id: String,
    pub repo_name: String,
    pub commit_url: String,
    pub ref_name: String,
    pub author_email: String,
    pub update_type: UpdateType,
    pub color: &'static str,
    pub new_commit_id: String,
    pub event_time: Option<DateTime<Utc>>,
}

/// Why a ref update produced no notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Classification outside the color table
    UnrecognizedUpdateType(String),
    /// Resource name not of the form `projects/{project}/repos/{repo}`
    InvalidResourceName(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedUpdateType(raw) => write!(f, "unrecognized update type '{}'", raw),
            Self::InvalidResourceName(name) => write!(f, "invalid resource name '{}'", name),
        }
    }
}

/// Color associated with a classification, if it is notifiable
pub fn color_for(update_type: &UpdateType) -> Option<&'static str> {
    COLOR_TABLE
        .iter()
        .find(|(known, _)| known == update_type)
        .map(|(_, color)| *color)
}

/// Extract `(project_id, repo_name)` from a resource name
///
/// The name must split on `/` into exactly four segments.
pub fn parse_resource_name(name: &str) -> Option<(&str, &str)> {
    let segments: Vec<&str> = name.split('/').collect();
    match segments.as_slice() {
        [_, project_id, _, repo_name] => Some((*project_id, *repo_name)),
        _ => None,
    }
}

/// Link to a commit in the repository browser; components are not escaped
pub fn commit_url(project_id: &str, repo_name: &str, commit_id: &str) -> String {
    format!(
        "{}/{}/{}/+/{}",
        SOURCE_BROWSER_BASE_URL, project_id, repo_name, commit_id
    )
}

/// Derive the notification fact for one ref update of an envelope
pub fn map_ref_update(
    envelope: &ChangeEnvelope,
    update: &RefUpdate,
) -> Result<NotificationFact, SkipReason> {
    let color = color_for(&update.update_type).ok_or_else(|| {
        SkipReason::UnrecognizedUpdateType(update.update_type.as_str().to_string())
    })?;

    let (project_id, repo_name) = parse_resource_name(&envelope.name)
        .ok_or_else(|| SkipReason::InvalidResourceName(envelope.name.clone()))?;

    Ok(NotificationFact {
        resource_name: envelope.name.clone(),
        project_id: project_id.to_string(),
        repo_name: repo_name.to_string(),
        commit_url: commit_url(project_id, repo_name, &update.new_id),
        ref_name: update.ref_name.clone(),
        author_email: envelope.ref_update_event.email.clone(),
        update_type: update.update_type.clone(),
        color,
        new_commit_id: update.new_id.clone(),
        event_time: envelope.event_time,
    })
}
