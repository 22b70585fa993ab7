//! Slack message documents and the notification formatter.

use crate::mapping::NotificationFact;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "slack_tests.rs"]
mod tests;

/// Title shown on every notification
pub const NOTIFICATION_TITLE: &str = "Cloud Repo";

/// Base URL for author avatars
pub const GRAVATAR_BASE_URL: &str = "https://www.gravatar.com/avatar/";

/// Incoming-webhook message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Legacy message attachment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub fallback: String,
    pub color: String,
    pub pretext: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author_icon: String,
    pub title: String,
    pub title_link: String,
    pub text: String,
    pub fields: Vec<Field>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

/// Labeled value shown in an attachment's field table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn long(title: &str, value: &str) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            short: false,
        }
    }
}

/// Avatar URL for an email address, empty exactly when the address is empty
///
/// Surrounding whitespace is trimmed before hashing.
pub fn gravatar_url(email: &str) -> String {
    if email.is_empty() {
        return String::new();
    }
    let digest = md5::compute(email.trim().as_bytes());
    format!("{}{:x}", GRAVATAR_BASE_URL, digest)
}

/// Render a notification fact as a single-attachment message
pub fn format_notification(fact: &NotificationFact) -> SlackMessage {
    let attachment = Attachment {
        fallback: format!("{}:{}", fact.resource_name, fact.ref_name),
        color: fact.color.to_string(),
        pretext: String::new(),
        author_name: fact.author_email.clone(),
        author_icon: gravatar_url(&fact.author_email),
        title: NOTIFICATION_TITLE.to_string(),
        title_link: fact.commit_url.clone(),
        text: String::new(),
        fields: vec![
            Field::long("Repository", &fact.resource_name),
            Field::long("Branch", &fact.ref_name),
            Field::long("Email", &fact.author_email),
            Field::long("Update Type", fact.update_type.as_str()),
            Field::long("Commit SHA", &fact.new_commit_id),
        ],
        ts: fact.event_time.map(|t| t.timestamp()),
    };

    SlackMessage {
        text: String::new(),
        attachments: vec![attachment],
    }
}
