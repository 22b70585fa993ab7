//! Tests for Slack message formatting.

use super::*;
use crate::event::UpdateType;
use chrono::{TimeZone, Utc};

fn fact() -> NotificationFact {
    NotificationFact {
        resource_name: "projects/p1/repos/r1".to_string(),
        project_id: "p1".to_string(),
        repo_name: "r1".to_string(),
        commit_url: "https://source.cloud.google.com/p1/r1/+/abc123".to_string(),
        ref_name: "refs/heads/main".to_string(),
        author_email: "a@b.com".to_string(),
        update_type: UpdateType::Create,
        color: "#2e77ff",
        new_commit_id: "abc123".to_string(),
        event_time: None,
    }
}

mod gravatar_tests {
    use super::*;

    /// Verify the avatar hash for a known address.
    #[test]
    fn test_known_hash() {
        // md5("a@b.com")
        assert_eq!(
            gravatar_url("a@b.com"),
            "https://www.gravatar.com/avatar/357a20e8c56e69d6f9734d23ef9517e8"
        );
    }

    /// Verify that surrounding whitespace does not change the hash.
    #[test]
    fn test_email_is_trimmed() {
        assert_eq!(gravatar_url("  a@b.com\n"), gravatar_url("a@b.com"));
    }

    /// Verify that an empty address yields no avatar.
    #[test]
    fn test_empty_email() {
        assert_eq!(gravatar_url(""), "");
    }

    /// Verify that only an empty address yields no avatar, even blank ones hash.
    #[test]
    fn test_blank_email_still_has_avatar() {
        // md5("")
        assert_eq!(
            gravatar_url("   "),
            "https://www.gravatar.com/avatar/d41d8cd98f00b204e9800998ecf8427e"
        );
    }
}

mod format_notification_tests {
    use super::*;

    /// Verify the single attachment carries every rendered value.
    #[test]
    fn test_attachment_contents() {
        // Act
        let message = format_notification(&fact());

        // Assert
        assert_eq!(message.attachments.len(), 1);
        let attachment = &message.attachments[0];
        assert_eq!(attachment.fallback, "projects/p1/repos/r1:refs/heads/main");
        assert_eq!(attachment.color, "#2e77ff");
        assert_eq!(attachment.title, "Cloud Repo");
        assert_eq!(
            attachment.title_link,
            "https://source.cloud.google.com/p1/r1/+/abc123"
        );
        assert_eq!(attachment.author_name, "a@b.com");
        assert!(attachment.author_icon.starts_with(GRAVATAR_BASE_URL));
        assert!(attachment.ts.is_none());

        let fields: Vec<(&str, &str, bool)> = attachment
            .fields
            .iter()
            .map(|f| (f.title.as_str(), f.value.as_str(), f.short))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("Repository", "projects/p1/repos/r1", false),
                ("Branch", "refs/heads/main", false),
                ("Email", "a@b.com", false),
                ("Update Type", "CREATE", false),
                ("Commit SHA", "abc123", false),
            ]
        );
    }

    /// Verify the timestamp is the event time in Unix seconds.
    #[test]
    fn test_event_time_becomes_ts() {
        let mut fact = fact();
        fact.event_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());

        let message = format_notification(&fact);
        assert_eq!(message.attachments[0].ts, Some(1_709_294_400));
    }

    /// Verify the wire document omits empty optional members.
    #[test]
    fn test_wire_document_omits_empty_author() {
        let mut fact = fact();
        fact.author_email = String::new();

        let json = serde_json::to_value(format_notification(&fact)).unwrap();
        let attachment = &json["attachments"][0];

        assert!(json.get("text").is_none());
        assert!(attachment.get("author_name").is_none());
        assert!(attachment.get("author_icon").is_none());
        assert!(attachment.get("ts").is_none());
        assert_eq!(attachment["pretext"], "");
        assert_eq!(attachment["text"], "");
        assert_eq!(attachment["fields"][2]["value"], "");
        assert_eq!(attachment["fields"][0]["short"], false);
    }
}
