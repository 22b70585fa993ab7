//! Tests for change event decoding.

use super::*;
use chrono::TimeZone;

mod decode_envelope_tests {
    use super::*;

    /// Verify that a complete event decodes into all fields.
    #[test]
    fn test_decode_complete_event() {
        // Arrange
        let payload = br#"{
            "name": "projects/p1/repos/r1",
            "url": "https://source.developers.google.com/p/p1/r/r1",
            "eventTime": "2024-03-01T12:00:00Z",
            "refUpdateEvent": {
                "email": "a@b.com",
                "refUpdates": {
                    "refs/heads/main": {
                        "refName": "refs/heads/main",
                        "updateType": "UPDATE_FAST_FORWARD",
                        "oldId": "111",
                        "newId": "222"
                    }
                }
            }
        }"#;

        // Act
        let envelope = decode_envelope(payload).unwrap();

        // Assert
        assert_eq!(envelope.name, "projects/p1/repos/r1");
        assert_eq!(
            envelope.event_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(envelope.ref_update_event.email, "a@b.com");

        let update = &envelope.ref_update_event.ref_updates["refs/heads/main"];
        assert_eq!(update.ref_name, "refs/heads/main");
        assert_eq!(update.update_type, UpdateType::UpdateFastForward);
        assert_eq!(update.old_id, "111");
        assert_eq!(update.new_id, "222");
    }

    /// Verify that missing fields default to empty values.
    #[test]
    fn test_missing_fields_default_to_empty() {
        let envelope = decode_envelope(b"{}").unwrap();

        assert_eq!(envelope, ChangeEnvelope::default());
        assert!(envelope.event_time.is_none());
        assert!(envelope.ref_update_event.ref_updates.is_empty());
    }

    /// Verify that null fields decode like missing ones and the update still maps.
    #[test]
    fn test_null_fields_default_to_empty() {
        let payload = br#"{
            "name": "projects/p1/repos/r1",
            "url": null,
            "refUpdateEvent": {
                "email": null,
                "refUpdates": {
                    "x": {"refName": "refs/heads/main", "updateType": "CREATE", "oldId": null, "newId": "abc123"}
                }
            }
        }"#;

        let envelope = decode_envelope(payload).unwrap();

        assert_eq!(envelope.url, "");
        assert_eq!(envelope.ref_update_event.email, "");
        let update = &envelope.ref_update_event.ref_updates["x"];
        assert_eq!(update.update_type, UpdateType::Create);
        assert_eq!(update.old_id, "");
        assert_eq!(update.new_id, "abc123");
        assert!(crate::mapping::map_ref_update(&envelope, update).is_ok());
    }

    /// Verify that null containers decode to empty ones.
    #[test]
    fn test_null_containers_default_to_empty() {
        let envelope =
            decode_envelope(br#"{"name": null, "refUpdateEvent": {"refUpdates": null}}"#).unwrap();
        assert_eq!(envelope.name, "");
        assert!(envelope.ref_update_event.ref_updates.is_empty());

        let envelope = decode_envelope(br#"{"refUpdateEvent": null}"#).unwrap();
        assert_eq!(envelope.ref_update_event, RefUpdateEvent::default());
    }

    /// Verify that a ref update without fields decodes to an empty classification.
    #[test]
    fn test_empty_ref_update() {
        let envelope =
            decode_envelope(br#"{"refUpdateEvent":{"refUpdates":{"x":{}}}}"#).unwrap();

        let update = &envelope.ref_update_event.ref_updates["x"];
        assert_eq!(update.update_type, UpdateType::Unrecognized(String::new()));
        assert!(update.new_id.is_empty());
    }

    /// Verify that ref updates are iterated in ascending key order.
    #[test]
    fn test_ref_updates_are_ordered_by_key() {
        let envelope = decode_envelope(
            br#"{"refUpdateEvent":{"refUpdates":{
                "refs/heads/zeta":{"refName":"z"},
                "refs/heads/alpha":{"refName":"a"},
                "refs/heads/main":{"refName":"m"}
            }}}"#,
        )
        .unwrap();

        let names: Vec<&str> = envelope
            .ref_update_event
            .ref_updates
            .values()
            .map(|u| u.ref_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }

    /// Verify that invalid JSON is reported as a malformed payload.
    #[test]
    fn test_invalid_json_is_malformed() {
        let result = decode_envelope(b"not json");
        assert!(matches!(result, Err(DecodeError::MalformedPayload(_))));
    }

    /// Verify that fields of the wrong type are reported as a malformed payload.
    #[test]
    fn test_wrong_types_are_malformed() {
        assert!(decode_envelope(br#"{"name": 42}"#).is_err());
        assert!(decode_envelope(br#"{"refUpdateEvent": {"refUpdates": []}}"#).is_err());
        assert!(decode_envelope(br#"{"eventTime": "yesterday"}"#).is_err());
        assert!(decode_envelope(br#"[]"#).is_err());
    }
}

mod update_type_tests {
    use super::*;

    /// Verify the four known classifications and the raw fallback.
    #[test]
    fn test_from_wire_string() {
        assert_eq!(UpdateType::from("CREATE".to_string()), UpdateType::Create);
        assert_eq!(
            UpdateType::from("UPDATE_FAST_FORWARD".to_string()),
            UpdateType::UpdateFastForward
        );
        assert_eq!(
            UpdateType::from("UPDATE_NON_FAST_FORWARD".to_string()),
            UpdateType::UpdateNonFastForward
        );
        assert_eq!(UpdateType::from("DELETE".to_string()), UpdateType::Delete);
        assert_eq!(
            UpdateType::from("create".to_string()),
            UpdateType::Unrecognized("create".to_string())
        );
    }

    /// Verify that the raw string is preserved for display.
    #[test]
    fn test_as_str_round_trips_raw_value() {
        assert_eq!(UpdateType::Delete.as_str(), "DELETE");
        assert_eq!(
            UpdateType::Unrecognized("UNKNOWN".to_string()).to_string(),
            "UNKNOWN"
        );
    }
}
