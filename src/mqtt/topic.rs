//! Topic construction and subscription-pattern matching.
//!
//! Patterns follow MQTT segment semantics with two restrictions: at most one
//! `+`, and `#` only as the final character. A trailing `#` compares raw
//! prefixes, so `a/#` also matches `ab/c`.

use super::error::MqttError;
use crate::context::DeviceIdentity;

/// Upper bound for any topic the router builds or publishes to.
pub const MAX_TOPIC_BYTES: usize = 256;

/// Suffix of the status topic below the application prefix.
pub const STATUS_TOPIC_SUFFIX: &str = "Friend-Service/ping";

/// `<appPrefix>/<friendId>[/<deviceId>]/<suffix>`
pub fn handler_topic(
    app_prefix: &str,
    identity: &DeviceIdentity,
    suffix: &str,
) -> Result<String, MqttError> {
    let topic = format!("{}/{}", identity.topic_namespace(app_prefix), suffix);
    check_len(&topic)?;
    Ok(topic)
}

/// `<appPrefix>/Friend-Service/ping`
pub fn status_topic(app_prefix: &str) -> String {
    format!("{}/{}", app_prefix, STATUS_TOPIC_SUFFIX)
}

pub fn check_len(topic: &str) -> Result<(), MqttError> {
    if topic.len() > MAX_TOPIC_BYTES {
        return Err(MqttError::TopicTooLong {
            size: topic.len(),
            limit: MAX_TOPIC_BYTES,
        });
    }
    Ok(())
}

/// Whether `received` is matched by the subscription `pattern`.
pub fn matches(pattern: &str, received: &str) -> bool {
    if let Some(pos) = pattern.find('#') {
        if pos + 1 != pattern.len() {
            return false;
        }
        // the '/' before '#' is not part of the compared prefix
        let prefix = pattern[..pos].strip_suffix('/').unwrap_or(&pattern[..pos]);
        return received.starts_with(prefix);
    }

    if pattern.matches('+').count() > 1 {
        return false;
    }

    if let Some(plus) = pattern.find('+') {
        if !received.contains('/') {
            return true;
        }
        let (prefix, suffix) = (&pattern[..plus], &pattern[plus + 1..]);
        let Some(rest) = received.strip_prefix(prefix) else {
            return false;
        };
        let segment_end = rest.find('/').unwrap_or(rest.len());
        return &rest[segment_end..] == suffix;
    }

    pattern == received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_topics_match_only_themselves() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(!matches("a/b/c", "a/b"));
        assert!(!matches("a/b", "a/b/c"));
    }

    #[test]
    fn multi_level_wildcard_covers_parent_and_descendants() {
        assert!(matches("a/#", "a"));
        assert!(matches("a/#", "a/b"));
        assert!(matches("a/#", "a/b/c"));
        assert!(!matches("a/#", "b/a"));
        assert!(matches("#", "anything/at/all"));
    }

    #[test]
    fn multi_level_wildcard_compares_raw_prefix() {
        assert!(matches("a/#", "ab/c"));
        assert!(matches("GeoGlow/f1/#", "GeoGlow/f10/d1/color"));
        assert!(!matches("GeoGlow/f1/#", "GeoGlow/f"));
    }

    #[test]
    fn hash_must_be_last() {
        assert!(!matches("a/#/c", "a/b/c"));
    }

    #[test]
    fn single_level_wildcard_spans_one_segment() {
        assert!(matches("a/+/c", "a/x/c"));
        assert!(!matches("a/+/c", "a/x/y/c"));
        assert!(matches("base/+/cmd", "base/anything/cmd"));
        assert!(!matches("base/+/cmd", "base/a/b/cmd"));
        assert!(!matches("base/+/cmd", "other/a/cmd"));
    }

    #[test]
    fn trailing_plus() {
        assert!(matches("a/+", "a/b"));
        assert!(!matches("a/+", "a/b/c"));
    }

    #[test]
    fn plus_accepts_single_segment_topics() {
        assert!(matches("a/+/c", "lonely"));
    }

    #[test]
    fn more_than_one_plus_never_matches() {
        assert!(!matches("a/+/+", "a/b/c"));
    }

    #[test]
    fn handler_topics_are_namespaced() {
        let identity = DeviceIdentity::new("f1", Some("d1".into())).unwrap();
        assert_eq!(
            handler_topic("GeoGlow", &identity, "color").unwrap(),
            "GeoGlow/f1/d1/color"
        );
        assert_eq!(status_topic("GeoGlow"), "GeoGlow/Friend-Service/ping");
    }

    #[test]
    fn oversized_topics_are_rejected() {
        let identity = DeviceIdentity::new("f".repeat(300), None).unwrap();
        assert!(matches!(
            handler_topic("GeoGlow", &identity, "color"),
            Err(MqttError::TopicTooLong { .. })
        ));
    }
}
