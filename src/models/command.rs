//! The profile command protocol.
//!
//! The decision model emits mutations as a JSON object keyed by decimal
//! strings: `{"0": {"command": "add", ...}, "1": {"command": "delete",
//! ...}}`. Fragments are applied in numeric key order. A fragment that
//! cannot be understood is skipped and recorded as an anomaly rather than
//! poisoning its siblings; a payload with no usable fragments parses to
//! an empty batch.

use super::Tag;
use std::fmt;

/// A single validated profile mutation.
///
/// Tags are validated here, at the parse boundary, so everything past
/// this type can trust them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a value under (tag, feature).
    Add {
        /// Taxonomy tag.
        tag: Tag,
        /// Feature name under the tag.
        feature: String,
        /// Value to remember.
        value: String,
    },
    /// Delete entries under (tag, feature).
    ///
    /// With a value, only exact-value matches are removed; without one,
    /// every entry under the key is removed.
    Delete {
        /// Taxonomy tag.
        tag: Tag,
        /// Feature name under the tag.
        feature: String,
        /// Exact value to match, or `None` for the whole key.
        value: Option<String>,
    },
}

impl Command {
    /// The tag this command touches.
    #[must_use]
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Add { tag, .. } | Self::Delete { tag, .. } => *tag,
        }
    }
}

/// A command fragment that was skipped during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAnomaly {
    /// The document key of the offending fragment, if it had one.
    pub key: Option<String>,
    /// Why the fragment was skipped.
    pub reason: String,
}

impl fmt::Display for CommandAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "fragment '{key}': {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Parses a command document from raw decision-model output.
///
/// Returns the usable commands in numeric key order plus an anomaly for
/// every fragment that had to be skipped. Wholly unparsable input yields
/// an empty batch with a single anomaly.
#[must_use]
pub fn parse_command_document(payload: &str) -> (Vec<Command>, Vec<CommandAnomaly>) {
    let Ok(doc) = serde_json::from_str::<serde_json::Value>(payload) else {
        return (
            Vec::new(),
            vec![CommandAnomaly {
                key: None,
                reason: "payload is not valid JSON".to_string(),
            }],
        );
    };

    let Some(map) = doc.as_object() else {
        return (
            Vec::new(),
            vec![CommandAnomaly {
                key: None,
                reason: "payload is not a JSON object".to_string(),
            }],
        );
    };

    let mut keyed: Vec<(u64, &str, &serde_json::Value)> = Vec::new();
    let mut anomalies = Vec::new();

    for (key, fragment) in map {
        match key.parse::<u64>() {
            Ok(order) => keyed.push((order, key, fragment)),
            Err(_) => anomalies.push(CommandAnomaly {
                key: Some(key.clone()),
                reason: "key is not a decimal index".to_string(),
            }),
        }
    }
    keyed.sort_by_key(|(order, _, _)| *order);

    let mut commands = Vec::with_capacity(keyed.len());
    for (_, key, fragment) in keyed {
        match parse_fragment(fragment) {
            Ok(command) => commands.push(command),
            Err(reason) => anomalies.push(CommandAnomaly {
                key: Some(key.to_string()),
                reason,
            }),
        }
    }

    (commands, anomalies)
}

/// Parses one command fragment, returning the skip reason on failure.
fn parse_fragment(fragment: &serde_json::Value) -> std::result::Result<Command, String> {
    let obj = fragment
        .as_object()
        .ok_or_else(|| "fragment is not a JSON object".to_string())?;

    let verb = obj
        .get("command")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "missing 'command' field".to_string())?;

    let raw_tag = obj
        .get("tag")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "missing 'tag' field".to_string())?;
    let tag =
        Tag::parse(raw_tag).ok_or_else(|| format!("tag '{raw_tag}' is not in the taxonomy"))?;

    let feature = obj
        .get("feature")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| "missing 'feature' field".to_string())?
        .to_string();

    match verb {
        "add" => {
            let value = obj
                .get("value")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| "add requires a string 'value'".to_string())?
                .to_string();
            Ok(Command::Add {
                tag,
                feature,
                value,
            })
        }
        "delete" => {
            let value = match obj.get("value") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(_) => return Err("delete 'value' must be a string or null".to_string()),
            };
            Ok(Command::Delete {
                tag,
                feature,
                value,
            })
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applies_numeric_key_order() {
        let payload = r#"{
            "2": {"command": "add", "tag": "Preferred Languages", "feature": "primary", "value": "Rust"},
            "0": {"command": "add", "tag": "Testing Preferences", "feature": "runner", "value": "nextest"},
            "10": {"command": "delete", "tag": "Preferred Languages", "feature": "primary"}
        }"#;

        let (commands, anomalies) = parse_command_document(payload);
        assert!(anomalies.is_empty());
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].tag().as_str(), "Testing Preferences");
        assert_eq!(commands[1].tag().as_str(), "Preferred Languages");
        assert!(matches!(commands[2], Command::Delete { value: None, .. }));
    }

    #[test]
    fn test_malformed_fragment_skipped_not_fatal() {
        let payload = r#"{
            "0": {"command": "add", "tag": "Preferred Languages", "feature": "primary", "value": "Rust"},
            "1": {"command": "add", "tag": "Favorite Snacks", "feature": "salty", "value": "pretzels"},
            "2": {"command": "promote", "tag": "Preferred Languages", "feature": "primary"},
            "3": {"command": "add", "tag": "Development Tools", "feature": "editor", "value": "helix"}
        }"#;

        let (commands, anomalies) = parse_command_document(payload);
        assert_eq!(commands.len(), 2);
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies[0].reason.contains("taxonomy"));
        assert!(anomalies[1].reason.contains("unknown command"));
    }

    #[test]
    fn test_unparsable_payload_is_empty_batch() {
        let (commands, anomalies) = parse_command_document("not json at all");
        assert!(commands.is_empty());
        assert_eq!(anomalies.len(), 1);

        let (commands, anomalies) = parse_command_document("[1, 2, 3]");
        assert!(commands.is_empty());
        assert_eq!(anomalies.len(), 1);
    }

    #[test]
    fn test_non_numeric_key_is_anomaly() {
        let payload = r#"{
            "first": {"command": "add", "tag": "Preferred Languages", "feature": "primary", "value": "Rust"},
            "0": {"command": "add", "tag": "Development Tools", "feature": "editor", "value": "helix"}
        }"#;

        let (commands, anomalies) = parse_command_document(payload);
        assert_eq!(commands.len(), 1);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].key.as_deref(), Some("first"));
    }

    #[test]
    fn test_delete_with_null_value_means_whole_key() {
        let payload = r#"{
            "0": {"command": "delete", "tag": "Preferred Languages", "feature": "primary", "value": null}
        }"#;

        let (commands, anomalies) = parse_command_document(payload);
        assert!(anomalies.is_empty());
        assert!(matches!(&commands[0], Command::Delete { value: None, .. }));
    }
}
