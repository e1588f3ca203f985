//! Session identity.

use serde::{Deserialize, Serialize};

/// The resolved identity a request operates under.
///
/// Every memory operation is scoped to a (user, session) pair; the
/// optional group and agent fields travel through to the episodic backend
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User the memory belongs to.
    pub user_id: String,
    /// Conversation-scoped session id.
    pub session_id: String,
    /// Optional group scope shared across users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Agents participating in the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_ids: Vec<String>,
}

impl Session {
    /// Creates a session with just the required identity pair.
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            group_id: None,
            agent_ids: Vec::new(),
        }
    }

    /// Sets the group id.
    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Sets the agent ids.
    #[must_use]
    pub fn with_agent_ids(mut self, agent_ids: impl IntoIterator<Item = String>) -> Self {
        self.agent_ids = agent_ids.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_fields_omitted_from_wire() {
        let session = Session::new("alice", "sess-1");
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("group_id").is_none());
        assert!(json.get("agent_ids").is_none());

        let session = session
            .with_group_id("team-7")
            .with_agent_ids(["cursor".to_string()]);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["group_id"], "team-7");
        assert_eq!(json["agent_ids"], serde_json::json!(["cursor"]));
    }
}
