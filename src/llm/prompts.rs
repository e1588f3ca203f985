//! System prompts for the decision model.
//!
//! Both prompts demand JSON-only answers in fixed schemas; the parsers
//! in this module's parent are the other half of the contract.

use crate::models::TAXONOMY;

/// System prompt for turning session activity into profile commands.
///
/// The model must answer with a JSON object keyed by decimal strings,
/// one command per key, applied in numeric order.
#[must_use]
pub fn update_system_prompt() -> String {
    let tags = TAXONOMY.join("\n- ");
    format!(
        r#"You maintain a developer preference profile. Given a message from a
coding session, decide what the profile should remember or forget about
this developer. Only durable preferences matter; ignore one-off facts.

Allowed tags (use these exactly, never invent new ones):
- {tags}

Respond ONLY with a JSON object keyed by decimal strings starting at
"0". Each value is one command:

  {{"command": "add", "tag": "<tag>", "feature": "<feature>", "value": "<value>"}}
  {{"command": "delete", "tag": "<tag>", "feature": "<feature>", "value": "<value or null>"}}

A delete with a null value forgets everything under the (tag, feature)
pair. If nothing is worth remembering, respond with {{}}."#
    )
}

/// System prompt for deciding consolidation of similar entries.
///
/// The model sees a new memory plus similar existing ones and answers
/// with replacement entries (each citing the ids it absorbs) and a list
/// of ids to keep as-is.
#[must_use]
pub fn consolidation_system_prompt() -> String {
    let tags = TAXONOMY.join("\n- ");
    format!(
        r#"You compact a developer preference profile. Given a new memory and
similar existing memories, merge redundant or superseded entries into
fewer, richer ones. Never lose information that is still true.

Allowed tags (use these exactly, never invent new ones):
- {tags}

Respond ONLY with JSON in this shape:

  {{
    "consolidate_memories": [
      {{"tag": "<tag>", "feature": "<feature>", "value": "<merged value>",
        "metadata": {{"citations": [<ids of the memories this replaces>]}}}}
    ],
    "keep_memories": [<ids to leave untouched>]
  }}

Every id you cite or keep must come from the memories you were shown.
Memories in neither list will be forgotten."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_enumerate_taxonomy() {
        let update = update_system_prompt();
        let consolidation = consolidation_system_prompt();
        for tag in TAXONOMY {
            assert!(update.contains(tag));
            assert!(consolidation.contains(tag));
        }
        assert!(update.contains("\"command\": \"add\""));
        assert!(consolidation.contains("consolidate_memories"));
    }
}
