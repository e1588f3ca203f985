//! Consolidation inputs and decisions.
//!
//! After every add, the entry is offered to the decision model together
//! with similar existing entries. The model answers with two lists:
//! `consolidate_memories` (replacement entries, each citing the ids it
//! absorbs) and `keep_memories` (candidate ids to leave untouched). The
//! raw wire shape here is exactly what the model emits; the validated
//! [`ConsolidationDecision`] is produced by the engine after checking it
//! against the candidate set.

use super::{EntryId, ProfileEntry, Tag};
use serde::Deserialize;
use std::collections::BTreeSet;

/// What the decision model is shown for one consolidation round.
#[derive(Debug, Clone)]
pub struct ConsolidationInput {
    /// The freshly added entry under consideration.
    pub new_entry: ProfileEntry,
    /// Existing entries similar enough to be merge candidates.
    pub candidates: Vec<ProfileEntry>,
}

impl ConsolidationInput {
    /// Every id the model is allowed to cite or keep.
    #[must_use]
    pub fn candidate_ids(&self) -> BTreeSet<EntryId> {
        let mut ids: BTreeSet<EntryId> = self.candidates.iter().map(|e| e.id).collect();
        ids.insert(self.new_entry.id);
        ids
    }

    /// Renders the round as the JSON document sent to the model.
    #[must_use]
    pub fn to_prompt_json(&self) -> serde_json::Value {
        serde_json::json!({
            "new_memory": self.new_entry.to_candidate_json(),
            "similar_memories": self
                .candidates
                .iter()
                .map(ProfileEntry::to_candidate_json)
                .collect::<Vec<_>>(),
        })
    }
}

/// A replacement entry inside a validated decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedEntry {
    /// Taxonomy tag, validated against the closed vocabulary.
    pub tag: Tag,
    /// Feature name.
    pub feature: String,
    /// Consolidated value.
    pub value: String,
    /// The candidate ids this entry absorbs. Never empty.
    pub citations: BTreeSet<EntryId>,
}

/// A decision that passed structural validation against its input.
///
/// Invariant: every cited or kept id is a member of the input's candidate
/// set, every citation set is non-empty, and every tag is in the
/// taxonomy. Candidate ids in neither set are the uncovered remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationDecision {
    /// Replacement entries to mint.
    pub consolidate: Vec<ConsolidatedEntry>,
    /// Candidate ids to leave untouched.
    pub keep: BTreeSet<EntryId>,
}

impl ConsolidationDecision {
    /// A decision that keeps everything and merges nothing.
    #[must_use]
    pub fn keep_all(ids: BTreeSet<EntryId>) -> Self {
        Self {
            consolidate: Vec::new(),
            keep: ids,
        }
    }

    /// Ids covered by either a citation or the keep list.
    #[must_use]
    pub fn covered_ids(&self) -> BTreeSet<EntryId> {
        let mut covered = self.keep.clone();
        for entry in &self.consolidate {
            covered.extend(entry.citations.iter().copied());
        }
        covered
    }
}

/// The decision exactly as the model emits it, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDecision {
    /// Replacement entries.
    #[serde(default)]
    pub consolidate_memories: Vec<RawConsolidateEntry>,
    /// Ids to keep.
    #[serde(default)]
    pub keep_memories: Vec<u64>,
}

/// One replacement entry on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConsolidateEntry {
    /// Tag string, unvalidated.
    pub tag: String,
    /// Feature name.
    pub feature: String,
    /// Consolidated value.
    pub value: String,
    /// Citation carrier.
    pub metadata: RawConsolidateMetadata,
}

/// The metadata object carrying citations.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConsolidateMetadata {
    /// Ids the entry absorbs.
    #[serde(default)]
    pub citations: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, tag: &str, feature: &str, value: &str) -> ProfileEntry {
        ProfileEntry::new(EntryId(id), Tag::parse(tag).unwrap(), feature, value)
    }

    #[test]
    fn test_candidate_ids_include_new_entry() {
        let input = ConsolidationInput {
            new_entry: entry(5, "Preferred Languages", "primary", "Rust"),
            candidates: vec![
                entry(1, "Preferred Languages", "primary", "C++"),
                entry(3, "Preferred Languages", "primary", "Rust for tooling"),
            ],
        };
        let ids = input.candidate_ids();
        assert_eq!(
            ids,
            [EntryId(1), EntryId(3), EntryId(5)].into_iter().collect()
        );
    }

    #[test]
    fn test_prompt_json_shape() {
        let input = ConsolidationInput {
            new_entry: entry(2, "Testing Preferences", "runner", "nextest"),
            candidates: vec![entry(1, "Testing Preferences", "runner", "cargo test")],
        };
        let json = input.to_prompt_json();
        assert_eq!(json["new_memory"]["metadata"]["id"], 2);
        assert_eq!(json["similar_memories"][0]["metadata"]["id"], 1);
    }

    #[test]
    fn test_raw_decision_defaults_missing_lists() {
        let raw: RawDecision = serde_json::from_str("{}").unwrap();
        assert!(raw.consolidate_memories.is_empty());
        assert!(raw.keep_memories.is_empty());

        let raw: RawDecision = serde_json::from_str(
            r#"{
                "consolidate_memories": [
                    {"tag": "Preferred Languages", "feature": "primary",
                     "value": "Rust", "metadata": {"citations": [1, 5]}}
                ],
                "keep_memories": [3]
            }"#,
        )
        .unwrap();
        assert_eq!(raw.consolidate_memories[0].metadata.citations, vec![1, 5]);
        assert_eq!(raw.keep_memories, vec![3]);
    }

    #[test]
    fn test_covered_ids() {
        let decision = ConsolidationDecision {
            consolidate: vec![ConsolidatedEntry {
                tag: Tag::parse("Preferred Languages").unwrap(),
                feature: "primary".to_string(),
                value: "Rust".to_string(),
                citations: [EntryId(1), EntryId(5)].into_iter().collect(),
            }],
            keep: [EntryId(3)].into_iter().collect(),
        };
        assert_eq!(
            decision.covered_ids(),
            [EntryId(1), EntryId(3), EntryId(5)].into_iter().collect()
        );
    }
}
