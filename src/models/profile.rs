//! Profile entries and their wire representation.

use super::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a profile entry.
///
/// Ids are allocated per user, monotonically, and never reused: citation
/// chains must keep pointing at the entries they were minted against even
/// after those entries are consolidated away.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Returns the next id in allocation order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single profile memory.
///
/// The (tag, feature) pair is the logical key; the store is multi-valued,
/// so several entries may share a key with different values. `citations`
/// records which earlier entries a consolidated entry absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Entry id, unique within the owning user's partition.
    pub id: EntryId,
    /// Taxonomy tag.
    pub tag: Tag,
    /// Free-form feature name under the tag.
    pub feature: String,
    /// The remembered value.
    pub value: String,
    /// Ids of the entries this one consolidated, empty for direct adds.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub citations: BTreeSet<EntryId>,
    /// Unix timestamp of creation.
    pub created_at: u64,
}

impl ProfileEntry {
    /// Creates a direct (uncited) entry.
    #[must_use]
    pub fn new(id: EntryId, tag: Tag, feature: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            tag,
            feature: feature.into(),
            value: value.into(),
            citations: BTreeSet::new(),
            created_at: crate::current_timestamp(),
        }
    }

    /// Adds citations to the entry.
    #[must_use]
    pub fn with_citations(mut self, citations: impl IntoIterator<Item = EntryId>) -> Self {
        self.citations.extend(citations);
        self
    }

    /// Serializes the entry into the shape the decision model sees.
    ///
    /// The model contract carries the id inside a `metadata` object rather
    /// than at the top level, so candidates and decisions share one shape.
    #[must_use]
    pub fn to_candidate_json(&self) -> serde_json::Value {
        serde_json::json!({
            "tag": self.tag.as_str(),
            "feature": self.feature,
            "value": self.value,
            "metadata": { "id": self.id.0 },
        })
    }
}
