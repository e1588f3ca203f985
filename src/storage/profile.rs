//! The profile store.
//!
//! Entries are partitioned per user. Each partition owns its id counter;
//! ids are monotonic and never reused, so citation chains stay valid
//! after the entries they point at are consolidated away. All mutation
//! happens under one lock per call and is atomic with respect to
//! readers.

use crate::models::{Command, EntryId, ProfileEntry, Tag};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

/// One user's partition.
#[derive(Debug, Default)]
struct UserProfile {
    /// Live entries keyed by id. BTreeMap keeps listing order stable.
    entries: BTreeMap<EntryId, ProfileEntry>,
    /// Next id to mint. Never decremented.
    next_id: EntryId,
}

impl UserProfile {
    fn mint_id(&mut self) -> EntryId {
        let id = self.next_id;
        self.next_id = self.next_id.next();
        id
    }
}

/// Outcome of applying a command batch.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Entries created by add commands, in command order.
    pub added: Vec<ProfileEntry>,
    /// Number of entries removed by delete commands.
    pub removed: usize,
}

/// An entry with its search relevance score.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    /// The matching entry.
    pub entry: ProfileEntry,
    /// Token-overlap score, higher is more relevant.
    pub score: u32,
}

/// Thread-safe, per-user profile storage.
#[derive(Debug, Default)]
pub struct ProfileStore {
    users: Mutex<HashMap<String, UserProfile>>,
}

impl ProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, UserProfile>> {
        // State stays consistent across a panicked writer because every
        // mutation completes or not at all under the guard.
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a validated command batch atomically.
    ///
    /// Adds mint fresh ids in command order. A delete with a value
    /// removes exact (tag, feature, value) matches, duplicates included;
    /// without a value it clears the whole (tag, feature) key. An empty
    /// batch is a no-op.
    pub fn apply(&self, user_id: &str, commands: &[Command]) -> ApplyOutcome {
        let mut users = self.lock();
        let profile = users.entry(user_id.to_string()).or_default();

        let mut outcome = ApplyOutcome::default();
        for command in commands {
            match command {
                Command::Add {
                    tag,
                    feature,
                    value,
                } => {
                    let id = profile.mint_id();
                    let entry = ProfileEntry::new(id, *tag, feature.clone(), value.clone());
                    profile.entries.insert(id, entry.clone());
                    outcome.added.push(entry);
                }
                Command::Delete {
                    tag,
                    feature,
                    value,
                } => {
                    let before = profile.entries.len();
                    profile.entries.retain(|_, entry| {
                        let key_match = entry.tag == *tag && entry.feature == *feature;
                        let value_match =
                            value.as_ref().is_none_or(|wanted| entry.value == *wanted);
                        !(key_match && value_match)
                    });
                    outcome.removed += before - profile.entries.len();
                }
            }
        }
        outcome
    }

    /// Applies a consolidation result atomically.
    ///
    /// Removes `remove` and mints one entry per item in `additions`,
    /// under a single lock so no reader observes the intermediate state.
    /// Returns the minted entries.
    pub fn consolidate(
        &self,
        user_id: &str,
        remove: &BTreeSet<EntryId>,
        additions: Vec<(Tag, String, String, BTreeSet<EntryId>)>,
    ) -> Vec<ProfileEntry> {
        let mut users = self.lock();
        let profile = users.entry(user_id.to_string()).or_default();

        for id in remove {
            profile.entries.remove(id);
        }

        let mut minted = Vec::with_capacity(additions.len());
        for (tag, feature, value, citations) in additions {
            let id = profile.mint_id();
            let entry = ProfileEntry::new(id, tag, feature, value).with_citations(citations);
            profile.entries.insert(id, entry.clone());
            minted.push(entry);
        }
        minted
    }

    /// Fetches one entry by id.
    #[must_use]
    pub fn entry(&self, user_id: &str, id: EntryId) -> Option<ProfileEntry> {
        self.lock()
            .get(user_id)
            .and_then(|profile| profile.entries.get(&id).cloned())
    }

    /// Lists a user's entries in id order, up to `limit`.
    #[must_use]
    pub fn entries_for(&self, user_id: &str, limit: usize) -> Vec<ProfileEntry> {
        self.lock().get(user_id).map_or_else(Vec::new, |profile| {
            profile.entries.values().take(limit).cloned().collect()
        })
    }

    /// Number of live entries for a user.
    #[must_use]
    pub fn len(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, |p| p.entries.len())
    }

    /// Whether the user has no entries.
    #[must_use]
    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Entries sharing a tag or overlapping tokens with the given entry.
    ///
    /// Used to pick consolidation candidates. The new entry itself is
    /// excluded; results come back in id order, capped at `limit`.
    #[must_use]
    pub fn similar_to(&self, user_id: &str, entry: &ProfileEntry, limit: usize) -> Vec<ProfileEntry> {
        let needle = tokenize(&format!("{} {}", entry.feature, entry.value));
        self.lock().get(user_id).map_or_else(Vec::new, |profile| {
            profile
                .entries
                .values()
                .filter(|candidate| candidate.id != entry.id)
                .filter(|candidate| {
                    candidate.tag == entry.tag
                        || overlap(&needle, &tokenize(&candidate.value)) > 0
                })
                .take(limit)
                .cloned()
                .collect()
        })
    }

    /// Token-overlap search over a user's entries.
    ///
    /// Scores each entry by how many query tokens appear in its tag,
    /// feature, or value. Zero-score entries are dropped; ties break by
    /// id so results are deterministic.
    #[must_use]
    pub fn search(&self, user_id: &str, query: &str, limit: usize) -> Vec<ScoredEntry> {
        let needle = tokenize(query);
        if needle.is_empty() {
            return Vec::new();
        }

        let users = self.lock();
        let Some(profile) = users.get(user_id) else {
            return Vec::new();
        };

        let mut scored: Vec<ScoredEntry> = profile
            .entries
            .values()
            .filter_map(|entry| {
                let haystack = tokenize(&format!(
                    "{} {} {}",
                    entry.tag.as_str(),
                    entry.feature,
                    entry.value
                ));
                let score = overlap(&needle, &haystack);
                (score > 0).then(|| ScoredEntry {
                    entry: entry.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.entry.id.cmp(&b.entry.id)));
        scored.truncate(limit);
        scored
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> u32 {
    u32::try_from(a.intersection(b).count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(s: &str) -> Tag {
        Tag::parse(s).unwrap()
    }

    fn add(t: &str, feature: &str, value: &str) -> Command {
        Command::Add {
            tag: tag(t),
            feature: feature.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_add_mints_monotonic_ids() {
        let store = ProfileStore::new();
        let outcome = store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust"),
                add("Preferred Languages", "primary", "Rust"),
                add("Development Tools", "editor", "helix"),
            ],
        );
        assert_eq!(outcome.added.len(), 3);
        assert_eq!(outcome.added[0].id, EntryId(0));
        assert_eq!(outcome.added[2].id, EntryId(2));
        // Duplicate (tag, feature, value) entries both live.
        assert_eq!(store.len("alice"), 3);
    }

    #[test]
    fn test_ids_never_reused_after_delete() {
        let store = ProfileStore::new();
        store.apply("alice", &[add("Preferred Languages", "primary", "Rust")]);
        store.apply(
            "alice",
            &[Command::Delete {
                tag: tag("Preferred Languages"),
                feature: "primary".to_string(),
                value: None,
            }],
        );
        let outcome = store.apply("alice", &[add("Preferred Languages", "primary", "Zig")]);
        assert_eq!(outcome.added[0].id, EntryId(1));
    }

    #[test]
    fn test_delete_without_value_clears_whole_key() {
        let store = ProfileStore::new();
        store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust"),
                add("Preferred Languages", "primary", "C++"),
                add("Preferred Languages", "scripting", "Python"),
            ],
        );
        let outcome = store.apply(
            "alice",
            &[Command::Delete {
                tag: tag("Preferred Languages"),
                feature: "primary".to_string(),
                value: None,
            }],
        );
        assert_eq!(outcome.removed, 2);
        assert_eq!(store.len("alice"), 1);
    }

    #[test]
    fn test_batch_applies_in_command_order() {
        let store = ProfileStore::new();
        // The delete lands between the two adds, so only the second
        // value survives the batch.
        let outcome = store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Go"),
                Command::Delete {
                    tag: tag("Preferred Languages"),
                    feature: "primary".to_string(),
                    value: Some("Go".to_string()),
                },
                add("Preferred Languages", "primary", "Rust"),
            ],
        );
        assert_eq!(outcome.added.len(), 2);
        assert_eq!(outcome.removed, 1);

        let remaining = store.entries_for("alice", 10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value, "Rust");
        assert_eq!(remaining[0].id, EntryId(1));
    }

    #[test]
    fn test_delete_of_absent_key_is_noop() {
        let store = ProfileStore::new();
        store.apply("alice", &[add("Preferred Languages", "primary", "Rust")]);
        let outcome = store.apply(
            "alice",
            &[Command::Delete {
                tag: tag("Development Tools"),
                feature: "editor".to_string(),
                value: None,
            }],
        );
        assert_eq!(outcome.removed, 0);
        assert_eq!(store.len("alice"), 1);
    }

    #[test]
    fn test_delete_with_value_is_exact() {
        let store = ProfileStore::new();
        store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust"),
                add("Preferred Languages", "primary", "C++"),
            ],
        );
        let outcome = store.apply(
            "alice",
            &[Command::Delete {
                tag: tag("Preferred Languages"),
                feature: "primary".to_string(),
                value: Some("C++".to_string()),
            }],
        );
        assert_eq!(outcome.removed, 1);
        let remaining = store.entries_for("alice", 10);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value, "Rust");
    }

    #[test]
    fn test_users_are_partitioned() {
        let store = ProfileStore::new();
        store.apply("alice", &[add("Preferred Languages", "primary", "Rust")]);
        store.apply("bob", &[add("Preferred Languages", "primary", "Go")]);

        assert_eq!(store.len("alice"), 1);
        assert_eq!(store.len("bob"), 1);
        assert_eq!(store.entries_for("alice", 10)[0].value, "Rust");
        // Partitions keep independent id counters.
        assert_eq!(store.entries_for("bob", 10)[0].id, EntryId(0));
    }

    #[test]
    fn test_consolidate_swaps_atomically() {
        let store = ProfileStore::new();
        let outcome = store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust"),
                add("Preferred Languages", "primary", "Rust for CLI tools"),
            ],
        );
        let ids: BTreeSet<EntryId> = outcome.added.iter().map(|e| e.id).collect();

        let minted = store.consolidate(
            "alice",
            &ids,
            vec![(
                tag("Preferred Languages"),
                "primary".to_string(),
                "Rust, especially for CLI tools".to_string(),
                ids.clone(),
            )],
        );

        assert_eq!(minted.len(), 1);
        assert_eq!(minted[0].id, EntryId(2));
        assert_eq!(minted[0].citations, ids);
        assert_eq!(store.len("alice"), 1);
    }

    #[test]
    fn test_search_scores_by_token_overlap() {
        let store = ProfileStore::new();
        store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust for systems work"),
                add("Development Tools", "editor", "helix with rust-analyzer"),
                add("Database Preferences", "engine", "Postgres"),
            ],
        );

        let results = store.search("alice", "rust systems", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].entry.value, "Rust for systems work");
        assert!(results[0].score > results[1].score);

        assert!(store.search("alice", "kubernetes", 10).is_empty());
        assert!(store.search("alice", "", 10).is_empty());
    }

    #[test]
    fn test_similar_to_matches_tag_or_tokens() {
        let store = ProfileStore::new();
        let outcome = store.apply(
            "alice",
            &[
                add("Preferred Languages", "primary", "Rust"),
                add("Development Tools", "editor", "helix"),
                add("Testing Preferences", "runner", "prefers Rust nextest"),
            ],
        );
        let new_entry = &outcome.added[0];

        let similar = store.similar_to("alice", new_entry, 10);
        let values: Vec<&str> = similar.iter().map(|e| e.value.as_str()).collect();
        assert!(values.contains(&"prefers Rust nextest"));
        assert!(!values.contains(&"helix"));
        assert!(!values.contains(&"Rust"), "entry must not match itself");
    }
}
