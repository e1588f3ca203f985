//! Profile updates from session activity.
//!
//! Every memory the gateway accepts also flows through here: the
//! decision model reads the activity, answers with a command batch, the
//! batch applies atomically, and each resulting add gets a consolidation
//! round. A model that answers nothing useful makes this a no-op; the
//! episodic write the caller already made is never affected.

use crate::llm::{LlmProvider, parse_update_commands, prompts};
use crate::services::ConsolidationEngine;
use crate::storage::ProfileStore;
use crate::Result;
use std::sync::Arc;

/// What one ingest pass did to the profile.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Entries added.
    pub added: usize,
    /// Entries removed by delete commands.
    pub removed: usize,
    /// Command fragments skipped as malformed.
    pub anomalies: usize,
    /// Consolidation rounds that failed and were skipped.
    pub failed_consolidations: usize,
}

/// Drives the activity-to-profile pipeline.
pub struct ProfileUpdater {
    store: Arc<ProfileStore>,
    engine: Arc<ConsolidationEngine>,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl ProfileUpdater {
    /// Creates an updater with no decision model attached.
    #[must_use]
    pub fn new(store: Arc<ProfileStore>, engine: Arc<ConsolidationEngine>) -> Self {
        Self {
            store,
            engine,
            llm: None,
        }
    }

    /// Attaches a decision model.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Runs one ingest pass over a piece of session activity.
    ///
    /// Blocking: calls the decision model synchronously. Callers inside
    /// an async runtime should run this on a blocking thread.
    ///
    /// A wholly unparsable model answer is a logged no-op, and a failed
    /// consolidation round never undoes the adds that preceded it; only
    /// a failed model call itself surfaces as an error.
    pub fn ingest(&self, user_id: &str, activity: &str) -> Result<IngestOutcome> {
        let Some(llm) = &self.llm else {
            return Ok(IngestOutcome::default());
        };

        let response = llm.complete_with_system(&prompts::update_system_prompt(), activity)?;
        let (commands, anomalies) = parse_update_commands(&response);
        for anomaly in &anomalies {
            tracing::warn!(user_id, %anomaly, "skipped command fragment");
        }

        let mut outcome = IngestOutcome {
            anomalies: anomalies.len(),
            ..IngestOutcome::default()
        };
        if commands.is_empty() {
            return Ok(outcome);
        }

        let applied = self.store.apply(user_id, &commands);
        outcome.added = applied.added.len();
        outcome.removed = applied.removed;
        metrics::counter!("memgate_profile_added_total").increment(outcome.added as u64);
        metrics::counter!("memgate_profile_removed_total").increment(outcome.removed as u64);

        for entry in &applied.added {
            if let Err(err) = self.engine.consolidate_entry(user_id, entry) {
                outcome.failed_consolidations += 1;
                tracing::warn!(
                    user_id,
                    entry = %entry.id,
                    error = %err,
                    "consolidation round failed, entry left as added"
                );
            }
        }

        tracing::info!(
            user_id,
            added = outcome.added,
            removed = outcome.removed,
            anomalies = outcome.anomalies,
            "applied profile update"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsolidationConfig;
    use crate::{Error, Result};
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedLlm {
        /// Responses pop from the end, so push in reverse call order.
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn complete(&self, _prompt: &str) -> Result<String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }
    }

    fn updater(llm: Arc<ScriptedLlm>) -> (Arc<ProfileStore>, ProfileUpdater) {
        let store = Arc::new(ProfileStore::new());
        let engine = Arc::new(
            ConsolidationEngine::new(Arc::clone(&store), ConsolidationConfig::default())
                .with_llm(Arc::clone(&llm) as Arc<dyn LlmProvider>),
        );
        let updater = ProfileUpdater::new(Arc::clone(&store), engine).with_llm(llm);
        (store, updater)
    }

    #[test]
    fn test_ingest_applies_commands() {
        let llm = ScriptedLlm::new(vec![Ok(r#"{
            "0": {"command": "add", "tag": "Preferred Languages",
                  "feature": "primary", "value": "Rust"},
            "1": {"command": "add", "tag": "Development Tools",
                  "feature": "editor", "value": "helix"}
        }"#
        .to_string())]);
        let (store, updater) = updater(llm);

        let outcome = updater.ingest("alice", "i switched to helix btw").unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.anomalies, 0);
        assert_eq!(store.len("alice"), 2);
    }

    #[test]
    fn test_unparsable_answer_is_noop() {
        let llm = ScriptedLlm::new(vec![Ok("I would rather chat about the weather".to_string())]);
        let (store, updater) = updater(llm);

        let outcome = updater.ingest("alice", "hello").unwrap();
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.anomalies, 1);
        assert!(store.is_empty("alice"));
    }

    #[test]
    fn test_model_failure_surfaces() {
        let llm = ScriptedLlm::new(vec![Err(Error::Timeout {
            operation: "llm_complete".to_string(),
        })]);
        let (store, updater) = updater(llm);

        assert!(updater.ingest("alice", "hello").is_err());
        assert!(store.is_empty("alice"));
    }

    #[test]
    fn test_failed_consolidation_keeps_adds() {
        // First call answers the update, second answers the
        // consolidation round with garbage citations.
        let llm = ScriptedLlm::new(vec![
            Ok(r#"{
                "consolidate_memories": [
                    {"tag": "Preferred Languages", "feature": "primary",
                     "value": "x", "metadata": {"citations": [999]}}
                ]
            }"#
            .to_string()),
            Ok(r#"{
                "0": {"command": "add", "tag": "Preferred Languages",
                      "feature": "primary", "value": "Rust"}
            }"#
            .to_string()),
        ]);
        let (store, updater) = updater(llm);
        // Seed a sibling so the consolidation round actually runs.
        store.apply(
            "alice",
            &[crate::models::Command::Add {
                tag: crate::models::Tag::parse("Preferred Languages").unwrap(),
                feature: "primary".to_string(),
                value: "C++".to_string(),
            }],
        );

        let outcome = updater.ingest("alice", "rust now").unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.failed_consolidations, 1);
        assert_eq!(store.len("alice"), 2);
    }

    #[test]
    fn test_no_llm_is_noop() {
        let store = Arc::new(ProfileStore::new());
        let engine = Arc::new(ConsolidationEngine::new(
            Arc::clone(&store),
            ConsolidationConfig::default(),
        ));
        let updater = ProfileUpdater::new(Arc::clone(&store), engine);
        let outcome = updater.ingest("alice", "anything").unwrap();
        assert_eq!(outcome, IngestOutcome::default());
    }
}
