//! Profile consolidation.
//!
//! After every add the new entry is weighed against similar existing
//! entries. The decision model may merge several entries into one
//! richer replacement (citing what it absorbed), keep entries as-is, or
//! leave them out entirely. The engine validates the decision against
//! the candidate set before anything mutates, then applies it through
//! one atomic store operation.

use crate::config::{ConsolidationConfig, CoveragePolicy};
use crate::llm::{LlmProvider, parse_consolidation_decision, prompts};
use crate::models::{ConsolidationDecision, ConsolidationInput, EntryId, ProfileEntry};
use crate::storage::ProfileStore;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What one consolidation round did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsolidationOutcome {
    /// Replacement entries minted.
    pub merged: usize,
    /// Candidates explicitly kept.
    pub kept: usize,
    /// Entries removed, for any reason.
    pub removed: usize,
    /// Candidates removed only because the decision ignored them.
    pub uncovered: usize,
}

/// Runs consolidation rounds against the profile store.
pub struct ConsolidationEngine {
    store: Arc<ProfileStore>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: ConsolidationConfig,
}

impl ConsolidationEngine {
    /// Creates an engine with no decision model attached.
    ///
    /// Without a model every round is a no-op; the gateway still runs,
    /// it just never compacts profiles.
    #[must_use]
    pub fn new(store: Arc<ProfileStore>, config: ConsolidationConfig) -> Self {
        Self {
            store,
            llm: None,
            config,
        }
    }

    /// Attaches a decision model.
    #[must_use]
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Runs one consolidation round for a freshly added entry.
    ///
    /// Blocking: calls the decision model synchronously. Callers inside
    /// an async runtime should run this on a blocking thread.
    pub fn consolidate_entry(
        &self,
        user_id: &str,
        new_entry: &ProfileEntry,
    ) -> Result<ConsolidationOutcome> {
        let Some(llm) = &self.llm else {
            return Ok(ConsolidationOutcome::default());
        };
        if !self.config.enabled {
            return Ok(ConsolidationOutcome::default());
        }

        let candidates = self
            .store
            .similar_to(user_id, new_entry, self.config.max_candidates);
        if candidates.is_empty() {
            tracing::debug!(user_id, entry = %new_entry.id, "no consolidation candidates");
            return Ok(ConsolidationOutcome::default());
        }

        let input = ConsolidationInput {
            new_entry: new_entry.clone(),
            candidates,
        };

        let response = llm.complete_with_system(
            &prompts::consolidation_system_prompt(),
            &input.to_prompt_json().to_string(),
        )?;
        let decision = parse_consolidation_decision(&response, &input)?;

        self.apply(user_id, &input, &decision)
    }

    /// Applies a validated decision to the store.
    ///
    /// The removal set is every candidate the decision did not keep,
    /// except that the new entry survives unless a replacement cites it.
    /// Coverage is judged over the stored candidates only; a decision
    /// that never mentions the new entry is complete, since the entry
    /// survives by default. Under the reject coverage policy any
    /// uncovered candidate aborts the round before mutation.
    fn apply(
        &self,
        user_id: &str,
        input: &ConsolidationInput,
        decision: &ConsolidationDecision,
    ) -> Result<ConsolidationOutcome> {
        let candidate_ids = input.candidate_ids();
        let covered = decision.covered_ids();
        let cited: BTreeSet<EntryId> = decision
            .consolidate
            .iter()
            .flat_map(|entry| entry.citations.iter().copied())
            .collect();

        let uncovered: BTreeSet<EntryId> = input
            .candidates
            .iter()
            .map(|entry| entry.id)
            .filter(|id| !covered.contains(id))
            .collect();

        if self.config.coverage == CoveragePolicy::Reject && !uncovered.is_empty() {
            return Err(Error::OracleMalformedResponse(format!(
                "decision leaves {} candidate(s) uncovered",
                uncovered.len()
            )));
        }

        let new_id = input.new_entry.id;
        let remove: BTreeSet<EntryId> = candidate_ids
            .iter()
            .filter(|id| !decision.keep.contains(id))
            .filter(|&&id| id != new_id || cited.contains(&id))
            .copied()
            .collect();

        let uncovered_removed = uncovered.iter().filter(|id| remove.contains(id)).count();
        if uncovered_removed > 0 {
            tracing::warn!(
                user_id,
                uncovered = uncovered_removed,
                "decision dropped candidates without keeping or citing them"
            );
        }

        let additions: Vec<_> = decision
            .consolidate
            .iter()
            .map(|entry| {
                (
                    entry.tag,
                    entry.feature.clone(),
                    entry.value.clone(),
                    entry.citations.clone(),
                )
            })
            .collect();

        let outcome = ConsolidationOutcome {
            merged: additions.len(),
            kept: decision.keep.len(),
            removed: remove.len(),
            uncovered: uncovered_removed,
        };

        let minted = self.store.consolidate(user_id, &remove, additions);
        metrics::counter!("memgate_consolidation_merged_total").increment(minted.len() as u64);
        metrics::counter!("memgate_consolidation_removed_total").increment(remove.len() as u64);

        tracing::info!(
            user_id,
            merged = outcome.merged,
            kept = outcome.kept,
            removed = outcome.removed,
            "applied consolidation decision"
        );
        Ok(outcome)
    }
}
