//! Decision model abstraction.
//!
//! The gateway defers two judgments to an external LLM: turning raw
//! session activity into profile commands, and deciding which profile
//! entries to consolidate. Both travel through the [`LlmProvider`]
//! trait; parsing of the model's output is tolerant of markdown fences
//! and reasoning preambles but strict about the schemas themselves.

mod openai;
pub mod prompts;

pub use openai::OpenAiCompatClient;

use crate::models::{
    Command, CommandAnomaly, ConsolidatedEntry, ConsolidationDecision, ConsolidationInput,
    RawDecision, Tag, parse_command_document,
};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::time::Duration;

/// Trait for decision model providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Generates a completion with a system prompt.
    ///
    /// Default implementation concatenates system and user prompts.
    /// Providers should override this to use native system prompt
    /// support.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete_with_system(&self, system: &str, user: &str) -> Result<String> {
        let combined = format!("{system}\n\n---\n\nUser message:\n{user}");
        self.complete(&combined)
    }
}

/// HTTP client configuration for LLM providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }
}

/// Builds a blocking HTTP client for LLM requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Parses a command document from raw model output.
///
/// Reasoning-model preamble and markdown fences are stripped before the
/// document itself is parsed; per-fragment failures come back as
/// anomalies rather than errors.
#[must_use]
pub fn parse_update_commands(response: &str) -> (Vec<Command>, Vec<CommandAnomaly>) {
    let cleaned = strip_think(response);
    parse_command_document(extract_json_from_response(cleaned))
}

/// Parses and structurally validates a consolidation decision.
///
/// Validation rules: every tag must be in the taxonomy, every
/// consolidate entry must cite at least one id, and every cited or kept
/// id must come from the round's candidate set. Any violation rejects
/// the whole decision.
pub fn parse_consolidation_decision(
    response: &str,
    input: &ConsolidationInput,
) -> Result<ConsolidationDecision> {
    let cleaned = extract_json_from_response(strip_think(response));
    let raw: RawDecision = serde_json::from_str(cleaned).map_err(|e| {
        Error::OracleMalformedResponse(format!("decision is not valid JSON: {e}"))
    })?;

    let allowed = input.candidate_ids();

    let mut keep = BTreeSet::new();
    for id in raw.keep_memories {
        let id = crate::models::EntryId(id);
        if !allowed.contains(&id) {
            return Err(Error::OracleMalformedResponse(format!(
                "keep_memories references id {id} outside the candidate set"
            )));
        }
        keep.insert(id);
    }

    let mut consolidate = Vec::with_capacity(raw.consolidate_memories.len());
    for entry in raw.consolidate_memories {
        let tag = Tag::parse(&entry.tag).ok_or_else(|| {
            Error::OracleMalformedResponse(format!("tag '{}' is not in the taxonomy", entry.tag))
        })?;

        if entry.metadata.citations.is_empty() {
            return Err(Error::OracleMalformedResponse(
                "consolidate entry has no citations".to_string(),
            ));
        }

        let mut citations = BTreeSet::new();
        for id in entry.metadata.citations {
            let id = crate::models::EntryId(id);
            if !allowed.contains(&id) {
                return Err(Error::OracleMalformedResponse(format!(
                    "citation references id {id} outside the candidate set"
                )));
            }
            citations.insert(id);
        }

        consolidate.push(ConsolidatedEntry {
            tag,
            feature: entry.feature,
            value: entry.value,
            citations,
        });
    }

    Ok(ConsolidationDecision { consolidate, keep })
}

/// Strips a leading `<think>...</think>` block from reasoning models.
#[must_use]
pub fn strip_think(response: &str) -> &str {
    let trimmed = response.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<think>") {
        if let Some(end) = rest.find("</think>") {
            return rest[end + "</think>".len()..].trim_start();
        }
    }
    response
}

/// Extracts JSON from LLM response, handling markdown code blocks.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
