//! # Memgate
//!
//! A session-scoped memory gateway for AI coding assistants.
//!
//! Memgate sits between coding assistants and a memory backend. It
//! authenticates every request with opaque bearer tokens, resolves a
//! stable (user, session) identity from headers and parameters, and owns
//! the developer-preference profile store: a tag/feature-keyed,
//! multi-valued key-value store mutated through an explicit command
//! protocol and compacted by an LLM-driven consolidation pass that
//! preserves provenance through citations.
//!
//! ## Features
//!
//! - Token-authenticated HTTP gateway with exempt health/login paths
//! - Profile memory organized by a fixed tag taxonomy
//! - Ordered add/delete command batches with validate-then-apply semantics
//! - Consolidation that merges similar entries and keeps citation chains
//! - Transparent streaming pass-through of backend responses
//!
//! ## Example
//!
//! ```rust,ignore
//! use memgate::config::GatewayConfig;
//! use memgate::gateway::Gateway;
//!
//! let config = GatewayConfig::load_default();
//! let gateway = Gateway::new(config);
//! gateway.serve().await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod episodic;
pub mod gateway;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::GatewayConfig;
pub use llm::LlmProvider;
pub use models::{
    Command, ConsolidationDecision, ConsolidationInput, EntryId, ProfileEntry, Session, Tag,
};
pub use services::{ConsolidationEngine, ProfileUpdater, SessionResolver, TokenAuthority};
pub use storage::ProfileStore;

/// Error type for memgate operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. Every variant has a stable wire code (see
/// [`Error::code`]) that the gateway serializes into error responses.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Missing or invalid credential on a protected path.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Login was attempted but no credential pair is configured.
    #[error("authentication is not configured")]
    AuthNotConfigured,

    /// Username/password pair did not match the configured credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Logout (or another token operation) without a token supplied.
    #[error("no token supplied")]
    MissingToken,

    /// The supplied token is not held by the token store.
    #[error("token not found")]
    TokenNotFound,

    /// Revocation was attempted on the static gateway token.
    ///
    /// The static token is configured out-of-band and is not store-backed,
    /// so revoking it must fail loudly instead of silently succeeding.
    #[error("the static gateway token cannot be revoked")]
    UnrevokableToken,

    /// No user identity could be resolved under the strict identity policy.
    #[error("no user identity supplied")]
    MissingIdentity,

    /// A command referenced a tag outside the fixed taxonomy.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// A command fragment could not be parsed into the command protocol.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// The operation requires a resolvable session and none was supplied.
    #[error("a session id is required for this operation")]
    SessionRequired,

    /// An upstream service could not be reached or answered with a failure.
    #[error("upstream service '{service}' unavailable: {cause}")]
    BackendUnavailable {
        /// Which upstream failed (`episodic` or `llm`).
        service: String,
        /// The underlying cause.
        cause: String,
    },

    /// The decision model returned a structurally invalid decision.
    ///
    /// Raised when a consolidation decision invents a tag, cites an id
    /// outside the candidate set, or (under the `reject` coverage policy)
    /// omits a candidate from both the keep set and every citation list.
    #[error("malformed decision from the model: {0}")]
    OracleMalformedResponse(String),

    /// An outbound call exceeded its configured deadline.
    #[error("operation '{operation}' timed out")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// Unexpected internal failure. Detail is logged, never echoed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable wire code for this error.
    ///
    /// These codes are part of the gateway's response contract; callers
    /// match on them, so they never change even when messages do.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::AuthNotConfigured => "auth_not_configured",
            Self::InvalidCredentials => "invalid_credentials",
            Self::MissingToken => "missing_token",
            Self::TokenNotFound => "token_not_found",
            Self::UnrevokableToken => "unrevokable_token",
            Self::MissingIdentity => "missing_identity",
            Self::InvalidTag(_) => "invalid_tag",
            Self::MalformedCommand(_) => "malformed_command",
            Self::SessionRequired => "session_required",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::OracleMalformedResponse(_) => "oracle_malformed_response",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for memgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so token expiry and entry bookkeeping agree on one clock.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
