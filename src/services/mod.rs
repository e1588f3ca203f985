//! Service layer.
//!
//! Stateless-ish behavior over the injected stores: token handling,
//! identity resolution, profile updates, and consolidation.

mod auth;
mod consolidation;
mod session;
mod update;

pub use auth::{IssuedToken, TokenAuthority, fingerprint};
pub use consolidation::{ConsolidationEngine, ConsolidationOutcome};
pub use session::{ResolvedSession, SessionResolver};
pub use update::{IngestOutcome, ProfileUpdater};
