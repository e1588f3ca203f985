//! In-memory storage.
//!
//! State lives for the lifetime of the process and is injected into the
//! services that need it; nothing here touches disk.

mod profile;

pub use profile::{ApplyOutcome, ProfileStore, ScoredEntry};
