//! Core domain types.

mod command;
mod consolidation;
mod profile;
mod session;
mod taxonomy;

pub use command::{Command, CommandAnomaly, parse_command_document};
pub use consolidation::{
    ConsolidatedEntry, ConsolidationDecision, ConsolidationInput, RawConsolidateEntry,
    RawConsolidateMetadata, RawDecision,
};
pub use profile::{EntryId, ProfileEntry};
pub use session::Session;
pub use taxonomy::{TAXONOMY, Tag};
