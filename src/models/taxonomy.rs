//! The fixed tag taxonomy for profile memory.
//!
//! Profile entries are a two-level key-value store: the outer key is the
//! *tag*, the inner key the *feature*. Tags come from a closed vocabulary
//! of developer-preference categories; features are open strings. The
//! decision model may invent features freely but never tags, so `Tag` is
//! only constructible through [`Tag::parse`].

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Closed vocabulary of profile tags.
///
/// Sorted so membership checks can binary-search.
pub const TAXONOMY: &[&str] = &[
    "API Design Philosophy",
    "Accessibility Awareness",
    "Algorithm Knowledge",
    "Architecture Preferences",
    "Async Programming Comfort",
    "Backend Preferences",
    "Build Tool Preferences",
    "Code Complexity Tolerance",
    "Code Organization Philosophy",
    "Code Quality Standards",
    "Code Review Habits",
    "Code Sharing Habits",
    "Coding Style Preferences",
    "Collaboration Style",
    "Comment and Documentation Style",
    "Communication Preferences",
    "Data Structure Preferences",
    "Database Preferences",
    "Debugging Approach",
    "Dependency Management Philosophy",
    "Design Pattern Preferences",
    "DevOps Familiarity",
    "Development Tools",
    "Documentation Habits",
    "Error Handling Philosophy",
    "Frontend Preferences",
    "Functional vs OOP Preference",
    "Internationalization Experience",
    "Learning Style",
    "Mobile Development Experience",
    "Naming Convention Preferences",
    "Performance Optimization Mindset",
    "Preferred Frameworks",
    "Preferred Languages",
    "Problem-Solving Approach",
    "Productivity Patterns",
    "Refactoring Philosophy",
    "Security Consciousness",
    "Technical Expertise Areas",
    "Technical Learning Goals",
    "Technology Adoption",
    "Testing Preferences",
    "Tool Automation Habits",
    "Type Safety Preferences",
    "Typical Project Types",
    "UI/UX Sensitivity",
    "Version Control Habits",
    "Work Environment Preferences",
];

/// A validated member of the fixed tag taxonomy.
///
/// Internally a `&'static str` borrowed from [`TAXONOMY`], so a `Tag` is
/// valid by construction and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(&'static str);

impl Tag {
    /// Parses a tag, returning `None` for anything outside the taxonomy.
    ///
    /// Matching is exact after trimming surrounding whitespace; the
    /// taxonomy is a closed set and near-misses are rejected rather than
    /// guessed at.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        TAXONOMY
            .binary_search(&trimmed)
            .ok()
            .map(|idx| Self(TAXONOMY[idx]))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("tag '{s}' is not in the taxonomy")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_is_sorted() {
        let mut sorted = TAXONOMY.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, TAXONOMY, "TAXONOMY must stay sorted for lookup");
    }

    #[test]
    fn test_parse_known_tags() {
        assert!(Tag::parse("Preferred Languages").is_some());
        assert!(Tag::parse("Testing Preferences").is_some());
        assert!(Tag::parse("  Version Control Habits  ").is_some());
    }

    #[test]
    fn test_parse_rejects_unknown_tags() {
        assert!(Tag::parse("Favorite Snacks").is_none());
        assert!(Tag::parse("preferred languages").is_none());
        assert!(Tag::parse("").is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let tag = Tag::parse("Debugging Approach").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"Debugging Approach\"");

        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }

    #[test]
    fn test_deserialize_rejects_invented_tag() {
        let result: Result<Tag, _> = serde_json::from_str("\"Lunch Preferences\"");
        assert!(result.is_err());
    }
}
