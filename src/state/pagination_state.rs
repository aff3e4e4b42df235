/// Pagination state definitions for tracking per-category progress
///
/// This module defines every state a category's listing pagination can be in.
use std::fmt;

/// Represents the current pagination state of one category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationState {
    // ===== Active States =====
    /// Category is known but no listing page has been requested yet
    Init,

    /// A listing page task is queued or being fetched
    Fetching,

    /// The last page had records and a next page; a continuation was emitted
    HasMore,

    // ===== Terminal States =====
    /// Pagination finished normally (empty page, page cap, or no next page)
    Exhausted,

    /// Retries were exhausted on some page; earlier results are kept
    Failed,
}

impl PaginationState {
    /// Returns true if this is a terminal state (no further pages will be fetched)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed)
    }

    /// Returns true if pagination may still emit tasks
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from this state to `next` is a legal transition
    ///
    /// `HasMore` is transient: a continuation task puts the category straight back
    /// into `Fetching`.
    pub fn can_transition_to(&self, next: PaginationState) -> bool {
        use PaginationState::*;
        matches!(
            (self, next),
            (Init, Fetching)
                | (Init, Failed)
                | (Fetching, HasMore)
                | (Fetching, Exhausted)
                | (Fetching, Failed)
                | (HasMore, Fetching)
        )
    }

    /// Converts the state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Fetching => "fetching",
            Self::HasMore => "has_more",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "init" => Some(Self::Init),
            "fetching" => Some(Self::Fetching),
            "has_more" => Some(Self::HasMore),
            "exhausted" => Some(Self::Exhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible pagination states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Init,
            Self::Fetching,
            Self::HasMore,
            Self::Exhausted,
            Self::Failed,
        ]
    }
}

impl fmt::Display for PaginationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
