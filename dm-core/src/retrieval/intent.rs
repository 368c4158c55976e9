//! Keyword-based query intent classification.

use serde::{Deserialize, Serialize};

const FUTURE_KEYWORDS: &[&str] = &[
    "what happens next",
    "what will happen",
    "future",
    "later in the",
    "eventually",
    "final",
    "ending",
    "outcome",
    "spoiler",
    "how does it end",
    "what's coming",
];

const BACKGROUND_KEYWORDS: &[&str] = &[
    "history",
    "background",
    "backstory",
    "origin",
    "who is",
    "who was",
    "heritage",
    "childhood",
    "family",
    "past life",
];

const IMMEDIATE_KEYWORDS: &[&str] = &[
    "right now",
    "right here",
    "around me",
    "around us",
    "this room",
    "look around",
    "nearby",
    "in front of",
    "currently",
    "at the moment",
];

const LOCATION_KEYWORDS: &[&str] = &[
    "where",
    "location",
    "place",
    "village",
    "town",
    "castle",
    "travel",
    "map",
    "directions",
    "go to",
    "road to",
];

const RECALL_KEYWORDS: &[&str] = &[
    "last session",
    "last time",
    "previous session",
    "previously",
    "what happened",
    "remember",
    "recap",
    "earlier",
    "did we",
    "we did",
    "so far",
];

const PLANNING_KEYWORDS: &[&str] = &[
    "prepare",
    "prep ",
    "plan ",
    "plan?",
    "planning",
    "next encounter",
    "as the dm",
    "as dm",
    "next session",
    "dm notes",
    "run this",
    "balance",
];

/// What a query is after. Flags are independent; any combination may be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub seeks_future_info: bool,
    pub character_background: bool,
    pub immediate_context: bool,
    pub location_inquiry: bool,
    pub session_recall: bool,
    pub dm_planning: bool,
}

impl QueryIntent {
    /// Classify a query. Pure and deterministic; case-insensitive substring matching.
    pub fn classify(query: &str) -> Self {
        let query = query.to_lowercase();
        let any = |keywords: &[&str]| keywords.iter().any(|k| query.contains(k));

        Self {
            seeks_future_info: any(FUTURE_KEYWORDS),
            character_background: any(BACKGROUND_KEYWORDS),
            immediate_context: any(IMMEDIATE_KEYWORDS),
            location_inquiry: any(LOCATION_KEYWORDS),
            session_recall: any(RECALL_KEYWORDS),
            dm_planning: any(PLANNING_KEYWORDS),
        }
    }

    pub fn is_character_focused(&self) -> bool {
        self.character_background
    }

    pub fn is_location_focused(&self) -> bool {
        self.location_inquiry
    }
}
