//! Hand raises and ephemeral reactions.
//!
//! Both travel over the signaling room as reaction events targeting a
//! participant's membership event: hand raises as annotation reactions with
//! the [`RAISED_HAND_KEY`], ephemeral reactions as call-reaction events
//! carrying an emoji and a catalog name. The [`ReactionAggregator`] folds
//! the event stream into per-participant state.

mod aggregator;

pub use aggregator::{
    REACTION_ACTIVE_TIME, REACTION_SWEEP_SLACK, ReactionAggregator, ReactionError,
};

use chrono::{DateTime, Utc};

use crate::ids::EventId;

/// Annotation key that marks a raised hand (U+270B, no variation selector).
pub const RAISED_HAND_KEY: &str = "\u{270B}";

/// Name under which unrecognized emoji are aggregated.
pub const GENERIC_REACTION_NAME: &str = "generic";

/// One entry of the reaction catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionOption {
    pub name: String,
    pub emoji: String,
    /// Whether a dedicated sound cue exists for this reaction.
    pub sound: bool,
}

impl ReactionOption {
    fn from_catalog(entry: &(&str, &str, bool)) -> Self {
        Self {
            name: entry.0.to_string(),
            emoji: entry.1.to_string(),
            sound: entry.2,
        }
    }

    /// The fallback for emoji outside the catalog; rendered as received,
    /// played with the generic cue.
    pub fn generic(emoji: impl Into<String>) -> Self {
        Self {
            name: GENERIC_REACTION_NAME.to_string(),
            emoji: emoji.into(),
            sound: false,
        }
    }

    pub fn is_generic(&self) -> bool {
        self.name == GENERIC_REACTION_NAME
    }
}

const CATALOG: &[(&str, &str, bool)] = &[
    ("thumbsup", "👍", false),
    ("heart", "❤", false),
    ("laugh", "😂", false),
    ("wave", "👋", false),
    ("surprise", "😮", false),
    ("clap", "👏", true),
    ("party", "🎉", true),
    ("cat", "🐱", true),
    ("dog", "🐶", true),
    ("crickets", "🦗", true),
];

/// The full reaction catalog, in picker order.
pub fn reaction_catalog() -> Vec<ReactionOption> {
    CATALOG.iter().map(ReactionOption::from_catalog).collect()
}

/// Look up a catalog entry by its wire name.
pub fn find_reaction(name: &str) -> Option<ReactionOption> {
    CATALOG
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(ReactionOption::from_catalog)
}

/// A participant's raised hand, as recorded by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedHandInfo {
    /// The membership event the reaction targets.
    pub membership_event_id: EventId,
    /// The reaction event itself; redacting it lowers the hand.
    pub reaction_event_id: EventId,
    /// Origin timestamp of the reaction event, used for display order.
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_by_name() {
        let party = find_reaction("party").unwrap();
        assert_eq!(party.emoji, "🎉");
        assert!(party.sound);
        assert!(find_reaction("doesnotexist").is_none());
    }

    #[test]
    fn generic_reaction_carries_the_received_emoji() {
        let option = ReactionOption::generic("🦄");
        assert!(option.is_generic());
        assert_eq!(option.emoji, "🦄");
        assert!(!option.sound);
    }
}
