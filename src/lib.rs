//! Call view state for a real-time group call client.
//!
//! The crate derives everything a call screen renders from three feeds
//! (signaling memberships, media transport events, and reaction events):
//! reconciled media items, active speakers, window and grid modes, tile
//! ordering, layouts, floating reactions, and sound cues. All state lives
//! on single-owner tasks and is published through watch channels.

pub mod ids;
pub mod media;
pub mod reactions;
pub mod scope;
pub mod settings;
pub mod signaling;
pub mod sounds;
pub mod view;

// Test doubles shared with the integration tests.
pub mod test_utils;

pub use reactions::ReactionAggregator;
pub use settings::ViewSettings;
pub use signaling::CallSignaling;
pub use view::CallView;
