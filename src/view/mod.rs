//! The call view: reconciled media items, window and grid modes, tile
//! ordering, and the layout state machine.
//!
//! Architecture:
//! - [`CallView`] is the façade: it spawns the engine task and exposes its
//!   outputs as watch channels.
//! - The engine task owns all mutable state; inputs arrive over one channel
//!   and every input triggers a full derivation pass.
//! - The reconciler maps call memberships and transport participants to
//!   long-lived [`MediaItem`] handles.
//! - Layout routing picks an arrangement from the window mode, the grid
//!   mode, and the reconciled items.

mod call_view;
mod engine;
mod layout;
mod media_item;
mod reconcile;
mod speaker;
mod tiles;

pub use call_view::CallView;
pub use engine::{FOOTER_HIDE_DELAY, FloatingReaction};
pub use layout::{
    FLAT_MAX_HEIGHT, GridMode, Layout, NARROW_MAX_WIDTH, PIP_MAX_HEIGHT, PIP_MAX_WIDTH,
    SortingBin, WindowMode,
};
pub use media_item::{
    ControlRequest, LocalVolume, MediaControl, MediaItem, ScreenShare, ScreenShareState,
    UserMedia, UserMediaState,
};
pub use reconcile::{MemberChanges, POST_FOCUS_SWITCH_HOLD};
pub use speaker::{SPEAKING_OFF_DELAY, SPEAKING_ON_DELAY, SpeakerState};
pub use tiles::{GridTile, SpotlightTile};
