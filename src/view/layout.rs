//! Window modes, grid mode auto-selection, tile sorting, and the layout
//! descriptions the engine publishes.

use std::fmt;
use std::sync::Arc;

use super::media_item::{MediaItem, UserMedia};
use super::tiles::{GridTile, SpotlightTile};
use crate::ids::MediaKey;

/// Upper bounds for the picture-in-picture window mode.
pub const PIP_MAX_WIDTH: f64 = 340.0;
pub const PIP_MAX_HEIGHT: f64 = 400.0;
/// Viewports at most this wide are the narrow (portrait phone) mode.
pub const NARROW_MAX_WIDTH: f64 = 600.0;
/// Viewports at most this tall are the flat (landscape phone) mode.
pub const FLAT_MAX_HEIGHT: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    #[default]
    Normal,
    Narrow,
    Flat,
    Pip,
}

impl WindowMode {
    /// Classify a viewport. The PIP check runs first so that a window both
    /// small and short lands in PIP rather than narrow.
    pub fn from_viewport(width: f64, height: f64, pip_enabled: bool) -> Self {
        if pip_enabled || (width <= PIP_MAX_WIDTH && height <= PIP_MAX_HEIGHT) {
            Self::Pip
        } else if width <= NARROW_MAX_WIDTH {
            Self::Narrow
        } else if height <= FLAT_MAX_HEIGHT {
            Self::Flat
        } else {
            Self::Normal
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Narrow => "narrow",
            Self::Flat => "flat",
            Self::Pip => "pip",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    Grid,
    Spotlight,
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grid => "grid",
            Self::Spotlight => "spotlight",
        })
    }
}

/// Grid mode with a user-selection overlay on the automatic rule.
///
/// Spotlight selections are sticky until the user picks again. Grid
/// selections only hold until the conditions that drive the automatic rule
/// change, at which point the automatic rule takes back over.
#[derive(Debug, Default)]
pub struct GridModeTracker {
    selection: Option<GridMode>,
    /// The (remote screen shares, window mode) pair at Grid selection time.
    context: Option<(bool, WindowMode)>,
}

impl GridModeTracker {
    pub fn select(&mut self, mode: GridMode, remote_screen_shares: bool, window_mode: WindowMode) {
        self.selection = Some(mode);
        self.context = match mode {
            GridMode::Grid => Some((remote_screen_shares, window_mode)),
            GridMode::Spotlight => None,
        };
    }

    /// The effective mode for the current conditions, expiring a Grid
    /// selection whose context has changed.
    pub fn resolve(&mut self, remote_screen_shares: bool, window_mode: WindowMode) -> GridMode {
        if self.selection == Some(GridMode::Grid)
            && self.context.is_some_and(|ctx| ctx != (remote_screen_shares, window_mode))
        {
            self.selection = None;
            self.context = None;
        }
        self.selection
            .unwrap_or_else(|| Self::auto(remote_screen_shares, window_mode))
    }

    fn auto(remote_screen_shares: bool, window_mode: WindowMode) -> GridMode {
        if remote_screen_shares || window_mode == WindowMode::Flat {
            GridMode::Spotlight
        } else {
            GridMode::Grid
        }
    }
}

/// Priority bins for grid ordering. Earlier bins display first; items
/// within a bin keep their reconciled order, except raised hands which
/// order by raise time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortingBin {
    SelfAlwaysShown,
    Presenters,
    Speakers,
    HandRaised,
    Video,
    NoVideo,
    SelfNotAlwaysShown,
}

pub(crate) fn sorting_bin(item: &UserMedia) -> SortingBin {
    if item.is_local() {
        return if item.always_shown() {
            SortingBin::SelfAlwaysShown
        } else {
            SortingBin::SelfNotAlwaysShown
        };
    }
    let state = item.current_state();
    if state.sharing_screen {
        SortingBin::Presenters
    } else if item.is_active_speaker() {
        SortingBin::Speakers
    } else if item.raised_hand_at().is_some() {
        SortingBin::HandRaised
    } else if state.video_enabled {
        SortingBin::Video
    } else {
        SortingBin::NoVideo
    }
}

/// Stable-sort user media into bin order, base order preserved.
pub(crate) fn sort_user_media(items: &[Arc<UserMedia>]) -> Vec<Arc<UserMedia>> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|item| {
        let bin = sorting_bin(item);
        let raised_at = match bin {
            SortingBin::HandRaised => item.raised_hand_at().map(|t| t.timestamp_millis()),
            _ => None,
        };
        (bin, raised_at)
    });
    sorted
}

/// Pick the spotlit speaker, keeping the previous pick sticky: they stay
/// while they remain a debounced active speaker and are remote, then the
/// chain falls back through any speaking remote, the previous pick if still
/// present, any remote, and finally the local item.
pub(crate) fn select_spotlight_speaker(
    items: &[Arc<UserMedia>],
    previous: Option<&MediaKey>,
) -> Option<Arc<UserMedia>> {
    let previous = previous.and_then(|key| items.iter().find(|m| m.key() == key));
    if let Some(prev) = previous {
        if !prev.is_local() && prev.is_active_speaker() {
            return Some(prev.clone());
        }
    }
    if let Some(speaking) = items.iter().find(|m| !m.is_local() && m.is_active_speaker()) {
        return Some(speaking.clone());
    }
    if let Some(prev) = previous {
        return Some(prev.clone());
    }
    if let Some(remote) = items.iter().find(|m| !m.is_local()) {
        return Some(remote.clone());
    }
    items.iter().find(|m| m.is_local()).cloned()
}

/// A complete arrangement snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    /// The gallery of everyone.
    Grid { grid: Vec<GridTile> },
    /// Spotlight with a filmstrip of the rest; `pip` marks the condensed
    /// portrait variant where the strip collapses to a floating tile.
    Spotlight {
        spotlight: SpotlightTile,
        grid: Vec<GridTile>,
        pip: bool,
    },
    /// Fullscreen spotlight, optionally with the local tile floating.
    SpotlightExpanded {
        spotlight: SpotlightTile,
        pip: Option<GridTile>,
    },
    OneOnOne { local: GridTile, remote: GridTile },
    /// The whole window is a picture-in-picture miniature.
    Pip { spotlight: SpotlightTile },
}

impl Layout {
    pub fn is_spotlight_shaped(&self) -> bool {
        matches!(
            self,
            Self::Spotlight { .. } | Self::SpotlightExpanded { .. } | Self::Pip { .. }
        )
    }

    pub fn is_grid_shaped(&self) -> bool {
        matches!(self, Self::Grid { .. } | Self::OneOnOne { .. })
    }

    /// All grid tiles in display order, spotlight excluded.
    pub fn grid_tiles(&self) -> &[GridTile] {
        match self {
            Self::Grid { grid } | Self::Spotlight { grid, .. } => grid,
            _ => &[],
        }
    }

    pub fn spotlight_tile(&self) -> Option<&SpotlightTile> {
        match self {
            Self::Spotlight { spotlight, .. }
            | Self::SpotlightExpanded { spotlight, .. }
            | Self::Pip { spotlight } => Some(spotlight),
            _ => None,
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::Grid { grid: Vec::new() }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grid { .. } => "grid",
            Self::Spotlight { pip: false, .. } => "spotlight-landscape",
            Self::Spotlight { pip: true, .. } => "spotlight-portrait",
            Self::SpotlightExpanded { .. } => "spotlight-expanded",
            Self::OneOnOne { .. } => "one-on-one",
            Self::Pip { .. } => "pip",
        })
    }
}

/// Whether a one-on-one arrangement applies: exactly the local feed and one
/// remote feed, nothing else.
pub(crate) fn one_on_one_eligible(items: &[MediaItem]) -> bool {
    if items.len() != 2 {
        return false;
    }
    let users: Vec<_> = items.iter().filter_map(MediaItem::as_user).collect();
    users.len() == 2 && users.iter().filter(|m| m.is_local()).count() == 1
}

pub(crate) fn show_header(mode: WindowMode) -> bool {
    !matches!(mode, WindowMode::Pip | WindowMode::Flat)
}

/// Speaking indicators clutter small windows and are redundant next to a
/// spotlight, which already follows the speaker.
pub(crate) fn show_speaking_indicators(mode: WindowMode, layout: &Layout) -> bool {
    match mode {
        WindowMode::Pip | WindowMode::Flat => false,
        WindowMode::Narrow => layout.is_grid_shaped(),
        WindowMode::Normal => !layout.is_spotlight_shaped(),
    }
}
