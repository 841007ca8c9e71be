//! Tiles: the stable view handles the UI lays out on screen.
//!
//! A tile is not a media item. Items track call state; tiles track where
//! that state is displayed. The store reuses tile instances across layout
//! passes so the UI can animate a tile moving instead of tearing it down,
//! and it folds the UI's visibility reports back into the ordering: media
//! that rises in priority while off screen swaps places with the least
//! important visible tile instead of reshuffling everything.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use super::media_item::{MediaItem, UserMedia};
use crate::ids::{MediaKey, TileId};

const LOG_TARGET: &str = "Tiles";

/// A grid cell bound to one user-media item.
#[derive(Debug, Clone)]
pub struct GridTile {
    id: TileId,
    media: Arc<UserMedia>,
}

impl GridTile {
    fn new(media: Arc<UserMedia>) -> Self {
        Self {
            id: TileId::grid(media.key()),
            media,
        }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn media(&self) -> &Arc<UserMedia> {
        &self.media
    }
}

impl PartialEq for GridTile {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.media, &other.media)
    }
}

impl Eq for GridTile {}

/// The spotlight area: one or more media items displayed large.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotlightTile {
    id: TileId,
    media: Vec<MediaItem>,
    maximised: bool,
}

impl SpotlightTile {
    pub(crate) fn new(media: Vec<MediaItem>, maximised: bool) -> Self {
        Self {
            id: TileId::spotlight(),
            media,
            maximised,
        }
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn media(&self) -> &[MediaItem] {
        &self.media
    }

    /// Whether the spotlight fills the whole window (expanded or PIP).
    pub fn maximised(&self) -> bool {
        self.maximised
    }
}

/// Grid tile bookkeeping across layout passes.
#[derive(Debug, Default)]
pub struct TileStore {
    /// Tiles in display order from the previous pass.
    grid: IndexMap<MediaKey, GridTile>,
    /// Tile ids the UI currently has on screen.
    visible: HashSet<TileId>,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visibility report from the UI. Returns whether the set
    /// changed, since a change can alter the next arrangement.
    pub(crate) fn set_visible(&mut self, id: &TileId, visible: bool) -> bool {
        if visible {
            self.visible.insert(id.clone())
        } else {
            self.visible.remove(id)
        }
    }

    pub(crate) fn tile_for(&self, key: &MediaKey) -> Option<&GridTile> {
        self.grid.get(key)
    }

    /// Fold the freshly sorted media list into display-ordered tiles.
    ///
    /// Existing tiles keep their slots and newcomers append, then any
    /// off-screen tile whose media outranks the worst visible tile swaps
    /// into that tile's slot. Without visibility reports the carried order
    /// stands as-is.
    pub(crate) fn arrange(&mut self, sorted: &[Arc<UserMedia>]) -> Vec<GridTile> {
        let rank: HashMap<MediaKey, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key().clone(), i))
            .collect();

        let mut order: Vec<GridTile> = self
            .grid
            .values()
            .filter(|tile| rank.contains_key(tile.media().key()))
            .cloned()
            .collect();
        for media in sorted {
            if !order.iter().any(|tile| tile.media().key() == media.key()) {
                debug!(target: LOG_TARGET, "new grid tile for {}", media.key());
                order.push(GridTile::new(media.clone()));
            }
        }

        self.promote_into_view(&mut order, &rank);

        self.grid = order
            .iter()
            .map(|tile| (tile.media().key().clone(), tile.clone()))
            .collect();
        self.visible
            .retain(|id| order.iter().any(|tile| tile.id() == id) || *id == TileId::spotlight());
        order
    }

    fn promote_into_view(&self, order: &mut [GridTile], rank: &HashMap<MediaKey, usize>) {
        let rank_of = |tile: &GridTile| rank.get(tile.media().key()).copied().unwrap_or(usize::MAX);
        let visible_slots: Vec<usize> = (0..order.len())
            .filter(|&i| self.visible.contains(order[i].id()))
            .collect();
        let hidden_slots: Vec<usize> = (0..order.len())
            .filter(|&i| !self.visible.contains(order[i].id()))
            .collect();

        // Slot positions stay fixed while contents swap, so each pass
        // strictly improves the ranks on screen and the loop terminates.
        loop {
            let worst_visible = visible_slots.iter().copied().max_by_key(|&i| rank_of(&order[i]));
            let best_hidden = hidden_slots.iter().copied().min_by_key(|&i| rank_of(&order[i]));
            match (worst_visible, best_hidden) {
                (Some(worst), Some(best)) if rank_of(&order[best]) < rank_of(&order[worst]) => {
                    debug!(
                        target: LOG_TARGET,
                        "promoting {} into view, displacing {}",
                        order[best].media().key(),
                        order[worst].media().key()
                    );
                    order.swap(best, worst);
                }
                _ => break,
            }
        }
    }
}
