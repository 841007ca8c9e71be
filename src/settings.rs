//! User-facing view preferences, updatable at runtime through the façade.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSettings {
    /// Keep the local tile in the visible part of the grid even when it
    /// would otherwise sort last.
    pub always_show_self: bool,
    /// Extra copies of every tile, used to exercise large layouts from a
    /// small call. 0 in normal operation.
    pub duplicate_tiles: usize,
    /// Render floating reactions from other participants.
    pub show_reactions: bool,
    /// Emit sound cues for reactions.
    pub play_reaction_sounds: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            always_show_self: true,
            duplicate_tiles: 0,
            show_reactions: true,
            play_reaction_sounds: true,
        }
    }
}
