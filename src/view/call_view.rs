//! The call view façade.
//!
//! [`CallView::start`] spawns the engine task plus forwarder tasks that
//! relay the signaling membership list and the aggregator outputs into the
//! engine's input channel. The handle exposes the engine's watch outputs,
//! the cue broadcasts, and fire-and-forget interaction methods.

use std::collections::HashMap;

use log::debug;
use tokio::sync::{broadcast, mpsc, watch};

use super::engine::{Engine, EngineInput, EngineOutputs, FloatingReaction};
use super::layout::{GridMode, Layout, WindowMode};
use super::reconcile::MemberChanges;
use crate::ids::{ParticipantId, TileId};
use crate::media::MediaRoomEvent;
use crate::reactions::{RaisedHandInfo, ReactionAggregator, ReactionOption};
use crate::scope::Scope;
use crate::settings::ViewSettings;
use crate::signaling::CallSignaling;
use crate::sounds::SoundCue;

const LOG_TARGET: &str = "CallView";

/// Handle to the running call view.
///
/// Dropping the handle (or calling [`end`](Self::end)) stops the engine and
/// the forwarders; the output receivers stay readable at their last value.
pub struct CallView {
    inputs: mpsc::UnboundedSender<EngineInput>,
    layout: watch::Receiver<Layout>,
    window_mode: watch::Receiver<WindowMode>,
    grid_mode: watch::Receiver<GridMode>,
    spotlight_expanded: watch::Receiver<bool>,
    show_header: watch::Receiver<bool>,
    show_footer: watch::Receiver<bool>,
    show_spotlight_indicators: watch::Receiver<bool>,
    show_speaking_indicators: watch::Receiver<bool>,
    raised_hands: watch::Receiver<HashMap<ParticipantId, RaisedHandInfo>>,
    reactions: watch::Receiver<HashMap<ParticipantId, ReactionOption>>,
    visible_reactions: watch::Receiver<Vec<FloatingReaction>>,
    member_changes: broadcast::Sender<MemberChanges>,
    sound_cues: broadcast::Sender<SoundCue>,
    scope: Scope,
}

impl CallView {
    /// Start the view for a call.
    ///
    /// Membership changes flow in from `signaling` on their own; hand and
    /// reaction state flows from `aggregator` when one is given, otherwise
    /// it can be pushed through [`update_raised_hands`](Self::update_raised_hands)
    /// and [`update_reactions`](Self::update_reactions). Media transport
    /// events always arrive through [`media_event`](Self::media_event).
    pub fn start(
        signaling: &CallSignaling,
        aggregator: Option<&ReactionAggregator>,
        settings: ViewSettings,
        viewport: (f64, f64),
    ) -> Self {
        let local = signaling.room.local_participant().clone();
        let (inputs, input_rx) = mpsc::unbounded_channel();
        let outputs = EngineOutputs::new();

        let layout = outputs.layout.subscribe();
        let window_mode = outputs.window_mode.subscribe();
        let grid_mode = outputs.grid_mode.subscribe();
        let spotlight_expanded = outputs.spotlight_expanded.subscribe();
        let show_header = outputs.show_header.subscribe();
        let show_footer = outputs.show_footer.subscribe();
        let show_spotlight_indicators = outputs.show_spotlight_indicators.subscribe();
        let show_speaking_indicators = outputs.show_speaking_indicators.subscribe();
        let raised_hands = outputs.raised_hands.subscribe();
        let reactions = outputs.reactions.subscribe();
        let visible_reactions = outputs.visible_reactions.subscribe();
        let member_changes = outputs.member_changes.clone();
        let sound_cues = outputs.sound_cues.clone();

        let mut engine = Engine::new(
            signaling.room.clone(),
            local,
            settings,
            viewport,
            input_rx,
            outputs,
        );
        let mut scope = Scope::new();
        scope.spawn(async move { engine.run().await });
        scope.spawn(forward(
            signaling.memberships.clone(),
            inputs.clone(),
            EngineInput::MembershipsChanged,
        ));
        if let Some(aggregator) = aggregator {
            scope.spawn(forward(
                aggregator.raised_hands(),
                inputs.clone(),
                EngineInput::HandsRaisedChanged,
            ));
            scope.spawn(forward(
                aggregator.reactions(),
                inputs.clone(),
                EngineInput::ReactionsChanged,
            ));
        }

        Self {
            inputs,
            layout,
            window_mode,
            grid_mode,
            spotlight_expanded,
            show_header,
            show_footer,
            show_spotlight_indicators,
            show_speaking_indicators,
            raised_hands,
            reactions,
            visible_reactions,
            member_changes,
            sound_cues,
            scope,
        }
    }

    /// The current arrangement of tiles.
    pub fn layout(&self) -> watch::Receiver<Layout> {
        self.layout.clone()
    }

    pub fn window_mode(&self) -> watch::Receiver<WindowMode> {
        self.window_mode.clone()
    }

    pub fn grid_mode(&self) -> watch::Receiver<GridMode> {
        self.grid_mode.clone()
    }

    pub fn spotlight_expanded(&self) -> watch::Receiver<bool> {
        self.spotlight_expanded.clone()
    }

    pub fn show_header(&self) -> watch::Receiver<bool> {
        self.show_header.clone()
    }

    pub fn show_footer(&self) -> watch::Receiver<bool> {
        self.show_footer.clone()
    }

    pub fn show_spotlight_indicators(&self) -> watch::Receiver<bool> {
        self.show_spotlight_indicators.clone()
    }

    pub fn show_speaking_indicators(&self) -> watch::Receiver<bool> {
        self.show_speaking_indicators.clone()
    }

    /// Raised hands by participant, as published into the layout.
    pub fn raised_hands(&self) -> watch::Receiver<HashMap<ParticipantId, RaisedHandInfo>> {
        self.raised_hands.clone()
    }

    /// Active reactions by participant, as published into the layout.
    pub fn reactions(&self) -> watch::Receiver<HashMap<ParticipantId, ReactionOption>> {
        self.reactions.clone()
    }

    /// Reactions to float up the screen, with their start positions.
    pub fn visible_reactions(&self) -> watch::Receiver<Vec<FloatingReaction>> {
        self.visible_reactions.clone()
    }

    /// Membership transitions of the reconciled participant list.
    pub fn subscribe_member_changes(&self) -> broadcast::Receiver<MemberChanges> {
        self.member_changes.subscribe()
    }

    /// Sound cues the embedder should play.
    pub fn subscribe_sound_cues(&self) -> broadcast::Receiver<SoundCue> {
        self.sound_cues.subscribe()
    }

    /// Feed one media transport event into the view.
    pub fn media_event(&self, event: MediaRoomEvent) {
        self.send(EngineInput::MediaEvent(event));
    }

    pub fn set_viewport(&self, width: f64, height: f64) {
        self.send(EngineInput::SetViewport { width, height });
    }

    pub fn set_pip_enabled(&self, enabled: bool) {
        self.send(EngineInput::SetPipEnabled(enabled));
    }

    pub fn set_grid_mode(&self, mode: GridMode) {
        self.send(EngineInput::SetGridMode(mode));
    }

    pub fn toggle_spotlight_expanded(&self) {
        self.send(EngineInput::ToggleSpotlightExpanded);
    }

    pub fn tap_screen(&self) {
        self.send(EngineInput::TapScreen);
    }

    pub fn tap_controls(&self) {
        self.send(EngineInput::TapControls);
    }

    pub fn hover_screen(&self) {
        self.send(EngineInput::HoverScreen);
    }

    pub fn unhover_screen(&self) {
        self.send(EngineInput::UnhoverScreen);
    }

    pub fn set_always_show_self(&self, enabled: bool) {
        self.send(EngineInput::SetAlwaysShowSelf(enabled));
    }

    pub fn set_duplicate_tiles(&self, count: usize) {
        self.send(EngineInput::SetDuplicateTiles(count));
    }

    pub fn set_show_reactions(&self, enabled: bool) {
        self.send(EngineInput::SetShowReactions(enabled));
    }

    pub fn set_play_reaction_sounds(&self, enabled: bool) {
        self.send(EngineInput::SetPlayReactionSounds(enabled));
    }

    /// Report whether a grid tile is scrolled into view, for promotion of
    /// rising tiles into the visible range.
    pub fn set_tile_visible(&self, id: TileId, visible: bool) {
        self.send(EngineInput::TileVisibility(id, visible));
    }

    /// Push hand-raise state directly, for embedders not running a
    /// [`ReactionAggregator`].
    pub fn update_raised_hands(&self, hands: HashMap<ParticipantId, RaisedHandInfo>) {
        self.send(EngineInput::HandsRaisedChanged(hands));
    }

    /// Push reaction state directly, for embedders not running a
    /// [`ReactionAggregator`].
    pub fn update_reactions(&self, reactions: HashMap<ParticipantId, ReactionOption>) {
        self.send(EngineInput::ReactionsChanged(reactions));
    }

    pub fn end(&mut self) {
        self.scope.end();
    }

    fn send(&self, input: EngineInput) {
        if self.inputs.send(input).is_err() {
            debug!(target: LOG_TARGET, "input dropped; engine stopped");
        }
    }
}

/// Relay a watch channel into the engine, starting from the current value.
async fn forward<T: Clone + Send + Sync + 'static>(
    mut rx: watch::Receiver<T>,
    tx: mpsc::UnboundedSender<EngineInput>,
    wrap: fn(T) -> EngineInput,
) {
    loop {
        let value = rx.borrow_and_update().clone();
        if tx.send(wrap(value)).is_err() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}
