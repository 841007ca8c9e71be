//! The engine actor: a single task owning every piece of mutable call view
//! state.
//!
//! All inputs funnel through one unbounded channel (plus a second one for
//! per-item control requests, so items never need a handle back to the
//! engine). Each input mutates state and triggers one `publish` pass that
//! reconciles items, advances the speaker debouncers, recomputes the
//! layout, diffs the sound cues, and pushes everything through the watch
//! outputs. Timers are folded into the run loop: the next wake is the
//! earliest of the pending speaker transitions, hold releases, and the
//! footer hide deadline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep_until};

use super::layout::{
    self, GridMode, GridModeTracker, Layout, WindowMode, one_on_one_eligible,
    select_spotlight_speaker, sort_user_media,
};
use super::media_item::{ControlRequest, ControlSender, MediaItem, ScreenShare, UserMedia};
use super::reconcile::{MemberChanges, Reconciler};
use super::speaker::SpeakerState;
use super::tiles::{GridTile, SpotlightTile, TileStore};
use crate::ids::{MediaKey, ParticipantId, TileId};
use crate::media::{MediaRoomEvent, MediaRoomState};
use crate::reactions::{GENERIC_REACTION_NAME, RaisedHandInfo, ReactionOption};
use crate::settings::ViewSettings;
use crate::signaling::{CallMembership, SignalingRoom};
use crate::sounds::{SOUND_CUE_PARTICIPANT_LIMIT, SoundCue};

const LOG_TARGET: &str = "CallView";

/// How long the footer stays up in a flat window after a tap before hiding
/// itself again.
pub const FOOTER_HIDE_DELAY: Duration = Duration::from_millis(4000);

/// A reaction floating up the screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatingReaction {
    pub sender: ParticipantId,
    pub emoji: String,
    /// Horizontal start position in percent, fixed while the sender's
    /// reaction stays active.
    pub start_x: u8,
}

#[derive(Debug)]
pub(crate) enum EngineInput {
    MembershipsChanged(Vec<CallMembership>),
    MediaEvent(MediaRoomEvent),
    HandsRaisedChanged(HashMap<ParticipantId, RaisedHandInfo>),
    ReactionsChanged(HashMap<ParticipantId, ReactionOption>),
    SetViewport { width: f64, height: f64 },
    SetPipEnabled(bool),
    SetGridMode(GridMode),
    ToggleSpotlightExpanded,
    TapScreen,
    TapControls,
    HoverScreen,
    UnhoverScreen,
    SetAlwaysShowSelf(bool),
    SetDuplicateTiles(usize),
    SetShowReactions(bool),
    SetPlayReactionSounds(bool),
    TileVisibility(TileId, bool),
}

/// The watch and broadcast channels the engine publishes into. Constructed
/// by the façade, which keeps the receiving ends.
pub(crate) struct EngineOutputs {
    pub(crate) layout: watch::Sender<Layout>,
    pub(crate) window_mode: watch::Sender<WindowMode>,
    pub(crate) grid_mode: watch::Sender<GridMode>,
    pub(crate) spotlight_expanded: watch::Sender<bool>,
    pub(crate) show_header: watch::Sender<bool>,
    pub(crate) show_footer: watch::Sender<bool>,
    pub(crate) show_spotlight_indicators: watch::Sender<bool>,
    pub(crate) show_speaking_indicators: watch::Sender<bool>,
    pub(crate) raised_hands: watch::Sender<HashMap<ParticipantId, RaisedHandInfo>>,
    pub(crate) reactions: watch::Sender<HashMap<ParticipantId, ReactionOption>>,
    pub(crate) visible_reactions: watch::Sender<Vec<FloatingReaction>>,
    pub(crate) member_changes: broadcast::Sender<MemberChanges>,
    pub(crate) sound_cues: broadcast::Sender<SoundCue>,
}

impl EngineOutputs {
    pub(crate) fn new() -> Self {
        Self {
            layout: watch::Sender::new(Layout::default()),
            window_mode: watch::Sender::new(WindowMode::Normal),
            grid_mode: watch::Sender::new(GridMode::Grid),
            spotlight_expanded: watch::Sender::new(false),
            show_header: watch::Sender::new(true),
            show_footer: watch::Sender::new(true),
            show_spotlight_indicators: watch::Sender::new(false),
            show_speaking_indicators: watch::Sender::new(true),
            raised_hands: watch::Sender::new(HashMap::new()),
            reactions: watch::Sender::new(HashMap::new()),
            visible_reactions: watch::Sender::new(Vec::new()),
            member_changes: broadcast::channel(100).0,
            sound_cues: broadcast::channel(100).0,
        }
    }
}

/// Footer visibility in flat windows, where screen taps toggle it and it
/// hides itself after a delay.
#[derive(Debug, Default)]
struct FooterState {
    shown: bool,
    hovering: bool,
    hide_at: Option<Instant>,
}

impl FooterState {
    fn reset(&mut self) {
        self.shown = false;
        self.hovering = false;
        self.hide_at = None;
    }

    fn tap_screen(&mut self, now: Instant) {
        self.shown = !self.shown;
        self.hide_at = self.shown.then(|| now + FOOTER_HIDE_DELAY);
    }

    fn tap_controls(&mut self, now: Instant) {
        self.shown = true;
        self.hide_at = Some(now + FOOTER_HIDE_DELAY);
    }

    fn hover(&mut self) {
        self.hovering = true;
        self.shown = true;
    }

    /// Hovering ends: hide right away unless a tap armed a later deadline.
    fn unhover(&mut self) {
        self.hovering = false;
        if self.hide_at.is_none() {
            self.shown = false;
        }
    }

    fn tick(&mut self, now: Instant) {
        if self.hide_at.is_some_and(|at| at <= now) {
            self.hide_at = None;
            if !self.hovering {
                self.shown = false;
            }
        }
    }
}

pub(crate) struct Engine {
    room: Arc<dyn SignalingRoom>,
    inputs: mpsc::UnboundedReceiver<EngineInput>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    media: MediaRoomState,
    memberships: Vec<CallMembership>,
    reconciler: Reconciler,
    speakers: HashMap<MediaKey, SpeakerState>,
    hands: HashMap<ParticipantId, RaisedHandInfo>,
    reactions: HashMap<ParticipantId, ReactionOption>,
    settings: ViewSettings,
    viewport: (f64, f64),
    pip_enabled: bool,
    window_mode: WindowMode,
    grid_mode: GridModeTracker,
    spotlight_expanded: bool,
    spotlight_speaker: Option<MediaKey>,
    tiles: TileStore,
    footer: FooterState,
    /// Start positions of floating reactions, preserved per sender while
    /// their reaction stays active.
    floating: HashMap<ParticipantId, u8>,
    playing_reactions: HashSet<ParticipantId>,
    previous_hand_count: usize,
    outputs: EngineOutputs,
}

impl Engine {
    pub(crate) fn new(
        room: Arc<dyn SignalingRoom>,
        local: ParticipantId,
        settings: ViewSettings,
        viewport: (f64, f64),
        inputs: mpsc::UnboundedReceiver<EngineInput>,
        outputs: EngineOutputs,
    ) -> Self {
        let (control_tx, control_rx): (ControlSender, _) = mpsc::unbounded_channel();
        Self {
            room,
            inputs,
            control_rx,
            media: MediaRoomState::new(local.clone()),
            memberships: Vec::new(),
            reconciler: Reconciler::new(local, control_tx),
            speakers: HashMap::new(),
            hands: HashMap::new(),
            reactions: HashMap::new(),
            settings,
            viewport,
            pip_enabled: false,
            window_mode: WindowMode::from_viewport(viewport.0, viewport.1, false),
            grid_mode: GridModeTracker::default(),
            spotlight_expanded: false,
            spotlight_speaker: None,
            tiles: TileStore::new(),
            footer: FooterState::default(),
            floating: HashMap::new(),
            playing_reactions: HashSet::new(),
            previous_hand_count: 0,
            outputs,
        }
    }

    pub(crate) async fn run(&mut self) {
        debug!(target: LOG_TARGET, "engine started for {}", self.room.room_id());
        self.publish(Instant::now());
        loop {
            let next_wake = self.next_deadline();
            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => self.handle_input(input, Instant::now()),
                    None => break,
                },
                control = self.control_rx.recv() => {
                    if let Some(request) = control {
                        self.handle_control(request);
                    }
                }
                _ = sleep_until(next_wake.unwrap_or_else(Instant::now)), if next_wake.is_some() => {
                    self.handle_timers(Instant::now());
                }
            }
            self.publish(Instant::now());
        }
        debug!(target: LOG_TARGET, "engine stopped for {}", self.room.room_id());
    }

    fn handle_input(&mut self, input: EngineInput, now: Instant) {
        match input {
            EngineInput::MembershipsChanged(memberships) => {
                self.memberships = memberships;
            }
            EngineInput::MediaEvent(event) => {
                if self.media.apply(&event) {
                    if let MediaRoomEvent::ConnectionStateChanged(state) = event {
                        self.reconciler.connection_changed(state, &self.media, now);
                    }
                }
            }
            EngineInput::HandsRaisedChanged(hands) => self.hands = hands,
            EngineInput::ReactionsChanged(reactions) => self.reactions = reactions,
            EngineInput::SetViewport { width, height } => self.viewport = (width, height),
            EngineInput::SetPipEnabled(enabled) => self.pip_enabled = enabled,
            EngineInput::SetGridMode(mode) => {
                let window_mode =
                    WindowMode::from_viewport(self.viewport.0, self.viewport.1, self.pip_enabled);
                let remote_shares = self.reconciler.screen_shares().any(|s| !s.is_local());
                debug!(target: LOG_TARGET, "user selected {mode} mode");
                self.grid_mode.select(mode, remote_shares, window_mode);
            }
            EngineInput::ToggleSpotlightExpanded => {
                self.spotlight_expanded = !self.spotlight_expanded;
            }
            EngineInput::TapScreen => {
                if self.window_mode == WindowMode::Flat {
                    self.footer.tap_screen(now);
                }
            }
            EngineInput::TapControls => {
                if self.window_mode == WindowMode::Flat {
                    self.footer.tap_controls(now);
                }
            }
            EngineInput::HoverScreen => {
                if self.window_mode == WindowMode::Flat {
                    self.footer.hover();
                }
            }
            EngineInput::UnhoverScreen => {
                if self.window_mode == WindowMode::Flat {
                    self.footer.unhover();
                }
            }
            EngineInput::SetAlwaysShowSelf(enabled) => self.settings.always_show_self = enabled,
            EngineInput::SetDuplicateTiles(count) => self.settings.duplicate_tiles = count,
            EngineInput::SetShowReactions(enabled) => self.settings.show_reactions = enabled,
            EngineInput::SetPlayReactionSounds(enabled) => {
                self.settings.play_reaction_sounds = enabled;
            }
            EngineInput::TileVisibility(id, visible) => {
                self.tiles.set_visible(&id, visible);
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest) {
        match self.reconciler.items().get(&request.key).and_then(MediaItem::as_user) {
            Some(item) => item.apply_control(&request.control),
            None => debug!(target: LOG_TARGET, "control for unknown media item {}", request.key),
        }
    }

    fn handle_timers(&mut self, now: Instant) {
        for state in self.speakers.values_mut() {
            state.tick(now);
        }
        self.reconciler.release_due_holds(now);
        self.footer.tick(now);
    }

    fn next_deadline(&self) -> Option<Instant> {
        let speakers = self.speakers.values().filter_map(SpeakerState::pending_deadline).min();
        [speakers, self.reconciler.next_hold_release(), self.footer.hide_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// One full derivation pass: reconcile, debounce, lay out, diff, send.
    fn publish(&mut self, now: Instant) {
        let member_changes = self.reconciler.rebuild(
            &self.memberships,
            &self.media,
            self.room.as_ref(),
            &self.settings,
        );
        self.sync_speakers(now);
        self.sync_annotations();

        let window_mode =
            WindowMode::from_viewport(self.viewport.0, self.viewport.1, self.pip_enabled);
        if window_mode != self.window_mode {
            debug!(target: LOG_TARGET, "window mode {} -> {window_mode}", self.window_mode);
            if window_mode == WindowMode::Flat {
                self.footer.reset();
            }
            self.window_mode = window_mode;
        }

        let items: Vec<MediaItem> = self.reconciler.items().values().cloned().collect();
        let user_media: Vec<Arc<UserMedia>> = self.reconciler.user_media().cloned().collect();
        let screen_shares: Vec<Arc<ScreenShare>> =
            self.reconciler.screen_shares().cloned().collect();
        let remote_shares = screen_shares.iter().any(|s| !s.is_local());
        let grid_mode = self.grid_mode.resolve(remote_shares, window_mode);

        let speaker = select_spotlight_speaker(&user_media, self.spotlight_speaker.as_ref());
        match &speaker {
            Some(picked) if self.spotlight_speaker.as_ref() != Some(picked.key()) => {
                debug!(target: LOG_TARGET, "spotlight speaker is now {}", picked.key());
                self.spotlight_speaker = Some(picked.key().clone());
            }
            None if self.spotlight_speaker.is_some() => self.spotlight_speaker = None,
            _ => {}
        }

        let sorted = sort_user_media(&user_media);
        let grid_tiles = self.tiles.arrange(&sorted);
        let eligible = one_on_one_eligible(&items);
        let layout = self.route_layout(
            window_mode,
            grid_mode,
            eligible,
            &user_media,
            &screen_shares,
            grid_tiles,
            speaker.as_ref(),
        );

        let show_footer = match window_mode {
            WindowMode::Pip => false,
            WindowMode::Normal | WindowMode::Narrow => true,
            WindowMode::Flat => self.footer.shown,
        };

        self.update_floating_reactions();
        if let Some(changes) = member_changes {
            self.emit_member_cues(changes);
        }
        self.emit_hand_cue();
        self.emit_reaction_cues();

        set(&self.outputs.window_mode, window_mode);
        set(&self.outputs.grid_mode, grid_mode);
        set(&self.outputs.spotlight_expanded, self.spotlight_expanded);
        set(&self.outputs.show_header, layout::show_header(window_mode));
        set(&self.outputs.show_footer, show_footer);
        set(&self.outputs.show_spotlight_indicators, layout.is_spotlight_shaped());
        set(
            &self.outputs.show_speaking_indicators,
            layout::show_speaking_indicators(window_mode, &layout),
        );
        set(&self.outputs.raised_hands, self.hands.clone());
        set(&self.outputs.reactions, self.reactions.clone());
        set(&self.outputs.layout, layout);
    }

    fn sync_speakers(&mut self, now: Instant) {
        let mut live = HashSet::new();
        for item in self.reconciler.user_media() {
            live.insert(item.key().clone());
            let state = self
                .speakers
                .entry(item.key().clone())
                .or_insert_with(SpeakerState::new);
            state.raw_changed(item.current_state().speaking, now);
            state.tick(now);
            item.set_active_speaker(state.active());
        }
        self.speakers.retain(|key, _| live.contains(key));
    }

    fn sync_annotations(&self) {
        for item in self.reconciler.user_media() {
            let pid = item.participant_id();
            item.set_hand_raised(self.hands.get(pid).map(|info| info.time));
            item.set_reaction(self.reactions.get(pid).cloned());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn route_layout(
        &mut self,
        window_mode: WindowMode,
        grid_mode: GridMode,
        eligible: bool,
        user_media: &[Arc<UserMedia>],
        screen_shares: &[Arc<ScreenShare>],
        grid_tiles: Vec<GridTile>,
        speaker: Option<&Arc<UserMedia>>,
    ) -> Layout {
        let spotlight_media: Vec<MediaItem> = if screen_shares.is_empty() {
            speaker.map(|s| MediaItem::User(s.clone())).into_iter().collect()
        } else {
            screen_shares.iter().cloned().map(MediaItem::Screen).collect()
        };

        match window_mode {
            WindowMode::Pip => Layout::Pip {
                spotlight: SpotlightTile::new(spotlight_media, true),
            },
            // A flat window has no room for a grid; grid mode degrades to
            // the landscape spotlight with its filmstrip.
            WindowMode::Flat => match grid_mode {
                GridMode::Grid => Layout::Spotlight {
                    spotlight: SpotlightTile::new(spotlight_media, false),
                    grid: grid_tiles,
                    pip: false,
                },
                GridMode::Spotlight => self.expanded(spotlight_media, speaker, &grid_tiles),
            },
            WindowMode::Narrow => {
                if eligible {
                    // One-on-one in a narrow window: the remote feed fills
                    // the window and the local tile floats over it.
                    match user_media.iter().find(|m| !m.is_local()) {
                        Some(remote) => {
                            let media = vec![MediaItem::User(remote.clone())];
                            self.expanded(media, speaker, &grid_tiles)
                        }
                        None => Layout::Grid { grid: grid_tiles },
                    }
                } else if grid_tiles.len() > 3 || !screen_shares.is_empty() {
                    Layout::Spotlight {
                        spotlight: SpotlightTile::new(spotlight_media, false),
                        grid: grid_tiles,
                        pip: true,
                    }
                } else {
                    Layout::Grid { grid: grid_tiles }
                }
            }
            WindowMode::Normal => match grid_mode {
                GridMode::Grid if eligible => {
                    let local = grid_tiles.iter().find(|t| t.media().is_local()).cloned();
                    let remote = grid_tiles.iter().find(|t| !t.media().is_local()).cloned();
                    match (local, remote) {
                        (Some(local), Some(remote)) => Layout::OneOnOne { local, remote },
                        _ => Layout::Grid { grid: grid_tiles },
                    }
                }
                GridMode::Grid => Layout::Grid { grid: grid_tiles },
                GridMode::Spotlight if self.spotlight_expanded => {
                    self.expanded(spotlight_media, speaker, &grid_tiles)
                }
                GridMode::Spotlight => Layout::Spotlight {
                    spotlight: SpotlightTile::new(spotlight_media, false),
                    grid: grid_tiles,
                    pip: false,
                },
            },
        }
    }

    fn expanded(
        &self,
        spotlight_media: Vec<MediaItem>,
        speaker: Option<&Arc<UserMedia>>,
        grid_tiles: &[GridTile],
    ) -> Layout {
        let pip = self.expanded_pip(&spotlight_media, speaker, grid_tiles);
        Layout::SpotlightExpanded {
            spotlight: SpotlightTile::new(spotlight_media, true),
            pip,
        }
    }

    /// The floating tile over a fullscreen spotlight: the active speaker
    /// over a shared screen, otherwise the local feed when "always show
    /// self" is on and the spotlight is not already the local feed.
    fn expanded_pip(
        &self,
        spotlight_media: &[MediaItem],
        speaker: Option<&Arc<UserMedia>>,
        grid_tiles: &[GridTile],
    ) -> Option<GridTile> {
        if spotlight_media.iter().any(MediaItem::is_screen_share) {
            let speaker = speaker?;
            return grid_tiles
                .iter()
                .find(|t| t.media().key() == speaker.key())
                .cloned();
        }
        if !self.settings.always_show_self {
            return None;
        }
        if spotlight_media.iter().any(MediaItem::is_local) {
            return None;
        }
        grid_tiles.iter().find(|t| t.media().is_local()).cloned()
    }

    fn update_floating_reactions(&mut self) {
        self.floating.retain(|sender, _| self.reactions.contains_key(sender));
        let mut visible = Vec::new();
        for (sender, option) in &self.reactions {
            let start_x = *self
                .floating
                .entry(sender.clone())
                .or_insert_with(|| rand::rng().random_range(10..=90));
            if self.settings.show_reactions {
                visible.push(FloatingReaction {
                    sender: sender.clone(),
                    emoji: option.emoji.clone(),
                    start_x,
                });
            }
        }
        visible.sort_by(|a, b| a.sender.cmp(&b.sender));
        set(&self.outputs.visible_reactions, visible);
    }

    fn emit_member_cues(&self, changes: MemberChanges) {
        let quiet = changes.ids.len() > SOUND_CUE_PARTICIPANT_LIMIT;
        let joined = !changes.joined.is_empty();
        let left = !changes.left.is_empty();
        let _ = self.outputs.member_changes.send(changes);
        if quiet {
            return;
        }
        if joined {
            let _ = self.outputs.sound_cues.send(SoundCue::Join);
        }
        if left {
            let _ = self.outputs.sound_cues.send(SoundCue::Left);
        }
    }

    fn emit_hand_cue(&mut self) {
        let count = self.hands.len();
        if count > self.previous_hand_count && self.settings.play_reaction_sounds {
            let _ = self.outputs.sound_cues.send(SoundCue::RaiseHand);
        }
        self.previous_hand_count = count;
    }

    fn emit_reaction_cues(&mut self) {
        if self.settings.play_reaction_sounds {
            for (sender, option) in &self.reactions {
                if !self.playing_reactions.contains(sender) {
                    let name = if option.sound {
                        option.name.clone()
                    } else {
                        GENERIC_REACTION_NAME.to_string()
                    };
                    let _ = self.outputs.sound_cues.send(SoundCue::Reaction { name });
                }
            }
        }
        self.playing_reactions = self.reactions.keys().cloned().collect();
    }
}

fn set<T: PartialEq>(sender: &watch::Sender<T>, value: T) {
    sender.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EventId;
    use crate::media::ConnectionState;
    use crate::reactions::find_reaction;
    use crate::test_utils::{MockSignalingRoom, membership, ts};
    use crate::view::speaker::SPEAKING_ON_DELAY;

    const ALICE: &str = "@alice:example.org";
    const BOB: &str = "@bob:example.org";
    const CAROL: &str = "@carol:example.org";

    fn local() -> ParticipantId {
        ParticipantId::new(ALICE, "LOCAL")
    }

    struct Harness {
        engine: Engine,
        layout: watch::Receiver<Layout>,
        window_mode: watch::Receiver<WindowMode>,
        grid_mode: watch::Receiver<GridMode>,
        show_header: watch::Receiver<bool>,
        show_footer: watch::Receiver<bool>,
        visible_reactions: watch::Receiver<Vec<FloatingReaction>>,
        cues: broadcast::Receiver<SoundCue>,
        _inputs: mpsc::UnboundedSender<EngineInput>,
    }

    fn harness() -> Harness {
        harness_with(ViewSettings::default(), (1200.0, 800.0))
    }

    fn harness_with(settings: ViewSettings, viewport: (f64, f64)) -> Harness {
        let room = MockSignalingRoom::new(local());
        let (tx, rx) = mpsc::unbounded_channel();
        let outputs = EngineOutputs::new();
        let layout = outputs.layout.subscribe();
        let window_mode = outputs.window_mode.subscribe();
        let grid_mode = outputs.grid_mode.subscribe();
        let show_header = outputs.show_header.subscribe();
        let show_footer = outputs.show_footer.subscribe();
        let visible_reactions = outputs.visible_reactions.subscribe();
        let cues = outputs.sound_cues.subscribe();
        let engine = Engine::new(room, local(), settings, viewport, rx, outputs);
        Harness {
            engine,
            layout,
            window_mode,
            grid_mode,
            show_header,
            show_footer,
            visible_reactions,
            cues,
            _inputs: tx,
        }
    }

    fn roster(n: usize) -> Vec<CallMembership> {
        let mut list = vec![membership(ALICE, "LOCAL", "$m-self")];
        for i in 1..n {
            list.push(membership(
                &format!("@guest{i}:example.org"),
                "DEV",
                &format!("$m-{i}"),
            ));
        }
        list
    }

    fn spotlight_user(layout: &Layout) -> Option<String> {
        layout
            .spotlight_tile()
            .and_then(|tile| tile.media().first())
            .and_then(|item| match item {
                MediaItem::User(user) => Some(user.participant_id().user.to_string()),
                MediaItem::Screen(_) => None,
            })
    }

    impl Harness {
        fn input(&mut self, input: EngineInput) {
            self.engine.handle_input(input, Instant::now());
            self.engine.publish(Instant::now());
        }

        fn join(&mut self, members: &[(&str, &str)]) {
            let memberships = members
                .iter()
                .enumerate()
                .map(|(i, (user, device))| membership(user, device, &format!("$m-{i}")))
                .collect();
            self.input(EngineInput::MembershipsChanged(memberships));
        }

        fn media(&mut self, event: MediaRoomEvent) {
            self.input(EngineInput::MediaEvent(event));
        }

        fn connect(&mut self, user: &str, device: &str) {
            self.media(MediaRoomEvent::ParticipantConnected {
                identity: format!("{user}:{device}"),
            });
        }

        fn advance_time(&mut self, by: Duration) {
            let later = Instant::now() + by;
            self.engine.handle_timers(later);
            self.engine.publish(later);
        }

        fn drain_cues(&mut self) -> Vec<SoundCue> {
            let mut cues = Vec::new();
            while let Ok(cue) = self.cues.try_recv() {
                cues.push(cue);
            }
            cues
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_participants_in_a_normal_window_get_one_on_one() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        h.connect(BOB, "DEV");

        let layout = h.layout.borrow().clone();
        match layout {
            Layout::OneOnOne { local, remote } => {
                assert!(local.media().is_local());
                assert_eq!(remote.media().participant_id().user.as_str(), BOB);
            }
            other => panic!("expected one-on-one, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn screen_share_switches_to_spotlight_and_back() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.connect(CAROL, "DEV");
        assert!(matches!(&*h.layout.borrow(), Layout::Grid { .. }));

        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: true,
        });
        assert_eq!(*h.grid_mode.borrow(), GridMode::Spotlight);
        let layout = h.layout.borrow().clone();
        match layout {
            Layout::Spotlight { spotlight, pip, .. } => {
                assert!(!pip);
                assert_eq!(spotlight.media().len(), 1);
                assert!(spotlight.media()[0].is_screen_share());
            }
            other => panic!("expected spotlight, got {other}"),
        }

        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: false,
        });
        assert_eq!(*h.grid_mode.borrow(), GridMode::Grid);
        assert!(matches!(&*h.layout.borrow(), Layout::Grid { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn a_pinned_spotlight_survives_the_share_ending() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.input(EngineInput::SetGridMode(GridMode::Spotlight));
        assert!(h.layout.borrow().is_spotlight_shaped());

        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: true,
        });
        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: false,
        });
        assert_eq!(*h.grid_mode.borrow(), GridMode::Spotlight);

        h.input(EngineInput::SetGridMode(GridMode::Grid));
        assert!(matches!(&*h.layout.borrow(), Layout::Grid { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn a_grid_selection_holds_until_conditions_change() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: true,
        });
        assert_eq!(*h.grid_mode.borrow(), GridMode::Spotlight);

        h.input(EngineInput::SetGridMode(GridMode::Grid));
        assert!(matches!(&*h.layout.borrow(), Layout::Grid { .. }));

        // The share ends and a new one starts: automatic rule is back.
        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: false,
        });
        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: true,
        });
        assert_eq!(*h.grid_mode.borrow(), GridMode::Spotlight);
    }

    #[tokio::test(start_paused = true)]
    async fn flat_windows_never_show_a_grid() {
        let mut h = harness_with(ViewSettings::default(), (1200.0, 500.0));
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        assert_eq!(*h.window_mode.borrow(), WindowMode::Flat);
        // Automatic mode in a flat window is spotlight, which maps to the
        // fullscreen variant.
        assert!(matches!(&*h.layout.borrow(), Layout::SpotlightExpanded { .. }));

        h.input(EngineInput::SetGridMode(GridMode::Grid));
        assert!(matches!(
            &*h.layout.borrow(),
            Layout::Spotlight { pip: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn flat_mode_footer_follows_taps_and_timers() {
        let mut h = harness_with(ViewSettings::default(), (1200.0, 500.0));
        h.join(&[(ALICE, "LOCAL")]);
        assert!(!*h.show_footer.borrow());

        h.input(EngineInput::TapScreen);
        assert!(*h.show_footer.borrow());
        h.advance_time(FOOTER_HIDE_DELAY);
        assert!(!*h.show_footer.borrow());

        h.input(EngineInput::HoverScreen);
        assert!(*h.show_footer.borrow());
        h.input(EngineInput::UnhoverScreen);
        assert!(!*h.show_footer.borrow());

        h.input(EngineInput::TapScreen);
        h.input(EngineInput::TapScreen);
        assert!(!*h.show_footer.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn join_and_leave_cues_follow_membership_changes() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        assert!(h.drain_cues().is_empty(), "first population must stay silent");

        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        assert_eq!(h.drain_cues(), vec![SoundCue::Join]);

        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        assert_eq!(h.drain_cues(), vec![SoundCue::Left]);
    }

    #[tokio::test(start_paused = true)]
    async fn large_calls_stay_quiet_on_membership_changes() {
        let mut h = harness();
        h.input(EngineInput::MembershipsChanged(roster(9)));
        h.input(EngineInput::MembershipsChanged(roster(10)));
        assert!(h.drain_cues().is_empty());

        // Shrinking back to the limit is audible again.
        h.input(EngineInput::MembershipsChanged(roster(8)));
        assert_eq!(h.drain_cues(), vec![SoundCue::Left]);
    }

    #[tokio::test(start_paused = true)]
    async fn raised_hand_cues_fire_on_count_increase() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        let mut hands = HashMap::new();
        hands.insert(
            ParticipantId::new(BOB, "DEV"),
            RaisedHandInfo {
                membership_event_id: EventId::new("$m-1"),
                reaction_event_id: EventId::new("$r1"),
                time: ts(1),
            },
        );

        h.input(EngineInput::HandsRaisedChanged(hands.clone()));
        assert_eq!(h.drain_cues(), vec![SoundCue::RaiseHand]);

        h.input(EngineInput::HandsRaisedChanged(hands.clone()));
        assert!(h.drain_cues().is_empty());

        h.input(EngineInput::HandsRaisedChanged(HashMap::new()));
        assert!(h.drain_cues().is_empty());
        h.input(EngineInput::HandsRaisedChanged(hands));
        assert_eq!(h.drain_cues(), vec![SoundCue::RaiseHand]);
    }

    #[tokio::test(start_paused = true)]
    async fn reaction_cues_play_catalog_and_generic_sounds() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);

        let mut reactions = HashMap::new();
        reactions.insert(
            ParticipantId::new(BOB, "DEV"),
            find_reaction("party").unwrap(),
        );
        h.input(EngineInput::ReactionsChanged(reactions.clone()));
        assert_eq!(
            h.drain_cues(),
            vec![SoundCue::Reaction { name: "party".into() }]
        );

        // Still active, so no retrigger.
        h.input(EngineInput::ReactionsChanged(reactions));
        assert!(h.drain_cues().is_empty());

        // A catalog entry without its own sound plays the generic cue.
        let mut reactions = HashMap::new();
        reactions.insert(
            ParticipantId::new(CAROL, "DEV"),
            find_reaction("thumbsup").unwrap(),
        );
        h.input(EngineInput::ReactionsChanged(reactions));
        assert_eq!(
            h.drain_cues(),
            vec![SoundCue::Reaction { name: "generic".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sound_settings_silence_hand_and_reaction_cues() {
        let settings = ViewSettings {
            play_reaction_sounds: false,
            ..Default::default()
        };
        let mut h = harness_with(settings, (1200.0, 800.0));
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);

        let mut hands = HashMap::new();
        hands.insert(
            ParticipantId::new(BOB, "DEV"),
            RaisedHandInfo {
                membership_event_id: EventId::new("$m-1"),
                reaction_event_id: EventId::new("$r1"),
                time: ts(1),
            },
        );
        h.input(EngineInput::HandsRaisedChanged(hands));

        let mut reactions = HashMap::new();
        reactions.insert(
            ParticipantId::new(BOB, "DEV"),
            find_reaction("party").unwrap(),
        );
        h.input(EngineInput::ReactionsChanged(reactions));
        assert!(h.drain_cues().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn floating_reactions_keep_their_start_position() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);

        let mut reactions = HashMap::new();
        reactions.insert(
            ParticipantId::new(BOB, "DEV"),
            find_reaction("heart").unwrap(),
        );
        h.input(EngineInput::ReactionsChanged(reactions));

        let first = h.visible_reactions.borrow().clone();
        assert_eq!(first.len(), 1);
        assert!((10..=90).contains(&first[0].start_x));
        assert_eq!(first[0].emoji, "❤");

        // Unrelated updates keep the position fixed.
        h.input(EngineInput::SetViewport {
            width: 1100.0,
            height: 900.0,
        });
        assert_eq!(*h.visible_reactions.borrow(), first);

        h.input(EngineInput::SetShowReactions(false));
        assert!(h.visible_reactions.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn speakers_are_debounced_before_the_spotlight_moves() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.connect(CAROL, "DEV");
        h.input(EngineInput::SetGridMode(GridMode::Spotlight));
        assert_eq!(spotlight_user(&h.layout.borrow()), Some(BOB.to_string()));

        h.media(MediaRoomEvent::SpeakingChanged {
            identity: format!("{CAROL}:DEV"),
            speaking: true,
        });
        // Raw voice activity alone does not move the spotlight.
        assert_eq!(spotlight_user(&h.layout.borrow()), Some(BOB.to_string()));

        h.advance_time(SPEAKING_ON_DELAY);
        assert_eq!(spotlight_user(&h.layout.borrow()), Some(CAROL.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn pip_mode_shows_only_the_spotlight() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        h.connect(BOB, "DEV");

        h.input(EngineInput::SetPipEnabled(true));
        assert_eq!(*h.window_mode.borrow(), WindowMode::Pip);
        assert!(matches!(&*h.layout.borrow(), Layout::Pip { .. }));
        assert!(!*h.show_header.borrow());
        assert!(!*h.show_footer.borrow());

        h.input(EngineInput::SetPipEnabled(false));
        assert_eq!(*h.window_mode.borrow(), WindowMode::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn expanded_spotlight_floats_the_local_tile() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.input(EngineInput::SetGridMode(GridMode::Spotlight));
        h.input(EngineInput::ToggleSpotlightExpanded);

        let layout = h.layout.borrow().clone();
        match layout {
            Layout::SpotlightExpanded { spotlight, pip } => {
                assert!(spotlight.maximised());
                let pip = pip.expect("local tile should float");
                assert!(pip.media().is_local());
            }
            other => panic!("expected expanded spotlight, got {other}"),
        }

        h.input(EngineInput::SetAlwaysShowSelf(false));
        let layout = h.layout.borrow().clone();
        match layout {
            Layout::SpotlightExpanded { pip, .. } => assert!(pip.is_none()),
            other => panic!("expected expanded spotlight, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_shared_screen_floats_the_speaker_instead() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.input(EngineInput::SetGridMode(GridMode::Spotlight));
        h.input(EngineInput::ToggleSpotlightExpanded);
        h.media(MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV"),
            enabled: true,
        });

        let layout = h.layout.borrow().clone();
        match layout {
            Layout::SpotlightExpanded { spotlight, pip } => {
                assert!(spotlight.media().iter().all(MediaItem::is_screen_share));
                let pip = pip.expect("speaker tile should float over the share");
                assert_eq!(pip.media().participant_id().user.as_str(), BOB);
            }
            other => panic!("expected expanded spotlight, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn narrow_one_on_one_fills_the_window_with_the_remote() {
        let mut h = harness_with(ViewSettings::default(), (500.0, 500.0));
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV")]);
        h.connect(BOB, "DEV");
        assert_eq!(*h.window_mode.borrow(), WindowMode::Narrow);

        let layout = h.layout.borrow().clone();
        match layout {
            Layout::SpotlightExpanded { spotlight, pip } => {
                assert_eq!(spotlight.media().len(), 1);
                assert!(!spotlight.media()[0].is_local());
                assert!(pip.is_some_and(|tile| tile.media().is_local()));
            }
            other => panic!("expected expanded spotlight, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn narrow_switches_to_portrait_spotlight_when_crowded() {
        let mut h = harness_with(ViewSettings::default(), (500.0, 500.0));
        h.input(EngineInput::MembershipsChanged(roster(3)));
        assert!(matches!(&*h.layout.borrow(), Layout::Grid { .. }));

        h.input(EngineInput::MembershipsChanged(roster(5)));
        assert!(matches!(
            &*h.layout.borrow(),
            Layout::Spotlight { pip: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn focus_switch_holds_keep_tiles_until_the_drain_passes() {
        let mut h = harness();
        h.join(&[(ALICE, "LOCAL"), (BOB, "DEV"), (CAROL, "DEV")]);
        h.connect(BOB, "DEV");
        h.connect(CAROL, "DEV");

        h.media(MediaRoomEvent::ConnectionStateChanged(
            ConnectionState::SwitchingFocus,
        ));
        h.media(MediaRoomEvent::ParticipantDisconnected {
            identity: format!("{CAROL}:DEV"),
        });

        let carol_key = MediaKey::user_media(ParticipantId::new(CAROL, "DEV"), 0);
        let carol = h
            .engine
            .reconciler
            .items()
            .get(&carol_key)
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();
        assert!(carol.state().borrow().present);

        h.media(MediaRoomEvent::ConnectionStateChanged(
            ConnectionState::Connected,
        ));
        assert!(carol.state().borrow().present);

        h.advance_time(Duration::from_millis(3_000));
        assert!(!carol.state().borrow().present);
    }
}
