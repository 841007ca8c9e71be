//! Media items: the per-tile observable state handles.
//!
//! The reconciler owns creation and updates; consumers hold `Arc` handles
//! and read through watch receivers. Mutation requests (crop, volume) are
//! enqueued on the engine's control channel and applied on the engine task,
//! which then re-publishes through the item's own channels.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::ids::{MediaKey, ParticipantId};
use crate::media::ParticipantState;
use crate::reactions::ReactionOption;
use crate::signaling::MemberProfile;

const LOG_TARGET: &str = "MediaItem";

/// A mutation request for one media item.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRequest {
    pub key: MediaKey,
    pub control: MediaControl,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaControl {
    ToggleFitContain,
    SetVolume(f64),
    CommitVolume,
    ToggleLocallyMuted,
}

pub(crate) type ControlSender = mpsc::UnboundedSender<ControlRequest>;

/// Per-listener volume with the last committed non-zero value, so that
/// unmuting restores the slider position instead of snapping to full.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalVolume {
    pub volume: f64,
    committed: f64,
}

impl Default for LocalVolume {
    fn default() -> Self {
        Self {
            volume: 1.0,
            committed: 1.0,
        }
    }
}

impl LocalVolume {
    pub fn set(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Latch the current volume as the unmute target. A commit at zero (a
    /// slider released all the way down) keeps the previous target.
    pub fn commit(&mut self) {
        if self.volume > 0.0 {
            self.committed = self.volume;
        }
    }

    pub fn toggle_muted(&mut self) {
        self.volume = if self.volume == 0.0 { self.committed } else { 0.0 };
    }

    pub fn is_muted(&self) -> bool {
        self.volume == 0.0
    }
}

/// Track state of a user-media tile, mirrored from the transport
/// participant. An absent participant (signaling-only member) reads as all
/// false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserMediaState {
    pub present: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub sharing_screen: bool,
    /// Raw voice activity; see [`UserMedia::active_speaker`] for the
    /// debounced flag.
    pub speaking: bool,
}

impl From<ParticipantState> for UserMediaState {
    fn from(p: ParticipantState) -> Self {
        Self {
            present: true,
            audio_enabled: p.audio_enabled,
            video_enabled: p.video_enabled,
            sharing_screen: p.screen_share,
            speaking: p.speaking,
        }
    }
}

/// One user's camera-and-microphone feed in the call.
#[derive(Debug)]
pub struct UserMedia {
    key: MediaKey,
    local: bool,
    controls: ControlSender,
    profile: watch::Sender<Option<MemberProfile>>,
    state: watch::Sender<UserMediaState>,
    active_speaker: watch::Sender<bool>,
    hand_raised: watch::Sender<Option<DateTime<Utc>>>,
    reaction: watch::Sender<Option<ReactionOption>>,
    crop_video: watch::Sender<bool>,
    always_show: watch::Sender<bool>,
    volume: watch::Sender<LocalVolume>,
}

impl UserMedia {
    pub(crate) fn new(key: MediaKey, local: bool, always_show: bool, controls: ControlSender) -> Self {
        Self {
            key,
            local,
            controls,
            profile: watch::Sender::new(None),
            state: watch::Sender::new(UserMediaState::default()),
            active_speaker: watch::Sender::new(false),
            hand_raised: watch::Sender::new(None),
            reaction: watch::Sender::new(None),
            // Tiles crop to fill by default.
            crop_video: watch::Sender::new(true),
            always_show: watch::Sender::new(always_show),
            volume: watch::Sender::new(LocalVolume::default()),
        }
    }

    pub fn key(&self) -> &MediaKey {
        &self.key
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.key.participant
    }

    /// Whether this is the local user's own feed.
    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn profile(&self) -> watch::Receiver<Option<MemberProfile>> {
        self.profile.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<UserMediaState> {
        self.state.subscribe()
    }

    /// Debounced active-speaker flag.
    pub fn active_speaker(&self) -> watch::Receiver<bool> {
        self.active_speaker.subscribe()
    }

    pub fn hand_raised(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.hand_raised.subscribe()
    }

    pub fn reaction(&self) -> watch::Receiver<Option<ReactionOption>> {
        self.reaction.subscribe()
    }

    pub fn crop_video(&self) -> watch::Receiver<bool> {
        self.crop_video.subscribe()
    }

    /// Only meaningful on the local item: mirrors the always-show-self
    /// setting.
    pub fn always_show(&self) -> watch::Receiver<bool> {
        self.always_show.subscribe()
    }

    /// Listener-side volume for this participant. Stays at the default for
    /// the local item.
    pub fn local_volume(&self) -> watch::Receiver<LocalVolume> {
        self.volume.subscribe()
    }

    pub fn is_locally_muted(&self) -> bool {
        self.volume.borrow().is_muted()
    }

    pub fn toggle_fit_contain(&self) {
        self.request(MediaControl::ToggleFitContain);
    }

    pub fn set_volume(&self, volume: f64) {
        self.request(MediaControl::SetVolume(volume));
    }

    pub fn commit_volume(&self) {
        self.request(MediaControl::CommitVolume);
    }

    pub fn toggle_locally_muted(&self) {
        self.request(MediaControl::ToggleLocallyMuted);
    }

    fn request(&self, control: MediaControl) {
        let request = ControlRequest {
            key: self.key.clone(),
            control,
        };
        if self.controls.send(request).is_err() {
            log::debug!(target: LOG_TARGET, "control for {} dropped; engine gone", self.key);
        }
    }

    // Engine-side updates. All go through send_if_modified so receivers
    // only wake on real changes.

    pub(crate) fn set_participant(&self, participant: Option<ParticipantState>) {
        let next = participant.map(UserMediaState::from).unwrap_or_default();
        self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    pub(crate) fn set_profile(&self, profile: Option<MemberProfile>) {
        self.profile.send_if_modified(|current| {
            if *current == profile {
                false
            } else {
                *current = profile;
                true
            }
        });
    }

    pub(crate) fn set_active_speaker(&self, active: bool) {
        self.active_speaker.send_if_modified(|current| {
            if *current == active {
                false
            } else {
                *current = active;
                true
            }
        });
    }

    pub(crate) fn set_hand_raised(&self, time: Option<DateTime<Utc>>) {
        self.hand_raised.send_if_modified(|current| {
            if *current == time {
                false
            } else {
                *current = time;
                true
            }
        });
    }

    pub(crate) fn set_reaction(&self, reaction: Option<ReactionOption>) {
        self.reaction.send_if_modified(|current| {
            if *current == reaction {
                false
            } else {
                *current = reaction;
                true
            }
        });
    }

    pub(crate) fn set_always_show(&self, always_show: bool) {
        self.always_show.send_if_modified(|current| {
            if *current == always_show {
                false
            } else {
                *current = always_show;
                true
            }
        });
    }

    // Engine-side snapshot reads, used by the sort and spotlight passes.

    pub(crate) fn current_state(&self) -> UserMediaState {
        *self.state.borrow()
    }

    pub(crate) fn is_active_speaker(&self) -> bool {
        *self.active_speaker.borrow()
    }

    pub(crate) fn raised_hand_at(&self) -> Option<DateTime<Utc>> {
        *self.hand_raised.borrow()
    }

    pub(crate) fn always_shown(&self) -> bool {
        *self.always_show.borrow()
    }

    pub(crate) fn apply_control(&self, control: &MediaControl) {
        match control {
            MediaControl::ToggleFitContain => {
                self.crop_video.send_modify(|crop| *crop = !*crop);
            }
            MediaControl::SetVolume(v) => {
                if self.local {
                    log::debug!(target: LOG_TARGET, "ignoring volume control on local item {}", self.key);
                    return;
                }
                self.volume.send_modify(|volume| volume.set(*v));
            }
            MediaControl::CommitVolume => {
                if self.local {
                    return;
                }
                self.volume.send_modify(|volume| volume.commit());
            }
            MediaControl::ToggleLocallyMuted => {
                if self.local {
                    return;
                }
                self.volume.send_modify(|volume| volume.toggle_muted());
            }
        }
    }

    /// Freeze the item when its key disappears from the reconciled set.
    /// Consumers still holding the handle see an absent participant.
    pub(crate) fn retire(&self) {
        log::debug!(target: LOG_TARGET, "retiring media item {}", self.key);
        self.set_participant(None);
        self.set_active_speaker(false);
        self.set_reaction(None);
        self.set_hand_raised(None);
    }
}

/// State of a screen-share tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenShareState {
    pub present: bool,
}

/// One participant's screen-share feed.
#[derive(Debug)]
pub struct ScreenShare {
    key: MediaKey,
    local: bool,
    profile: watch::Sender<Option<MemberProfile>>,
    state: watch::Sender<ScreenShareState>,
}

impl ScreenShare {
    pub(crate) fn new(key: MediaKey, local: bool) -> Self {
        Self {
            key,
            local,
            profile: watch::Sender::new(None),
            state: watch::Sender::new(ScreenShareState::default()),
        }
    }

    pub fn key(&self) -> &MediaKey {
        &self.key
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.key.participant
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn profile(&self) -> watch::Receiver<Option<MemberProfile>> {
        self.profile.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<ScreenShareState> {
        self.state.subscribe()
    }

    pub(crate) fn set_profile(&self, profile: Option<MemberProfile>) {
        self.profile.send_if_modified(|current| {
            if *current == profile {
                false
            } else {
                *current = profile;
                true
            }
        });
    }

    pub(crate) fn set_present(&self, present: bool) {
        self.state.send_if_modified(|state| {
            if state.present == present {
                false
            } else {
                state.present = present;
                true
            }
        });
    }

    pub(crate) fn retire(&self) {
        log::debug!(target: LOG_TARGET, "retiring screen share {}", self.key);
        self.set_present(false);
    }
}

/// Either kind of reconciled media item.
#[derive(Debug, Clone)]
pub enum MediaItem {
    User(std::sync::Arc<UserMedia>),
    Screen(std::sync::Arc<ScreenShare>),
}

/// Identity comparison: two handles are equal when they point at the same
/// reconciled instance.
impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::User(a), Self::User(b)) => std::sync::Arc::ptr_eq(a, b),
            (Self::Screen(a), Self::Screen(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for MediaItem {}

impl MediaItem {
    pub fn key(&self) -> &MediaKey {
        match self {
            Self::User(m) => m.key(),
            Self::Screen(s) => s.key(),
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        match self {
            Self::User(m) => m.participant_id(),
            Self::Screen(s) => s.participant_id(),
        }
    }

    pub fn is_screen_share(&self) -> bool {
        matches!(self, Self::Screen(_))
    }

    pub fn is_local(&self) -> bool {
        match self {
            Self::User(m) => m.is_local(),
            Self::Screen(s) => s.is_local(),
        }
    }

    pub fn as_user(&self) -> Option<&std::sync::Arc<UserMedia>> {
        match self {
            Self::User(m) => Some(m),
            Self::Screen(_) => None,
        }
    }

    pub(crate) fn retire(&self) {
        match self {
            Self::User(m) => m.retire(),
            Self::Screen(s) => s.retire(),
        }
    }
}
