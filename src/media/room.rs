use std::collections::HashMap;

use super::connection::ConnectionState;
use super::participant::{MediaRoomEvent, ParticipantState};
use crate::ids::ParticipantId;

const LOG_TARGET: &str = "MediaRoom";

/// Pure view of the media room, folded from transport events.
///
/// The local participant is always present; remote participants exist while
/// connected. State updates for a remote the transport has not announced
/// yet are tolerated and create the entry.
#[derive(Debug, Clone)]
pub struct MediaRoomState {
    local: ParticipantId,
    connection: ConnectionState,
    local_state: ParticipantState,
    remotes: HashMap<ParticipantId, ParticipantState>,
}

impl MediaRoomState {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            connection: ConnectionState::default(),
            local_state: ParticipantState::default(),
            remotes: HashMap::new(),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn local_state(&self) -> ParticipantState {
        self.local_state
    }

    pub fn remotes(&self) -> &HashMap<ParticipantId, ParticipantState> {
        &self.remotes
    }

    /// Track state for any participant id; the local participant always
    /// resolves, remotes only while connected.
    pub fn state_of(&self, id: &ParticipantId) -> Option<ParticipantState> {
        if *id == self.local {
            Some(self.local_state)
        } else {
            self.remotes.get(id).copied()
        }
    }

    /// Fold one transport event into the state. Returns whether anything
    /// changed.
    pub fn apply(&mut self, event: &MediaRoomEvent) -> bool {
        match event {
            MediaRoomEvent::ConnectionStateChanged(state) => {
                if self.connection == *state {
                    return false;
                }
                log::debug!(target: LOG_TARGET, "connection state {} -> {}", self.connection, state);
                self.connection = *state;
                true
            }
            MediaRoomEvent::ParticipantConnected { identity } => {
                let Some(id) = self.parse_identity(identity) else {
                    return false;
                };
                if id == self.local {
                    return false;
                }
                log::debug!(target: LOG_TARGET, "participant connected: {id}");
                self.remotes.insert(id, ParticipantState::default());
                true
            }
            MediaRoomEvent::ParticipantDisconnected { identity } => {
                let Some(id) = self.parse_identity(identity) else {
                    return false;
                };
                if self.remotes.remove(&id).is_some() {
                    log::debug!(target: LOG_TARGET, "participant disconnected: {id}");
                    true
                } else {
                    false
                }
            }
            MediaRoomEvent::MediaStateChanged {
                identity,
                audio_enabled,
                video_enabled,
            } => self.update(identity, |state| {
                state.audio_enabled = *audio_enabled;
                state.video_enabled = *video_enabled;
            }),
            MediaRoomEvent::ScreenShareChanged { identity, enabled } => {
                self.update(identity, |state| state.screen_share = *enabled)
            }
            MediaRoomEvent::SpeakingChanged { identity, speaking } => {
                self.update(identity, |state| state.speaking = *speaking)
            }
        }
    }

    fn update(&mut self, identity: &str, f: impl FnOnce(&mut ParticipantState)) -> bool {
        let Some(id) = self.parse_identity(identity) else {
            return false;
        };
        let state = if id == self.local {
            &mut self.local_state
        } else {
            self.remotes.entry(id).or_default()
        };
        let before = *state;
        f(state);
        before != *state
    }

    fn parse_identity(&self, identity: &str) -> Option<ParticipantId> {
        match identity.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!(target: LOG_TARGET, "ignoring event for unparseable identity: {e}");
                None
            }
        }
    }
}
