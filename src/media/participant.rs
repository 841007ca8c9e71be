use super::connection::ConnectionState;

/// Track-level state of one transport participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticipantState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub screen_share: bool,
    /// Raw voice-activity signal, before hysteresis.
    pub speaking: bool,
}

/// Events from the media transport. Identities are the transport's raw
/// strings; [`MediaRoomState`](super::MediaRoomState) parses them into
/// participant ids when folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRoomEvent {
    ConnectionStateChanged(ConnectionState),
    ParticipantConnected {
        identity: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    MediaStateChanged {
        identity: String,
        audio_enabled: bool,
        video_enabled: bool,
    },
    ScreenShareChanged {
        identity: String,
        enabled: bool,
    },
    SpeakingChanged {
        identity: String,
        speaking: bool,
    },
}
