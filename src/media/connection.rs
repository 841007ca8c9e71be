use std::fmt;

/// Connection state of the media transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Tearing down the connection to one media focus and establishing a
    /// connection to another. Remote participants briefly vanish from the
    /// transport while this is in progress.
    SwitchingFocus,
}

impl ConnectionState {
    pub fn is_switching_focus(self) -> bool {
        self == Self::SwitchingFocus
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::SwitchingFocus => "switching-focus",
        };
        f.write_str(s)
    }
}
