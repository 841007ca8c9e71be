//! Identifier types shared across the engine.
//!
//! Participants are keyed by the pair of signaling user id and device id.
//! User ids may themselves contain colons, so the transport identity string
//! `"{user}:{device}"` is always split on the last colon.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("invalid participant identity: {0}")]
    InvalidIdentity(String),
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Signaling-layer user id.
    UserId
);
string_id!(
    /// One device of a user; a user can join a call from several devices.
    DeviceId
);
string_id!(RoomId);
string_id!(EventId);

/// Compound key identifying one device of one user in a call.
///
/// This is the unit of participation: membership entries, transport
/// participants, raised hands, and reactions are all keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId {
    pub user: UserId,
    pub device: DeviceId,
}

impl ParticipantId {
    pub fn new(user: impl Into<UserId>, device: impl Into<DeviceId>) -> Self {
        Self {
            user: user.into(),
            device: device.into(),
        }
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.device)
    }
}

impl FromStr for ParticipantId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // User ids can contain colons, the device id cannot.
        let Some((user, device)) = s.rsplit_once(':') else {
            return Err(IdError::InvalidIdentity(s.to_string()));
        };
        if user.is_empty() || device.is_empty() {
            return Err(IdError::InvalidIdentity(s.to_string()));
        }
        Ok(Self::new(user, device))
    }
}

/// What a media item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    UserMedia,
    ScreenShare,
}

/// Key of one media item in the reconciled set.
///
/// `index` distinguishes duplicate tiles of the same participant; the
/// primary tile has index 0. Rendered as `"{user}:{device}:{index}"`, with a
/// `":screen-share"` suffix for screen-share items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaKey {
    pub participant: ParticipantId,
    pub index: usize,
    pub kind: MediaKind,
}

impl MediaKey {
    pub fn user_media(participant: ParticipantId, index: usize) -> Self {
        Self {
            participant,
            index,
            kind: MediaKind::UserMedia,
        }
    }

    /// The screen-share key paired with this user-media key.
    pub fn screen_share(&self) -> Self {
        Self {
            participant: self.participant.clone(),
            index: self.index,
            kind: MediaKind::ScreenShare,
        }
    }

    pub fn is_screen_share(&self) -> bool {
        self.kind == MediaKind::ScreenShare
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.participant, self.index)?;
        if self.kind == MediaKind::ScreenShare {
            f.write_str(":screen-share")?;
        }
        Ok(())
    }
}

/// Identity of a layout tile, stable while the underlying media persists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileId(pub String);

impl TileId {
    pub fn grid(media: &MediaKey) -> Self {
        Self(format!("grid:{media}"))
    }

    pub fn spotlight() -> Self {
        Self("spotlight".to_string())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
