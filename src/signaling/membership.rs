use chrono::{DateTime, Utc};

use crate::ids::{DeviceId, EventId, ParticipantId, UserId};

/// One announced call participation: a (user, device) pair backed by a
/// membership state event in the signaling room.
///
/// Reactions and hand raises target `membership_event_id`, which also serves
/// as the staleness marker: when a participant rejoins, the new membership
/// carries a new event id and aggregate state tied to the old one is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMembership {
    pub sender: UserId,
    pub device_id: DeviceId,
    pub membership_event_id: EventId,
    pub created_at: DateTime<Utc>,
}

impl CallMembership {
    pub fn participant_id(&self) -> ParticipantId {
        ParticipantId {
            user: self.sender.clone(),
            device: self.device_id.clone(),
        }
    }
}

/// Display metadata of a room member, used for tile labels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberProfile {
    pub user: UserId,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl MemberProfile {
    /// Label shown on a tile; falls back to the user id.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.user.as_str())
    }
}
