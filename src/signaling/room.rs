use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::event::{SignalingEvent, SignalingRoomEvent};
use super::membership::{CallMembership, MemberProfile};
use crate::ids::{EventId, ParticipantId, RoomId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("not connected to the signaling room")]
    NotConnected,
    #[error("not permitted to send {0}")]
    PermissionDenied(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The signaling-room seam. The engine only ever talks to this trait; live
/// rooms and test doubles both sit behind it.
#[async_trait]
pub trait SignalingRoom: Send + Sync {
    fn room_id(&self) -> &RoomId;

    /// Identity of the local user's device in this call.
    fn local_participant(&self) -> &ParticipantId;

    /// Display metadata for a room member. Absence is tolerated by callers,
    /// which fall back to the raw user id.
    fn member_profile(&self, user: &UserId) -> Option<MemberProfile>;

    /// Annotation-type reactions currently targeting the given event, used
    /// for the initial hand-raise pass over existing memberships.
    fn annotations_for(&self, target: &EventId) -> Vec<SignalingEvent>;

    /// Send an annotation reaction (hand raise) targeting `target`.
    async fn send_reaction(&self, target: &EventId, key: &str)
    -> Result<EventId, SignalingError>;

    /// Send a call reaction (ephemeral emoji) targeting `target`.
    async fn send_call_reaction(
        &self,
        target: &EventId,
        emoji: &str,
        name: &str,
    ) -> Result<EventId, SignalingError>;

    /// Redact a previously sent event (hand lower).
    async fn redact(&self, event: &EventId) -> Result<(), SignalingError>;
}

/// Everything the engine consumes from the signaling layer, bundled for
/// construction: the room seam, the live membership list, and the room
/// event feed.
#[derive(Clone)]
pub struct CallSignaling {
    pub room: Arc<dyn SignalingRoom>,
    pub memberships: watch::Receiver<Vec<CallMembership>>,
    pub events: broadcast::Sender<SignalingRoomEvent>,
}

impl CallSignaling {
    pub fn subscribe_events(&self) -> broadcast::Receiver<SignalingRoomEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for CallSignaling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSignaling")
            .field("room", self.room.room_id())
            .field("memberships", &self.memberships.borrow().len())
            .finish()
    }
}
