//! Event model for the signaling room.
//!
//! Only the event shapes this engine reacts to are modeled: annotation
//! reactions (hand raises), call reactions (ephemeral emoji), and
//! redactions. Everything else arrives as [`SignalingEventKind::Other`] and
//! is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, RoomId, UserId};

pub const REACTION_EVENT_TYPE: &str = "m.reaction";
pub const CALL_REACTION_EVENT_TYPE: &str = "m.call.reaction";
pub const REDACTION_EVENT_TYPE: &str = "m.room.redaction";

pub const RELATION_ANNOTATION: &str = "m.annotation";
pub const RELATION_REFERENCE: &str = "m.reference";

/// Relation block connecting a reaction-style event to its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub rel_type: String,
    pub event_id: EventId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Content of an `m.reaction` event: an annotation with a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContent {
    #[serde(rename = "m.relates_to")]
    pub relates_to: Relation,
}

impl ReactionContent {
    pub fn annotation(target: EventId, key: impl Into<String>) -> Self {
        Self {
            relates_to: Relation {
                rel_type: RELATION_ANNOTATION.to_string(),
                event_id: target,
                key: Some(key.into()),
            },
        }
    }

    pub fn is_annotation(&self) -> bool {
        self.relates_to.rel_type == RELATION_ANNOTATION
    }

    pub fn key(&self) -> Option<&str> {
        self.relates_to.key.as_deref()
    }
}

/// Content of an `m.call.reaction` event: a reference relation plus the
/// reaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReactionContent {
    #[serde(rename = "m.relates_to")]
    pub relates_to: Relation,
    pub emoji: String,
    pub name: String,
}

impl CallReactionContent {
    pub fn new(target: EventId, emoji: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relates_to: Relation {
                rel_type: RELATION_REFERENCE.to_string(),
                event_id: target,
                key: None,
            },
            emoji: emoji.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEventKind {
    Reaction(ReactionContent),
    CallReaction(CallReactionContent),
    Redaction { redacts: EventId },
    Other,
}

/// Decryption status at delivery time. `Pending` events come back through
/// [`SignalingRoomEvent::DecryptionCompleted`] once readable; `Failed`
/// events never will.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionState {
    Decrypted,
    Pending,
    Failed,
}

/// One event as delivered by the signaling room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEvent {
    /// None while the event is a local echo without a server-assigned id.
    pub id: Option<EventId>,
    pub room: RoomId,
    pub sender: Option<UserId>,
    pub origin_ts: DateTime<Utc>,
    /// Local echo still in flight; re-delivered via `LocalEchoUpdated`.
    pub sending: bool,
    pub decryption: DecryptionState,
    pub kind: SignalingEventKind,
}

/// Delivery paths for room events. All four feed the same handler; they are
/// distinct because echoed and late-decrypted events re-enter through their
/// own notifications.
#[derive(Debug, Clone)]
pub enum SignalingRoomEvent {
    Timeline(SignalingEvent),
    Redaction(SignalingEvent),
    LocalEchoUpdated(SignalingEvent),
    DecryptionCompleted(SignalingEvent),
}

impl SignalingRoomEvent {
    pub fn event(&self) -> &SignalingEvent {
        match self {
            Self::Timeline(e)
            | Self::Redaction(e)
            | Self::LocalEchoUpdated(e)
            | Self::DecryptionCompleted(e) => e,
        }
    }

    pub fn into_event(self) -> SignalingEvent {
        match self {
            Self::Timeline(e)
            | Self::Redaction(e)
            | Self::LocalEchoUpdated(e)
            | Self::DecryptionCompleted(e) => e,
        }
    }
}
