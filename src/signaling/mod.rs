//! Signaling-layer collaborator: call memberships, room events, and the
//! room seam used to send reactions and redactions.
//!
//! The engine never talks to a live homeserver. Membership changes arrive
//! through a watch channel, room events through a broadcast channel, and
//! sends go through the [`SignalingRoom`] trait.

mod event;
mod membership;
mod room;

pub use event::{
    CALL_REACTION_EVENT_TYPE, CallReactionContent, DecryptionState, REACTION_EVENT_TYPE,
    REDACTION_EVENT_TYPE, RELATION_ANNOTATION, RELATION_REFERENCE, ReactionContent, Relation,
    SignalingEvent, SignalingEventKind, SignalingRoomEvent,
};
pub use membership::{CallMembership, MemberProfile};
pub use room::{CallSignaling, SignalingError, SignalingRoom};
