//! Test doubles and fixtures. Not part of the public API; exposed so
//! integration tests can share them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{broadcast, watch};

use crate::ids::{DeviceId, EventId, ParticipantId, RoomId, UserId};
use crate::signaling::{
    CallMembership, CallReactionContent, CallSignaling, DecryptionState, MemberProfile,
    ReactionContent, SignalingError, SignalingEvent, SignalingEventKind, SignalingRoom,
    SignalingRoomEvent,
};

pub fn test_room_id() -> RoomId {
    RoomId::from("!call:example.org")
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

pub fn membership(user: &str, device: &str, event_id: &str) -> CallMembership {
    CallMembership {
        sender: UserId::from(user),
        device_id: DeviceId::from(device),
        membership_event_id: EventId::from(event_id),
        created_at: ts(0),
    }
}

pub fn reaction_event(
    sender: &str,
    id: &str,
    target: &str,
    key: &str,
    at: DateTime<Utc>,
) -> SignalingEvent {
    SignalingEvent {
        id: Some(EventId::from(id)),
        room: test_room_id(),
        sender: Some(UserId::from(sender)),
        origin_ts: at,
        sending: false,
        decryption: DecryptionState::Decrypted,
        kind: SignalingEventKind::Reaction(ReactionContent::annotation(EventId::from(target), key)),
    }
}

pub fn call_reaction_event(
    sender: &str,
    id: &str,
    target: &str,
    emoji: &str,
    name: &str,
    at: DateTime<Utc>,
) -> SignalingEvent {
    SignalingEvent {
        id: Some(EventId::from(id)),
        room: test_room_id(),
        sender: Some(UserId::from(sender)),
        origin_ts: at,
        sending: false,
        decryption: DecryptionState::Decrypted,
        kind: SignalingEventKind::CallReaction(CallReactionContent::new(
            EventId::from(target),
            emoji,
            name,
        )),
    }
}

pub fn redaction_event(sender: &str, id: &str, redacts: &str) -> SignalingEvent {
    SignalingEvent {
        id: Some(EventId::from(id)),
        room: test_room_id(),
        sender: Some(UserId::from(sender)),
        origin_ts: ts(0),
        sending: false,
        decryption: DecryptionState::Decrypted,
        kind: SignalingEventKind::Redaction {
            redacts: EventId::from(redacts),
        },
    }
}

/// In-memory signaling room: records sends, serves scripted annotation
/// lookups and member profiles.
pub struct MockSignalingRoom {
    room_id: RoomId,
    local: ParticipantId,
    profiles: Mutex<HashMap<UserId, MemberProfile>>,
    annotations: Mutex<HashMap<EventId, Vec<SignalingEvent>>>,
    pub sent_reactions: Mutex<Vec<(EventId, String)>>,
    pub sent_call_reactions: Mutex<Vec<(EventId, String, String)>>,
    pub redacted: Mutex<Vec<EventId>>,
    pub fail_sends: AtomicBool,
    next_event: AtomicU64,
}

impl MockSignalingRoom {
    pub fn new(local: ParticipantId) -> Arc<Self> {
        Arc::new(Self {
            room_id: test_room_id(),
            local,
            profiles: Mutex::new(HashMap::new()),
            annotations: Mutex::new(HashMap::new()),
            sent_reactions: Mutex::new(Vec::new()),
            sent_call_reactions: Mutex::new(Vec::new()),
            redacted: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            next_event: AtomicU64::new(0),
        })
    }

    pub fn set_profile(&self, user: &str, display_name: &str) {
        let user = UserId::from(user);
        self.profiles.lock().unwrap().insert(
            user.clone(),
            MemberProfile {
                user,
                display_name: Some(display_name.to_string()),
                avatar_url: None,
            },
        );
    }

    pub fn add_annotation(&self, target: &str, event: SignalingEvent) {
        self.annotations
            .lock()
            .unwrap()
            .entry(EventId::from(target))
            .or_default()
            .push(event);
    }

    fn fresh_event_id(&self) -> EventId {
        let n = self.next_event.fetch_add(1, Ordering::SeqCst);
        EventId::new(format!("$sent-{n}"))
    }
}

#[async_trait]
impl SignalingRoom for MockSignalingRoom {
    fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    fn member_profile(&self, user: &UserId) -> Option<MemberProfile> {
        self.profiles.lock().unwrap().get(user).cloned()
    }

    fn annotations_for(&self, target: &EventId) -> Vec<SignalingEvent> {
        self.annotations
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    async fn send_reaction(&self, target: &EventId, key: &str) -> Result<EventId, SignalingError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport("mock send failure".to_string()));
        }
        let id = self.fresh_event_id();
        self.sent_reactions
            .lock()
            .unwrap()
            .push((target.clone(), key.to_string()));
        Ok(id)
    }

    async fn send_call_reaction(
        &self,
        target: &EventId,
        emoji: &str,
        name: &str,
    ) -> Result<EventId, SignalingError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport("mock send failure".to_string()));
        }
        let id = self.fresh_event_id();
        self.sent_call_reactions.lock().unwrap().push((
            target.clone(),
            emoji.to_string(),
            name.to_string(),
        ));
        Ok(id)
    }

    async fn redact(&self, event: &EventId) -> Result<(), SignalingError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SignalingError::Transport("mock send failure".to_string()));
        }
        self.redacted.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Drivable signaling fixture: the mock room plus the channels a live
/// integration would feed.
pub struct TestSignaling {
    pub room: Arc<MockSignalingRoom>,
    pub memberships: watch::Sender<Vec<CallMembership>>,
    pub events: broadcast::Sender<SignalingRoomEvent>,
}

impl TestSignaling {
    pub fn new(local: ParticipantId) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            room: MockSignalingRoom::new(local),
            memberships: watch::Sender::new(Vec::new()),
            events,
        }
    }

    pub fn signaling(&self) -> CallSignaling {
        CallSignaling {
            room: self.room.clone(),
            memberships: self.memberships.subscribe(),
            events: self.events.clone(),
        }
    }

    pub fn set_memberships(&self, memberships: Vec<CallMembership>) {
        self.memberships.send_replace(memberships);
    }

    pub fn publish(&self, event: SignalingRoomEvent) {
        // Dropped silently when nothing is subscribed yet.
        let _ = self.events.send(event);
    }
}
