//! The aggregation task folding signaling events into hand-raise and
//! reaction state.
//!
//! One task owns all aggregate state. Membership changes and room events
//! arrive through the signaling channels; expiry sweeps run on the task's
//! own timer. Outputs are watch channels that only notify on real changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use unicode_segmentation::UnicodeSegmentation;

use super::{RAISED_HAND_KEY, RaisedHandInfo, ReactionOption, find_reaction};
use crate::ids::{EventId, ParticipantId};
use crate::scope::Scope;
use crate::signaling::{
    CallMembership, CallSignaling, DecryptionState, SignalingError, SignalingEventKind,
    SignalingRoom, SignalingRoomEvent,
};

const LOG_TARGET: &str = "Reactions";

/// How long an ephemeral reaction stays active.
pub const REACTION_ACTIVE_TIME: Duration = Duration::from_millis(3000);
/// Extra delay before an expiry sweep, so a sweep never runs early.
pub const REACTION_SWEEP_SLACK: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ReactionError {
    #[error("no current call membership for the local user")]
    NoOwnMembership,
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

/// Handle to the aggregation task.
///
/// Dropping the handle (or calling [`end`](Self::end)) stops the task; the
/// output receivers stay readable at their last value.
pub struct ReactionAggregator {
    room: Arc<dyn SignalingRoom>,
    memberships: watch::Receiver<Vec<CallMembership>>,
    raised_hands: watch::Receiver<HashMap<ParticipantId, RaisedHandInfo>>,
    reactions: watch::Receiver<HashMap<ParticipantId, ReactionOption>>,
    scope: Scope,
}

impl ReactionAggregator {
    pub fn start(signaling: &CallSignaling) -> Self {
        let hands_tx = watch::Sender::new(HashMap::new());
        let reactions_tx = watch::Sender::new(HashMap::new());
        let raised_hands = hands_tx.subscribe();
        let reactions = reactions_tx.subscribe();

        let task = AggregatorTask {
            room: signaling.room.clone(),
            memberships: signaling.memberships.clone(),
            events: signaling.subscribe_events(),
            hands: HashMap::new(),
            reactions: HashMap::new(),
            sweeps: Vec::new(),
            hands_tx,
            reactions_tx,
        };
        let mut scope = Scope::new();
        scope.spawn(task.run());

        Self {
            room: signaling.room.clone(),
            memberships: signaling.memberships.clone(),
            raised_hands,
            reactions,
            scope,
        }
    }

    /// Raised hands by participant, with the backing event ids.
    pub fn raised_hands(&self) -> watch::Receiver<HashMap<ParticipantId, RaisedHandInfo>> {
        self.raised_hands.clone()
    }

    /// Active ephemeral reactions by participant.
    pub fn reactions(&self) -> watch::Receiver<HashMap<ParticipantId, ReactionOption>> {
        self.reactions.clone()
    }

    /// Raise the local user's hand, or lower it if currently raised.
    ///
    /// Returns the sent reaction event id when raising, `None` when
    /// lowering. State is not updated optimistically; the aggregate changes
    /// once the event comes back through the room event stream.
    pub async fn toggle_raised_hand(&self) -> Result<Option<EventId>, ReactionError> {
        let me = self.room.local_participant().clone();
        let existing = self.raised_hands.borrow().get(&me).cloned();
        match existing {
            Some(info) => {
                self.room.redact(&info.reaction_event_id).await?;
                debug!(target: LOG_TARGET, "lowered hand by redacting {}", info.reaction_event_id);
                Ok(None)
            }
            None => {
                let membership = self.own_membership().ok_or(ReactionError::NoOwnMembership)?;
                let id = self
                    .room
                    .send_reaction(&membership.membership_event_id, RAISED_HAND_KEY)
                    .await?;
                debug!(target: LOG_TARGET, "raised hand with {id}");
                Ok(Some(id))
            }
        }
    }

    /// Send an ephemeral reaction on behalf of the local user.
    pub async fn send_reaction(&self, option: &ReactionOption) -> Result<EventId, ReactionError> {
        let membership = self.own_membership().ok_or(ReactionError::NoOwnMembership)?;
        let id = self
            .room
            .send_call_reaction(&membership.membership_event_id, &option.emoji, &option.name)
            .await?;
        Ok(id)
    }

    pub fn end(&mut self) {
        self.scope.end();
    }

    fn own_membership(&self) -> Option<CallMembership> {
        let me = self.room.local_participant();
        self.memberships
            .borrow()
            .iter()
            .find(|m| m.participant_id() == *me)
            .cloned()
    }
}

struct ActiveReaction {
    option: ReactionOption,
    expires_at: Instant,
}

struct AggregatorTask {
    room: Arc<dyn SignalingRoom>,
    memberships: watch::Receiver<Vec<CallMembership>>,
    events: broadcast::Receiver<SignalingRoomEvent>,
    hands: HashMap<ParticipantId, RaisedHandInfo>,
    reactions: HashMap<ParticipantId, ActiveReaction>,
    sweeps: Vec<Instant>,
    hands_tx: watch::Sender<HashMap<ParticipantId, RaisedHandInfo>>,
    reactions_tx: watch::Sender<HashMap<ParticipantId, ReactionOption>>,
}

impl AggregatorTask {
    async fn run(mut self) {
        debug!(target: LOG_TARGET, "aggregator started");
        let initial = self.memberships.borrow_and_update().clone();
        self.apply_memberships(&initial);
        self.publish();

        loop {
            let next_sweep = self.sweeps.iter().min().copied();
            tokio::select! {
                changed = self.memberships.changed() => match changed {
                    Ok(()) => {
                        let current = self.memberships.borrow_and_update().clone();
                        self.apply_memberships(&current);
                    }
                    Err(_) => break,
                },
                event = self.events.recv() => match event {
                    Ok(event) => self.handle_room_event(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: LOG_TARGET, "room event stream lagged by {n}; re-priming from annotations");
                        let current = self.memberships.borrow().clone();
                        self.apply_memberships(&current);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tokio::time::sleep_until(next_sweep.unwrap_or_else(Instant::now)),
                    if next_sweep.is_some() =>
                {
                    self.sweep(Instant::now());
                }
            }
            self.publish();
        }
        debug!(target: LOG_TARGET, "aggregator stopped");
    }

    /// Prune state invalidated by membership changes and pick up hands
    /// raised before we started listening.
    fn apply_memberships(&mut self, memberships: &[CallMembership]) {
        let current: HashMap<ParticipantId, &CallMembership> = memberships
            .iter()
            .map(|m| (m.participant_id(), m))
            .collect();

        self.hands.retain(|pid, info| {
            let valid = current
                .get(pid)
                .is_some_and(|m| m.membership_event_id == info.membership_event_id);
            if !valid {
                debug!(target: LOG_TARGET, "dropping raised hand of {pid}: membership gone or replaced");
            }
            valid
        });
        self.reactions.retain(|pid, _| {
            let present = current.contains_key(pid);
            if !present {
                debug!(target: LOG_TARGET, "dropping reaction of departed {pid}");
            }
            present
        });

        for m in memberships {
            for event in self.room.annotations_for(&m.membership_event_id) {
                let SignalingEventKind::Reaction(content) = &event.kind else {
                    continue;
                };
                if !content.is_annotation() || content.key() != Some(RAISED_HAND_KEY) {
                    continue;
                }
                if event.sender.as_ref() != Some(&m.sender) {
                    continue;
                }
                let Some(id) = event.id.clone() else {
                    continue;
                };
                // Later annotations overwrite earlier ones.
                self.hands.insert(
                    m.participant_id(),
                    RaisedHandInfo {
                        membership_event_id: m.membership_event_id.clone(),
                        reaction_event_id: id,
                        time: event.origin_ts,
                    },
                );
            }
        }
    }

    fn handle_room_event(&mut self, room_event: SignalingRoomEvent) {
        let event = room_event.into_event();
        if event.room != *self.room.room_id() {
            warn!(target: LOG_TARGET, "ignoring event for room {}", event.room);
            return;
        }
        if event.sending {
            debug!(target: LOG_TARGET, "skipping local echo still in flight");
            return;
        }
        match event.decryption {
            DecryptionState::Pending => {
                debug!(target: LOG_TARGET, "skipping event pending decryption");
                return;
            }
            DecryptionState::Failed => {
                debug!(target: LOG_TARGET, "dropping undecryptable event");
                return;
            }
            DecryptionState::Decrypted => {}
        }
        let (Some(id), Some(sender)) = (event.id.clone(), event.sender.clone()) else {
            debug!(target: LOG_TARGET, "skipping event without id or sender");
            return;
        };

        match &event.kind {
            SignalingEventKind::Reaction(content) => {
                if !content.is_annotation() || content.key() != Some(RAISED_HAND_KEY) {
                    return;
                }
                let Some(membership) = self.membership_for_event(&content.relates_to.event_id)
                else {
                    warn!(target: LOG_TARGET, "hand raise {id} targets no current membership");
                    return;
                };
                if membership.sender != sender {
                    warn!(
                        target: LOG_TARGET,
                        "hand raise {id} from {sender} does not match membership of {}",
                        membership.sender
                    );
                    return;
                }
                let pid = membership.participant_id();
                debug!(target: LOG_TARGET, "hand raised by {pid}");
                self.hands.insert(
                    pid,
                    RaisedHandInfo {
                        membership_event_id: membership.membership_event_id,
                        reaction_event_id: id,
                        time: event.origin_ts,
                    },
                );
            }
            SignalingEventKind::CallReaction(content) => {
                let Some(membership) = self.membership_for_event(&content.relates_to.event_id)
                else {
                    warn!(target: LOG_TARGET, "reaction {id} targets no current membership");
                    return;
                };
                if membership.sender != sender {
                    warn!(
                        target: LOG_TARGET,
                        "reaction {id} from {sender} does not match membership of {}",
                        membership.sender
                    );
                    return;
                }
                let Some(emoji) = first_grapheme(&content.emoji) else {
                    warn!(target: LOG_TARGET, "reaction {id} carries no usable emoji");
                    return;
                };
                let pid = membership.participant_id();
                if self.reactions.contains_key(&pid) {
                    debug!(target: LOG_TARGET, "{pid} already has an active reaction");
                    return;
                }
                let option =
                    find_reaction(&content.name).unwrap_or_else(|| ReactionOption::generic(emoji));
                debug!(target: LOG_TARGET, "reaction {} from {pid}", option.name);
                let now = Instant::now();
                self.reactions.insert(
                    pid,
                    ActiveReaction {
                        option,
                        expires_at: now + REACTION_ACTIVE_TIME,
                    },
                );
                self.sweeps
                    .push(now + REACTION_ACTIVE_TIME + REACTION_SWEEP_SLACK);
            }
            SignalingEventKind::Redaction { redacts } => {
                self.hands.retain(|pid, info| {
                    if info.reaction_event_id == *redacts {
                        debug!(target: LOG_TARGET, "hand lowered by {pid}");
                        false
                    } else {
                        true
                    }
                });
            }
            SignalingEventKind::Other => {}
        }
    }

    fn sweep(&mut self, now: Instant) {
        self.sweeps.retain(|t| *t > now);
        self.reactions.retain(|pid, reaction| {
            let live = reaction.expires_at > now;
            if !live {
                debug!(target: LOG_TARGET, "reaction of {pid} expired");
            }
            live
        });
    }

    fn membership_for_event(&self, event_id: &EventId) -> Option<CallMembership> {
        self.memberships
            .borrow()
            .iter()
            .find(|m| m.membership_event_id == *event_id)
            .cloned()
    }

    fn publish(&self) {
        self.hands_tx.send_if_modified(|current| {
            if *current == self.hands {
                false
            } else {
                current.clone_from(&self.hands);
                true
            }
        });
        let projected: HashMap<ParticipantId, ReactionOption> = self
            .reactions
            .iter()
            .map(|(pid, r)| (pid.clone(), r.option.clone()))
            .collect();
        self.reactions_tx.send_if_modified(|current| {
            if *current == projected {
                false
            } else {
                *current = projected;
                true
            }
        });
    }
}

/// First grapheme cluster of the trimmed input, if any.
fn first_grapheme(emoji: &str) -> Option<&str> {
    emoji.trim().graphemes(true).next()
}
