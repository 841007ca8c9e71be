//! Reconciliation of signaling memberships with transport participants.
//!
//! Membership is the basis: every announced (user, device) yields a tile,
//! whether or not media is flowing yet. Transport participants attach to
//! their membership's items; screen-share items come and go with the
//! participant's screen-share flag. Item instances are stable: a key that
//! survives a rebuild keeps its exact item, so downstream layers can hold
//! references across updates.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, warn};
use tokio::time::Instant;

use super::media_item::{ControlSender, MediaItem, ScreenShare, UserMedia};
use crate::ids::{MediaKey, ParticipantId};
use crate::media::{ConnectionState, MediaRoomState, ParticipantState};
use crate::settings::ViewSettings;
use crate::signaling::{CallMembership, SignalingRoom};

const LOG_TARGET: &str = "Reconcile";

/// How long participants captured at a focus switch stay visible after the
/// connection leaves the switching state.
pub const POST_FOCUS_SWITCH_HOLD: Duration = Duration::from_millis(3000);

/// Join/leave transitions derived from the reconciled user-media id list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemberChanges {
    pub ids: Vec<MediaKey>,
    pub joined: Vec<MediaKey>,
    pub left: Vec<MediaKey>,
}

/// Remote participants captured when the transport started switching focus.
/// Released 3000ms after the switching state ends.
#[derive(Debug, Clone)]
struct Hold {
    participants: HashMap<ParticipantId, ParticipantState>,
    release_at: Option<Instant>,
}

pub struct Reconciler {
    local: ParticipantId,
    controls: ControlSender,
    items: IndexMap<MediaKey, MediaItem>,
    holds: Vec<Hold>,
    switching: bool,
    previous_ids: Vec<MediaKey>,
    primed: bool,
}

impl Reconciler {
    pub fn new(local: ParticipantId, controls: ControlSender) -> Self {
        Self {
            local,
            controls,
            items: IndexMap::new(),
            holds: Vec::new(),
            switching: false,
            previous_ids: Vec::new(),
            primed: false,
        }
    }

    pub fn items(&self) -> &IndexMap<MediaKey, MediaItem> {
        &self.items
    }

    pub fn user_media(&self) -> impl Iterator<Item = &Arc<UserMedia>> {
        self.items.values().filter_map(MediaItem::as_user)
    }

    pub fn screen_shares(&self) -> impl Iterator<Item = &Arc<ScreenShare>> {
        self.items.values().filter_map(|item| match item {
            MediaItem::Screen(share) => Some(share),
            MediaItem::User(_) => None,
        })
    }

    /// Track connection transitions for hold capture. The remote set is
    /// snapshotted when the transport enters the switching state; the
    /// release timer starts when it leaves.
    pub fn connection_changed(&mut self, state: ConnectionState, media: &MediaRoomState, now: Instant) {
        let switching = state.is_switching_focus();
        if switching && !self.switching {
            debug!(
                target: LOG_TARGET,
                "focus switch started; holding {} remote participants",
                media.remotes().len()
            );
            self.holds.push(Hold {
                participants: media.remotes().clone(),
                release_at: None,
            });
        } else if !switching && self.switching {
            for hold in self.holds.iter_mut().filter(|h| h.release_at.is_none()) {
                hold.release_at = Some(now + POST_FOCUS_SWITCH_HOLD);
            }
            debug!(target: LOG_TARGET, "focus switch ended; holds drain in {POST_FOCUS_SWITCH_HOLD:?}");
        }
        self.switching = switching;
    }

    /// The earliest pending hold release, for the engine's timer wake.
    pub fn next_hold_release(&self) -> Option<Instant> {
        self.holds.iter().filter_map(|h| h.release_at).min()
    }

    /// Drop holds whose release deadline has passed. Returns whether any
    /// were released.
    pub fn release_due_holds(&mut self, now: Instant) -> bool {
        let before = self.holds.len();
        self.holds.retain(|hold| match hold.release_at {
            Some(at) if at <= now => {
                debug!(
                    target: LOG_TARGET,
                    "releasing hold of {} participants",
                    hold.participants.len()
                );
                false
            }
            _ => true,
        });
        before != self.holds.len()
    }

    fn effective_remotes(&self, media: &MediaRoomState) -> HashMap<ParticipantId, ParticipantState> {
        let mut remotes = media.remotes().clone();
        for hold in &self.holds {
            for (pid, state) in &hold.participants {
                // Live transport state wins over a held snapshot.
                remotes.entry(pid.clone()).or_insert(*state);
            }
        }
        remotes
    }

    /// Rebuild the item map from current memberships and transport state.
    /// Returns the membership transitions when the user-media list changed.
    pub fn rebuild(
        &mut self,
        memberships: &[CallMembership],
        media: &MediaRoomState,
        room: &dyn SignalingRoom,
        settings: &ViewSettings,
    ) -> Option<MemberChanges> {
        let remotes = self.effective_remotes(media);
        let mut next: IndexMap<MediaKey, MediaItem> = IndexMap::with_capacity(self.items.len());

        for m in memberships {
            let pid = m.participant_id();
            let is_local = pid == self.local;
            let participant = if is_local {
                Some(media.local_state())
            } else {
                remotes.get(&pid).copied()
            };
            let profile = room.member_profile(&m.sender);

            for index in 0..=settings.duplicate_tiles {
                let key = MediaKey::user_media(pid.clone(), index);
                let item = self.items.shift_remove(&key).unwrap_or_else(|| {
                    debug!(target: LOG_TARGET, "new media item {key}");
                    if profile.is_none() {
                        warn!(target: LOG_TARGET, "no room member profile for {}; tile uses fallback label", m.sender);
                    }
                    MediaItem::User(Arc::new(UserMedia::new(
                        key.clone(),
                        is_local,
                        is_local && settings.always_show_self,
                        self.controls.clone(),
                    )))
                });
                if let MediaItem::User(user) = &item {
                    user.set_participant(participant);
                    user.set_profile(profile.clone());
                    user.set_always_show(is_local && settings.always_show_self);
                }
                next.insert(key.clone(), item);

                if participant.is_some_and(|p| p.screen_share) {
                    let share_key = key.screen_share();
                    let share = self.items.shift_remove(&share_key).unwrap_or_else(|| {
                        debug!(target: LOG_TARGET, "new screen share {share_key}");
                        MediaItem::Screen(Arc::new(ScreenShare::new(share_key.clone(), is_local)))
                    });
                    if let MediaItem::Screen(s) = &share {
                        s.set_present(true);
                        s.set_profile(profile.clone());
                    }
                    next.insert(share_key, share);
                }
            }
        }

        // Whatever is left no longer corresponds to a membership or an
        // active screen share.
        for (_, item) in self.items.drain(..) {
            item.retire();
        }
        self.items = next;

        self.diff_members()
    }

    fn diff_members(&mut self) -> Option<MemberChanges> {
        let ids: Vec<MediaKey> = self
            .items
            .keys()
            .filter(|k| !k.is_screen_share())
            .cloned()
            .collect();
        if ids == self.previous_ids {
            return None;
        }

        let prev: HashSet<&MediaKey> = self.previous_ids.iter().collect();
        let now: HashSet<&MediaKey> = ids.iter().collect();
        // No join transitions for the first population: entering a running
        // call should not sound like everyone joining at once.
        let joined = if self.primed {
            ids.iter().filter(|k| !prev.contains(k)).cloned().collect()
        } else {
            Vec::new()
        };
        let left = self
            .previous_ids
            .iter()
            .filter(|k| !now.contains(k))
            .cloned()
            .collect();

        self.previous_ids = ids.clone();
        self.primed = true;
        Some(MemberChanges { ids, joined, left })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaRoomEvent;
    use crate::test_utils::{MockSignalingRoom, membership};
    use tokio::sync::mpsc;

    const ALICE: &str = "@alice:example.org";
    const BOB: &str = "@bob:example.org";

    fn local() -> ParticipantId {
        ParticipantId::new(ALICE, "LOCALDEV")
    }

    fn setup() -> (Reconciler, MediaRoomState, Arc<MockSignalingRoom>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        (
            Reconciler::new(local(), tx),
            MediaRoomState::new(local()),
            MockSignalingRoom::new(local()),
        )
    }

    fn connect(media: &mut MediaRoomState, user: &str, device: &str) {
        media.apply(&MediaRoomEvent::ParticipantConnected {
            identity: format!("{user}:{device}"),
        });
    }

    #[test]
    fn membership_without_media_still_yields_an_item() {
        let (mut rec, media, room) = setup();
        let memberships = vec![
            membership(ALICE, "LOCALDEV", "$alice-m"),
            membership(BOB, "DEV1", "$bob-m"),
        ];
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());

        let keys: Vec<String> = rec.items().keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "@alice:example.org:LOCALDEV:0",
                "@bob:example.org:DEV1:0",
            ]
        );
        let bob = rec
            .items()
            .get(&MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0))
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();
        assert!(!bob.state().borrow().present);
    }

    #[test]
    fn surviving_keys_keep_their_item_instances() {
        let (mut rec, mut media, room) = setup();
        let memberships = vec![membership(BOB, "DEV1", "$bob-m")];
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        let before = rec
            .items()
            .get(&MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0))
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();

        connect(&mut media, BOB, "DEV1");
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        let after = rec
            .items()
            .get(&MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0))
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.state().borrow().present);
    }

    #[test]
    fn departed_memberships_retire_their_items() {
        let (mut rec, media, room) = setup();
        rec.rebuild(
            &[membership(BOB, "DEV1", "$bob-m")],
            &media,
            room.as_ref(),
            &ViewSettings::default(),
        );
        let bob = rec
            .items()
            .get(&MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0))
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();

        rec.rebuild(&[], &media, room.as_ref(), &ViewSettings::default());
        assert!(rec.items().is_empty());
        assert!(!bob.state().borrow().present);
    }

    #[test]
    fn duplicate_tiles_expand_every_membership() {
        let (mut rec, media, room) = setup();
        let settings = ViewSettings {
            duplicate_tiles: 2,
            ..Default::default()
        };
        rec.rebuild(
            &[membership(BOB, "DEV1", "$bob-m")],
            &media,
            room.as_ref(),
            &settings,
        );
        let keys: Vec<String> = rec.items().keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "@bob:example.org:DEV1:0",
                "@bob:example.org:DEV1:1",
                "@bob:example.org:DEV1:2",
            ]
        );
    }

    #[test]
    fn screen_share_items_follow_the_transport_flag() {
        let (mut rec, mut media, room) = setup();
        let memberships = vec![membership(BOB, "DEV1", "$bob-m")];
        connect(&mut media, BOB, "DEV1");
        media.apply(&MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV1"),
            enabled: true,
        });
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());

        let keys: Vec<String> = rec.items().keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "@bob:example.org:DEV1:0",
                "@bob:example.org:DEV1:0:screen-share",
            ]
        );

        media.apply(&MediaRoomEvent::ScreenShareChanged {
            identity: format!("{BOB}:DEV1"),
            enabled: false,
        });
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        assert_eq!(rec.items().len(), 1);
        assert_eq!(rec.screen_shares().count(), 0);
    }

    #[test]
    fn member_changes_suppress_joins_on_first_population() {
        let (mut rec, media, room) = setup();
        let changes = rec
            .rebuild(
                &[
                    membership(ALICE, "LOCALDEV", "$alice-m"),
                    membership(BOB, "DEV1", "$bob-m"),
                ],
                &media,
                room.as_ref(),
                &ViewSettings::default(),
            )
            .unwrap();
        assert_eq!(changes.ids.len(), 2);
        assert!(changes.joined.is_empty());
        assert!(changes.left.is_empty());
    }

    #[test]
    fn member_changes_report_later_joins_and_leaves() {
        let (mut rec, media, room) = setup();
        let alice = membership(ALICE, "LOCALDEV", "$alice-m");
        rec.rebuild(
            &[alice.clone()],
            &media,
            room.as_ref(),
            &ViewSettings::default(),
        );

        let changes = rec
            .rebuild(
                &[alice.clone(), membership(BOB, "DEV1", "$bob-m")],
                &media,
                room.as_ref(),
                &ViewSettings::default(),
            )
            .unwrap();
        assert_eq!(
            changes.joined,
            vec![MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0)]
        );
        assert!(changes.left.is_empty());

        let changes = rec
            .rebuild(&[alice], &media, room.as_ref(), &ViewSettings::default())
            .unwrap();
        assert!(changes.joined.is_empty());
        assert_eq!(
            changes.left,
            vec![MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0)]
        );
    }

    #[test]
    fn unchanged_rebuild_reports_no_member_changes() {
        let (mut rec, media, room) = setup();
        let memberships = vec![membership(BOB, "DEV1", "$bob-m")];
        assert!(
            rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default())
                .is_some()
        );
        assert!(
            rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default())
                .is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn focus_switch_holds_remote_participants() {
        let (mut rec, mut media, room) = setup();
        let memberships = vec![membership(BOB, "DEV1", "$bob-m")];
        connect(&mut media, BOB, "DEV1");
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());

        let now = Instant::now();
        media.apply(&MediaRoomEvent::ConnectionStateChanged(
            ConnectionState::SwitchingFocus,
        ));
        rec.connection_changed(ConnectionState::SwitchingFocus, &media, now);

        // The transport loses the participant mid-switch.
        media.apply(&MediaRoomEvent::ParticipantDisconnected {
            identity: format!("{BOB}:DEV1"),
        });
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        let bob = rec
            .items()
            .get(&MediaKey::user_media(ParticipantId::new(BOB, "DEV1"), 0))
            .and_then(MediaItem::as_user)
            .cloned()
            .unwrap();
        assert!(bob.state().borrow().present, "held participant must stay present");

        // Leaving the switching state starts the drain clock.
        let exit = now + Duration::from_millis(5_000);
        media.apply(&MediaRoomEvent::ConnectionStateChanged(
            ConnectionState::Connected,
        ));
        rec.connection_changed(ConnectionState::Connected, &media, exit);
        assert_eq!(rec.next_hold_release(), Some(exit + POST_FOCUS_SWITCH_HOLD));

        assert!(!rec.release_due_holds(exit + Duration::from_millis(2_999)));
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        assert!(bob.state().borrow().present);

        assert!(rec.release_due_holds(exit + POST_FOCUS_SWITCH_HOLD));
        rec.rebuild(&memberships, &media, room.as_ref(), &ViewSettings::default());
        assert!(!bob.state().borrow().present);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_holds_accumulate() {
        let (mut rec, mut media, _room) = setup();
        connect(&mut media, BOB, "DEV1");

        let t0 = Instant::now();
        rec.connection_changed(ConnectionState::SwitchingFocus, &media, t0);
        rec.connection_changed(ConnectionState::Connected, &media, t0 + Duration::from_millis(100));
        rec.connection_changed(ConnectionState::SwitchingFocus, &media, t0 + Duration::from_millis(200));
        assert_eq!(rec.holds.len(), 2);

        // Only the first hold has a release deadline so far.
        assert_eq!(
            rec.next_hold_release(),
            Some(t0 + Duration::from_millis(100) + POST_FOCUS_SWITCH_HOLD)
        );
        assert!(rec.release_due_holds(t0 + Duration::from_millis(3_100)));
        assert_eq!(rec.holds.len(), 1);
    }
}
