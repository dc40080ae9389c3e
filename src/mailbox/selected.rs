//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Quire.
//
// Quire is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Quire is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Quire. If not, see <http://www.gnu.org/licenses/>.

//! State of the mailbox an IMAP session has selected.
//!
//! A `SelectedMailbox` listens on the event bus for changes to its mailbox
//! and accumulates what the session must eventually tell the client about:
//! new messages, flag changes, expunges, new applicable flags, and whether
//! the mailbox was deleted. Command processors query this state after each
//! command, write the untagged responses, then reset what they reported.
//!
//! Nothing here does I/O apart from the initial scan through the
//! `MessageManager` during selection.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crossbeam::sync::ShardedLock;
use log::{debug, info, trace, warn};

use super::applicable_flags::{update_applicable_flags, ApplicableFlags};
use super::event::*;
use super::message_manager::{MailboxSession, MessageManager, SearchQuery};
use super::model::*;
use super::session::ImapSession;
use super::uid_msn::UidMsnConverter;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SessionConfig;

pub struct SelectedMailbox {
    mailbox_id: MailboxId,
    session: Weak<ImapSession>,
    mailbox_session: MailboxSession,
    event_bus: Arc<dyn EventBus>,
    message_manager: Arc<dyn MessageManager>,
    config: SessionConfig,
    log_prefix: LogPrefix,

    uid_msn: UidMsnConverter,
    // Kept apart from `state` so that flag merges on the event thread do not
    // contend with everything else.
    applicable_flags: ShardedLock<ApplicableFlags>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    recent_uids: BTreeSet<Uid>,
    recent_uid_removed: bool,
    flag_update_uids: BTreeSet<Uid>,
    expunged_uids: BTreeSet<Uid>,
    size_changed: bool,
    deleted_by_other_session: bool,
    silent_flag_changes: bool,
    idle_listener: Option<Arc<dyn EventListener>>,
    registration: Option<Box<dyn Registration>>,
}

impl fmt::Debug for SelectedMailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SelectedMailbox")
            .field("mailbox_id", &self.mailbox_id)
            .field("session_id", &self.mailbox_session.id)
            .field("exists", &self.uid_msn.num_messages())
            .finish()
    }
}

impl SelectedMailbox {
    /// Select the mailbox behind `message_manager` in `session`.
    ///
    /// Any mailbox the session had selected is deselected first. The new
    /// mailbox occupies the session's selection slot before it registers for
    /// events, so messages which arrive during the initial scan are already
    /// recent in it.
    ///
    /// If registration or the initial scan fails, the error is returned and
    /// the session is left with nothing selected.
    pub fn select(
        session: &Arc<ImapSession>,
        event_bus: Arc<dyn EventBus>,
        message_manager: Arc<dyn MessageManager>,
        config: SessionConfig,
    ) -> Result<Arc<Self>, Error> {
        if let Some(previous) = session.take_selected() {
            previous.deselect();
        }

        let selected = Arc::new(SelectedMailbox {
            mailbox_id: message_manager.id(),
            session: Arc::downgrade(session),
            mailbox_session: session.mailbox_session().clone(),
            event_bus,
            message_manager,
            config,
            log_prefix: session.log_prefix().clone(),
            uid_msn: UidMsnConverter::new(),
            applicable_flags: ShardedLock::new(ApplicableFlags::default()),
            state: Mutex::new(State::default()),
        });
        session.set_selected(Arc::clone(&selected));

        match selected.finish_init() {
            Ok(()) => {
                info!(
                    "{} Selected mailbox {} with {} messages",
                    selected.log_prefix,
                    selected.mailbox_id,
                    selected.exists_count()
                );
                Ok(selected)
            }
            Err(e) => {
                warn!(
                    "{} Failed to select mailbox {}: {}",
                    selected.log_prefix, selected.mailbox_id, e
                );
                selected.deselect();
                Err(e)
            }
        }
    }

    fn finish_init(self: &Arc<Self>) -> Result<(), Error> {
        self.state.lock().unwrap().silent_flag_changes =
            self.config.silence_own_flag_changes;

        let listener: Arc<dyn EventListener> = self.clone();
        let registration = self.event_bus.register(listener, self.mailbox_id)?;
        self.state.lock().unwrap().registration = Some(registration);

        {
            let mut applicable_flags = self.applicable_flags.write().unwrap();
            let initial = self
                .message_manager
                .applicable_flags(&self.mailbox_session)?;
            // Merge rather than overwrite; events may already have arrived.
            *applicable_flags = applicable_flags.with_initial_flags(&initial);
        }

        // Events delivered while this runs may be counted twice, which is
        // harmless, or describe an expunge the scan does not reflect yet,
        // which the expunged set will reconcile.
        let uids = self
            .message_manager
            .search(&SearchQuery::All, &self.mailbox_session)?;
        self.uid_msn.add_all(uids);

        Ok(())
    }

    /// Stop listening for events and discard all state.
    ///
    /// If the session still has this mailbox selected, its selection is
    /// cleared. Calling this more than once is harmless.
    pub fn deselect(&self) {
        let registration = {
            let mut state = self.state.lock().unwrap();
            let registration = state.registration.take();
            *state = State::default();
            registration
        };

        if let Some(registration) = registration {
            registration.unregister();
        }

        self.uid_msn.clear();
        *self.applicable_flags.write().unwrap() = ApplicableFlags::default();

        if let Some(session) = self.session.upgrade() {
            session.clear_selected_if(self);
        }

        info!(
            "{} Deselected mailbox {}",
            self.log_prefix, self.mailbox_id
        );
    }

    pub fn mailbox_id(&self) -> MailboxId {
        self.mailbox_id
    }

    pub fn first_uid(&self) -> Option<Uid> {
        self.uid_msn.first_uid()
    }

    pub fn last_uid(&self) -> Option<Uid> {
        self.uid_msn.last_uid()
    }

    /// The number of messages the session currently knows about.
    pub fn exists_count(&self) -> usize {
        self.uid_msn.num_messages()
    }

    /// Return the sequence number of `uid`, or `None` if it is not in the
    /// session's view.
    pub fn msn(&self, uid: Uid) -> Option<Seqnum> {
        self.uid_msn.get_msn(uid)
    }

    /// Return the UID at sequence number `msn`, or `None` if `msn` is 0 or
    /// beyond the end of the mailbox.
    pub fn uid(&self, msn: u32) -> Option<Uid> {
        self.uid_msn.get_uid(msn)
    }

    /// Remove `uid` from the session's view after an EXPUNGE response for it
    /// has been sent.
    ///
    /// Returns the sequence number the message had before removal.
    pub fn remove(&self, uid: Uid) -> Option<Seqnum> {
        let msn = self.uid_msn.get_msn(uid);
        self.uid_msn.remove(uid);
        msn
    }

    /// Return the recent messages, in ascending UID order.
    ///
    /// Messages which have since been expunged are no longer recent.
    pub fn recent(&self) -> Vec<Uid> {
        let mut state = self.state.lock().unwrap();
        state.purge_expunged_recent();
        state.recent_uids.iter().copied().collect()
    }

    pub fn recent_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.purge_expunged_recent();
        state.recent_uids.len()
    }

    pub fn is_recent(&self, uid: Uid) -> bool {
        self.state.lock().unwrap().recent_uids.contains(&uid)
    }

    /// Mark `uid` as recent. Returns whether it was not already.
    pub fn add_recent(&self, uid: Uid) -> bool {
        self.state.lock().unwrap().recent_uids.insert(uid)
    }

    fn add_recent_uids(&self, uids: &[Uid]) {
        self.state
            .lock()
            .unwrap()
            .recent_uids
            .extend(uids.iter().copied());
    }

    /// Clear the recent flag of `uid`. Returns whether it was recent.
    pub fn remove_recent(&self, uid: Uid) -> bool {
        let mut state = self.state.lock().unwrap();
        let removed = state.recent_uids.remove(&uid);
        if removed {
            state.recent_uid_removed = true;
        }
        removed
    }

    pub fn is_recent_uid_removed(&self) -> bool {
        self.state.lock().unwrap().recent_uid_removed
    }

    pub fn reset_recent_uid_removed(&self) {
        self.state.lock().unwrap().recent_uid_removed = false;
    }

    /// Return the UIDs whose flags changed since the last `reset_events()`.
    pub fn flag_update_uids(&self) -> Vec<Uid> {
        self.state
            .lock()
            .unwrap()
            .flag_update_uids
            .iter()
            .copied()
            .collect()
    }

    /// Return the UIDs expunged since the last `reset_expunged_uids()`.
    pub fn expunged_uids(&self) -> Vec<Uid> {
        self.state
            .lock()
            .unwrap()
            .expunged_uids
            .iter()
            .copied()
            .collect()
    }

    pub fn reset_expunged_uids(&self) {
        self.state.lock().unwrap().expunged_uids.clear();
    }

    pub fn applicable_flags(&self) -> Flags {
        self.applicable_flags.read().unwrap().flags().clone()
    }

    /// Whether a user flag was added to the applicable flags since the last
    /// reset.
    pub fn has_new_applicable_flags(&self) -> bool {
        self.applicable_flags.read().unwrap().updated()
    }

    pub fn reset_new_applicable_flags(&self) {
        let mut applicable_flags = self.applicable_flags.write().unwrap();
        *applicable_flags = applicable_flags.ack_updates();
    }

    pub fn is_size_changed(&self) -> bool {
        self.state.lock().unwrap().size_changed
    }

    pub fn is_deleted_by_other_session(&self) -> bool {
        self.state.lock().unwrap().deleted_by_other_session
    }

    pub fn is_silent_flag_changes(&self) -> bool {
        self.state.lock().unwrap().silent_flag_changes
    }

    /// Control whether flag changes made by this session are reported back
    /// to it.
    pub fn set_silent_flag_changes(&self, silent: bool) {
        self.state.lock().unwrap().silent_flag_changes = silent;
    }

    /// Forget the size change, flag updates, deletion notice, and new
    /// applicable flags after the corresponding responses were sent.
    pub fn reset_events(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.size_changed = false;
            state.flag_update_uids.clear();
            state.deleted_by_other_session = false;
        }
        self.reset_new_applicable_flags();
    }

    /// Forward every event this mailbox receives to `listener` until
    /// `unregister_idle()` is called.
    pub fn register_idle(&self, listener: Arc<dyn EventListener>) {
        self.state.lock().unwrap().idle_listener = Some(listener);
    }

    pub fn unregister_idle(&self) {
        self.state.lock().unwrap().idle_listener = None;
    }

    fn current_selection(&self) -> Option<Arc<SelectedMailbox>> {
        self.session.upgrade().and_then(|s| s.selected())
    }

    fn is_own(&self, session_id: SessionId) -> bool {
        self.mailbox_session.id == session_id
    }

    fn on_added(&self, session_id: SessionId, uids: &[Uid]) {
        let mark_recent = {
            let mut state = self.state.lock().unwrap();
            state.size_changed = true;
            !self.is_own(session_id) || !state.silent_flag_changes
        };

        for &uid in uids {
            self.uid_msn.add_uid(uid);
        }

        // The session may have moved on to another mailbox; the messages are
        // recent wherever it is now. Our own lock must not be held here since
        // that mailbox may be this one.
        if mark_recent {
            if let Some(current) = self.current_selection() {
                current.add_recent_uids(uids);
            }
        }

        debug!(
            "{} {} message(s) added, {} now exist",
            self.log_prefix,
            uids.len(),
            self.uid_msn.num_messages()
        );
    }

    fn on_flags_updated(
        &self,
        session_id: SessionId,
        updated_flags: &[UpdatedFlags],
    ) {
        let mut new_recent = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let silenced = self.is_own(session_id) && state.silent_flag_changes;
            for update in updated_flags {
                if !silenced && update.is_interesting() {
                    state.flag_update_uids.insert(update.uid);
                }
                if update.adds(&Flag::Recent) {
                    new_recent.push(update.uid);
                }
            }
        }

        if !new_recent.is_empty() {
            if let Some(current) = self.current_selection() {
                if current.mailbox_id == self.mailbox_id {
                    current.add_recent_uids(&new_recent);
                }
            }
        }

        let mut applicable_flags = self.applicable_flags.write().unwrap();
        *applicable_flags =
            update_applicable_flags(&applicable_flags, updated_flags);

        trace!(
            "{} Flags of {} message(s) updated",
            self.log_prefix,
            updated_flags.len()
        );
    }

    fn on_expunged(&self, uids: &[Uid]) {
        self.state
            .lock()
            .unwrap()
            .expunged_uids
            .extend(uids.iter().copied());
        debug!("{} {} message(s) expunged", self.log_prefix, uids.len());
    }

    fn on_mailbox_deletion(&self, session_id: SessionId) {
        if !self.is_own(session_id) {
            self.state.lock().unwrap().deleted_by_other_session = true;
            info!(
                "{} Mailbox {} deleted by another session",
                self.log_prefix, self.mailbox_id
            );
        }
    }
}

impl State {
    fn purge_expunged_recent(&mut self) {
        let before = self.recent_uids.len();
        let expunged = &self.expunged_uids;
        self.recent_uids.retain(|uid| !expunged.contains(uid));
        if self.recent_uids.len() != before {
            self.recent_uid_removed = true;
        }
    }
}

impl EventListener for SelectedMailbox {
    fn event(&self, event: &MailboxEvent) {
        if event.mailbox_id() != self.mailbox_id {
            return;
        }

        match *event {
            MailboxEvent::Added {
                session_id,
                ref uids,
                ..
            } => self.on_added(session_id, uids),
            MailboxEvent::FlagsUpdated {
                session_id,
                ref updated_flags,
                ..
            } => self.on_flags_updated(session_id, updated_flags),
            MailboxEvent::Expunged { ref uids, .. } => self.on_expunged(uids),
            MailboxEvent::MailboxDeletion { session_id, .. } => {
                self.on_mailbox_deletion(session_id)
            }
            MailboxEvent::Other { .. } => (),
        }

        let idle_listener = self.state.lock().unwrap().idle_listener.clone();
        if let Some(idle_listener) = idle_listener {
            idle_listener.event(event);
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rayon::prelude::*;

    use super::*;
    use crate::mailbox::idle::IdleListener;
    use crate::mailbox::test_prelude::*;

    struct Setup {
        session: Arc<ImapSession>,
        bus: InVmEventBus,
        selected: Arc<SelectedMailbox>,
    }

    fn setup(uids: &[u64]) -> Setup {
        setup_with(FakeMessageManager::new(MAILBOX, uids))
    }

    fn setup_with(manager: FakeMessageManager) -> Setup {
        let session = imap_session(OWN_SESSION);
        let bus = InVmEventBus::new();
        let selected = SelectedMailbox::select(
            &session,
            Arc::new(bus.clone()),
            Arc::new(manager),
            SessionConfig::default(),
        )
        .unwrap();
        Setup {
            session,
            bus,
            selected,
        }
    }

    #[test]
    fn select_seeds_state() {
        let mut manager = FakeMessageManager::new(MAILBOX, &[9, 3, 7]);
        manager.flags = flags(&[Flag::Seen, Flag::Recent, kw("custom")]);
        let setup = setup_with(manager);
        let selected = &setup.selected;

        assert_eq!(3, selected.exists_count());
        assert_eq!(Some(Uid::u(3)), selected.first_uid());
        assert_eq!(Some(Uid::u(9)), selected.last_uid());
        assert_eq!(Some(Seqnum::u(2)), selected.msn(Uid::u(7)));
        assert_eq!(None, selected.msn(Uid::u(8)));
        assert_eq!(Some(Uid::u(3)), selected.uid(1));
        assert_eq!(None, selected.uid(0));
        assert_eq!(None, selected.uid(4));

        assert_eq!(
            flags(&[Flag::Seen, kw("custom")]),
            selected.applicable_flags()
        );
        assert!(!selected.has_new_applicable_flags());
        assert!(!selected.is_size_changed());
        assert!(selected.is_silent_flag_changes());
        assert!(selected.recent().is_empty());

        assert_eq!(1, setup.bus.listener_count(MAILBOX));
        assert!(Arc::ptr_eq(selected, &setup.session.selected().unwrap()));
    }

    #[test]
    fn silence_can_be_disabled_by_config() {
        let session = imap_session(OWN_SESSION);
        let selected = SelectedMailbox::select(
            &session,
            Arc::new(InVmEventBus::new()),
            Arc::new(FakeMessageManager::new(MAILBOX, &[])),
            SessionConfig {
                silence_own_flag_changes: false,
            },
        )
        .unwrap();
        assert!(!selected.is_silent_flag_changes());
    }

    #[test]
    fn added_by_other_session_is_recent() {
        let setup = setup(&[1, 2]);
        setup.bus.dispatch(&added(OTHER_SESSION, &[5, 4]));

        let selected = &setup.selected;
        assert!(selected.is_size_changed());
        assert_eq!(4, selected.exists_count());
        assert_eq!(Some(Seqnum::u(4)), selected.msn(Uid::u(5)));
        assert_eq!(vec![Uid::u(4), Uid::u(5)], selected.recent());
        assert_eq!(2, selected.recent_count());
        assert!(selected.is_recent(Uid::u(4)));
    }

    #[test]
    fn added_by_own_session_is_recent_only_when_not_silenced() {
        let setup = setup(&[]);
        let selected = &setup.selected;

        setup.bus.dispatch(&added(OWN_SESSION, &[1]));
        assert!(selected.is_size_changed());
        assert_eq!(1, selected.exists_count());
        assert!(!selected.is_recent(Uid::u(1)));

        selected.set_silent_flag_changes(false);
        setup.bus.dispatch(&added(OWN_SESSION, &[2]));
        assert!(selected.is_recent(Uid::u(2)));
    }

    #[test]
    fn duplicate_added_event_is_harmless() {
        let setup = setup(&[1]);
        setup.bus.dispatch(&added(OTHER_SESSION, &[1, 2]));
        setup.bus.dispatch(&added(OTHER_SESSION, &[2]));
        assert_eq!(2, setup.selected.exists_count());
    }

    #[test]
    fn flag_updates_from_other_session_are_reported() {
        let setup = setup(&[1, 2, 3]);
        setup.bus.dispatch(&flags_updated(
            OTHER_SESSION,
            vec![
                UpdatedFlags::new(Uid::u(1), flags(&[]), flags(&[Flag::Seen])),
                UpdatedFlags::new(
                    Uid::u(2),
                    flags(&[Flag::Seen]),
                    flags(&[Flag::Seen]),
                ),
            ],
        ));

        let selected = &setup.selected;
        assert_eq!(vec![Uid::u(1)], selected.flag_update_uids());
        assert!(!selected.has_new_applicable_flags());
        assert!(selected.applicable_flags().contains(&Flag::Seen));
    }

    #[test]
    fn own_flag_updates_are_silenced() {
        let setup = setup(&[1]);
        let selected = &setup.selected;
        let update = || {
            flags_updated(
                OWN_SESSION,
                vec![UpdatedFlags::new(
                    Uid::u(1),
                    flags(&[]),
                    flags(&[Flag::Flagged]),
                )],
            )
        };

        setup.bus.dispatch(&update());
        assert!(selected.flag_update_uids().is_empty());

        selected.set_silent_flag_changes(false);
        setup.bus.dispatch(&update());
        assert_eq!(vec![Uid::u(1)], selected.flag_update_uids());
    }

    #[test]
    fn recent_flag_update_marks_recent_even_when_silenced() {
        let setup = setup(&[1]);
        setup.bus.dispatch(&flags_updated(
            OWN_SESSION,
            vec![UpdatedFlags::new(
                Uid::u(1),
                flags(&[]),
                flags(&[Flag::Recent]),
            )],
        ));

        let selected = &setup.selected;
        assert!(selected.is_recent(Uid::u(1)));
        // Only \Recent changed, which is not worth a FETCH
        assert!(selected.flag_update_uids().is_empty());
        assert!(!selected.applicable_flags().contains(&Flag::Recent));
    }

    #[test]
    fn new_user_flag_is_advertised_until_reset() {
        let setup = setup(&[1]);
        setup.bus.dispatch(&flags_updated(
            OTHER_SESSION,
            vec![UpdatedFlags::new(Uid::u(1), flags(&[]), flags(&[kw("Foo")]))],
        ));

        let selected = &setup.selected;
        assert!(selected.has_new_applicable_flags());
        assert_eq!(flags(&[kw("Foo")]), selected.applicable_flags());

        selected.reset_new_applicable_flags();
        assert!(!selected.has_new_applicable_flags());
        assert_eq!(flags(&[kw("Foo")]), selected.applicable_flags());
    }

    #[test]
    fn expunge_does_not_touch_converter() {
        let setup = setup(&[3, 7, 9]);
        let selected = &setup.selected;
        setup.bus.dispatch(&expunged(OTHER_SESSION, &[3]));

        assert_eq!(vec![Uid::u(3)], selected.expunged_uids());
        assert_eq!(3, selected.exists_count());

        assert_eq!(Some(Seqnum::u(1)), selected.remove(Uid::u(3)));
        assert_eq!(None, selected.remove(Uid::u(3)));
        assert_eq!(Some(Seqnum::u(1)), selected.msn(Uid::u(7)));

        selected.reset_expunged_uids();
        assert!(selected.expunged_uids().is_empty());
    }

    #[test]
    fn dropping_session_unregisters_selection() {
        let session = imap_session(OWN_SESSION);
        let bus = InVmEventBus::new();
        let selected = SelectedMailbox::select(
            &session,
            Arc::new(bus.clone()),
            Arc::new(FakeMessageManager::new(MAILBOX, &[1, 2])),
            SessionConfig::default(),
        )
        .unwrap();
        let weak = Arc::downgrade(&selected);
        drop(selected);
        assert_eq!(1, bus.listener_count(MAILBOX));

        drop(session);
        assert_eq!(0, bus.listener_count(MAILBOX));
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn expunged_messages_are_no_longer_recent() {
        let setup = setup(&[]);
        let selected = &setup.selected;
        setup.bus.dispatch(&added(OTHER_SESSION, &[1, 2]));
        setup.bus.dispatch(&expunged(OTHER_SESSION, &[1]));
        assert!(!selected.is_recent_uid_removed());

        assert_eq!(1, selected.recent_count());
        assert!(selected.is_recent_uid_removed());
        assert!(!selected.is_recent(Uid::u(1)));

        selected.reset_recent_uid_removed();
        assert_eq!(vec![Uid::u(2)], selected.recent());
        assert!(!selected.is_recent_uid_removed());
    }

    #[test]
    fn remove_recent_tracks_removal() {
        let setup = setup(&[1]);
        let selected = &setup.selected;
        assert!(selected.add_recent(Uid::u(1)));
        assert!(!selected.add_recent(Uid::u(1)));
        assert!(!selected.is_recent_uid_removed());

        assert!(!selected.remove_recent(Uid::u(2)));
        assert!(!selected.is_recent_uid_removed());

        assert!(selected.remove_recent(Uid::u(1)));
        assert!(selected.is_recent_uid_removed());
        selected.reset_recent_uid_removed();
        assert!(!selected.is_recent_uid_removed());
    }

    #[test]
    fn deletion_by_other_session() {
        let setup = setup(&[]);
        let selected = &setup.selected;
        setup.bus.dispatch(&MailboxEvent::MailboxDeletion {
            mailbox_id: MAILBOX,
            session_id: OWN_SESSION,
        });
        assert!(!selected.is_deleted_by_other_session());

        setup.bus.dispatch(&MailboxEvent::MailboxDeletion {
            mailbox_id: MAILBOX,
            session_id: OTHER_SESSION,
        });
        assert!(selected.is_deleted_by_other_session());
    }

    #[test]
    fn reset_events_clears_notifications() {
        let setup = setup(&[1]);
        let selected = &setup.selected;
        setup.bus.dispatch(&added(OTHER_SESSION, &[2]));
        setup.bus.dispatch(&expunged(OTHER_SESSION, &[1]));
        setup.bus.dispatch(&flags_updated(
            OTHER_SESSION,
            vec![UpdatedFlags::new(Uid::u(2), flags(&[]), flags(&[kw("x")]))],
        ));
        setup.bus.dispatch(&MailboxEvent::MailboxDeletion {
            mailbox_id: MAILBOX,
            session_id: OTHER_SESSION,
        });

        selected.reset_events();
        assert!(!selected.is_size_changed());
        assert!(selected.flag_update_uids().is_empty());
        assert!(!selected.is_deleted_by_other_session());
        assert!(!selected.has_new_applicable_flags());
        // Narrower resets are separate
        assert_eq!(vec![Uid::u(1)], selected.expunged_uids());
        assert!(selected.is_recent(Uid::u(2)));
    }

    #[test]
    fn events_for_other_mailboxes_are_ignored() {
        let setup = setup(&[1]);
        let selected = &setup.selected;
        let listener = IdleListener::prepare();
        selected.register_idle(Arc::new(listener.notifier()));

        selected.event(&MailboxEvent::Added {
            mailbox_id: MailboxId(43),
            session_id: OTHER_SESSION,
            uids: vec![Uid::u(2)],
        });

        assert!(!selected.is_size_changed());
        assert_eq!(1, selected.exists_count());
        assert!(!listener.idle_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn idle_listener_receives_every_event() {
        let setup = setup(&[1]);
        let selected = &setup.selected;

        let listener = IdleListener::prepare();
        selected.register_idle(Arc::new(listener.notifier()));
        setup.bus.dispatch(&MailboxEvent::Other {
            mailbox_id: MAILBOX,
            session_id: OWN_SESSION,
        });
        assert!(listener.idle_timeout(Duration::from_secs(5)));

        let listener = IdleListener::prepare();
        selected.register_idle(Arc::new(listener.notifier()));
        selected.unregister_idle();
        setup.bus.dispatch(&added(OTHER_SESSION, &[2]));
        assert!(!listener.idle_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn registration_failure_leaves_session_unselected() {
        let session = imap_session(OWN_SESSION);
        let result = SelectedMailbox::select(
            &session,
            Arc::new(FailingEventBus),
            Arc::new(FakeMessageManager::new(MAILBOX, &[1])),
            SessionConfig::default(),
        );
        assert_matches!(Err(Error::EventBus(_)), result);
        assert!(session.selected().is_none());
    }

    #[test]
    fn scan_failure_unregisters() {
        let session = imap_session(OWN_SESSION);
        let bus = InVmEventBus::new();
        let mut manager = FakeMessageManager::new(MAILBOX, &[1]);
        manager.fail_search = true;

        let result = SelectedMailbox::select(
            &session,
            Arc::new(bus.clone()),
            Arc::new(manager),
            SessionConfig::default(),
        );
        assert_matches!(Err(Error::MailboxBackend(_)), result);
        assert!(session.selected().is_none());
        assert_eq!(0, bus.listener_count(MAILBOX));
    }

    #[test]
    fn added_event_during_initialisation_is_kept() {
        let session = imap_session(OWN_SESSION);
        let bus = EmittingEventBus {
            inner: InVmEventBus::new(),
            on_register: vec![added(OTHER_SESSION, &[5])],
        };
        let selected = SelectedMailbox::select(
            &session,
            Arc::new(bus),
            Arc::new(FakeMessageManager::new(MAILBOX, &[1, 3])),
            SessionConfig::default(),
        )
        .unwrap();

        assert_eq!(Some(Uid::u(5)), selected.last_uid());
        assert_eq!(3, selected.exists_count());
        assert!(selected.is_recent(Uid::u(5)));
    }

    #[test]
    fn custom_flag_during_initialisation_is_kept() {
        let session = imap_session(OWN_SESSION);
        let bus = EmittingEventBus {
            inner: InVmEventBus::new(),
            on_register: vec![flags_updated(
                OTHER_SESSION,
                vec![UpdatedFlags::new(
                    Uid::u(12),
                    flags(&[]),
                    flags(&[kw("custom")]),
                )],
            )],
        };
        let selected = SelectedMailbox::select(
            &session,
            Arc::new(bus),
            Arc::new(FakeMessageManager::new(MAILBOX, &[1, 3])),
            SessionConfig::default(),
        )
        .unwrap();

        assert_eq!(flags(&[kw("custom")]), selected.applicable_flags());
    }

    #[test]
    fn reselect_deselects_previous() {
        let session = imap_session(OWN_SESSION);
        let bus = InVmEventBus::new();
        let first = SelectedMailbox::select(
            &session,
            Arc::new(bus.clone()),
            Arc::new(FakeMessageManager::new(MAILBOX, &[1])),
            SessionConfig::default(),
        )
        .unwrap();
        let second = SelectedMailbox::select(
            &session,
            Arc::new(bus.clone()),
            Arc::new(FakeMessageManager::new(MailboxId(43), &[1])),
            SessionConfig::default(),
        )
        .unwrap();

        assert_eq!(0, bus.listener_count(MAILBOX));
        assert_eq!(1, bus.listener_count(MailboxId(43)));
        assert_eq!(0, first.exists_count());
        assert!(Arc::ptr_eq(&second, &session.selected().unwrap()));

        // A straggling event for the old mailbox makes the message recent in
        // whatever the session has selected now.
        first.event(&added(OTHER_SESSION, &[9]));
        assert!(second.is_recent(Uid::u(9)));
        assert!(!first.is_recent(Uid::u(9)));
    }

    #[test]
    fn deselect_clears_everything() {
        let setup = setup(&[1, 2]);
        let selected = &setup.selected;
        setup.bus.dispatch(&added(OTHER_SESSION, &[3]));

        selected.deselect();
        selected.deselect();
        assert!(setup.session.selected().is_none());
        assert_eq!(0, setup.bus.listener_count(MAILBOX));
        assert_eq!(0, selected.exists_count());
        assert!(selected.recent().is_empty());
        assert!(!selected.is_size_changed());

        setup.bus.dispatch(&added(OTHER_SESSION, &[4]));
        assert_eq!(0, selected.exists_count());
    }

    #[test]
    fn concurrent_delivery() {
        let setup = setup(&[]);
        (1u64..=500).into_par_iter().for_each(|uid| {
            setup.bus.dispatch(&added(OTHER_SESSION, &[uid]));
            if 0 == uid % 5 {
                setup.bus.dispatch(&expunged(OTHER_SESSION, &[uid]));
            }
        });

        let selected = &setup.selected;
        assert_eq!(500, selected.exists_count());
        assert_eq!(100, selected.expunged_uids().len());
        assert_eq!(400, selected.recent_count());
        for uid in selected.expunged_uids() {
            selected.remove(uid);
        }
        assert_eq!(400, selected.exists_count());
        assert_eq!(Some(Uid::u(499)), selected.last_uid());
    }
}
