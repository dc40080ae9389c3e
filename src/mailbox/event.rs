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

//! Mailbox change events and the bus which delivers them.
//!
//! The storage layer publishes a `MailboxEvent` for every mutation of a
//! mailbox. Listeners register for a single mailbox id and are called on
//! whatever thread publishes the event, so they must be cheap and must not
//! block.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use log::trace;

use super::model::{Flag, Flags, MailboxId, SessionId, Uid};
use crate::support::error::Error;

/// The change in flags of a single message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedFlags {
    pub uid: Uid,
    pub old_flags: Flags,
    pub new_flags: Flags,
}

impl UpdatedFlags {
    pub fn new(uid: Uid, old_flags: Flags, new_flags: Flags) -> Self {
        UpdatedFlags {
            uid,
            old_flags,
            new_flags,
        }
    }

    pub fn added_flags(&self) -> Flags {
        self.new_flags.difference(&self.old_flags)
    }

    pub fn removed_flags(&self) -> Flags {
        self.old_flags.difference(&self.new_flags)
    }

    /// Flags which were either added or removed.
    pub fn modified_flags(&self) -> Flags {
        self.old_flags.symmetric_difference(&self.new_flags)
    }

    /// Whether this change adds `flag` to the message.
    pub fn adds(&self, flag: &Flag) -> bool {
        self.new_flags.contains(flag) && !self.old_flags.contains(flag)
    }

    /// Whether this change touches anything other than `\Recent`, i.e.,
    /// whether a client needs to hear about it.
    pub fn is_interesting(&self) -> bool {
        self.modified_flags().iter().any(|f| Flag::Recent != f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailboxEvent {
    /// Messages were appended to the mailbox.
    Added {
        mailbox_id: MailboxId,
        session_id: SessionId,
        uids: Vec<Uid>,
    },
    /// Messages were expunged from the mailbox.
    Expunged {
        mailbox_id: MailboxId,
        session_id: SessionId,
        uids: Vec<Uid>,
    },
    /// The flags of one or more messages changed.
    FlagsUpdated {
        mailbox_id: MailboxId,
        session_id: SessionId,
        updated_flags: Vec<UpdatedFlags>,
    },
    /// The mailbox itself was deleted.
    MailboxDeletion {
        mailbox_id: MailboxId,
        session_id: SessionId,
    },
    /// Anything else, such as a rename or ACL change. Selected mailboxes do
    /// not react to these, but idle listeners are still woken.
    Other {
        mailbox_id: MailboxId,
        session_id: SessionId,
    },
}

impl MailboxEvent {
    pub fn mailbox_id(&self) -> MailboxId {
        match *self {
            MailboxEvent::Added { mailbox_id, .. }
            | MailboxEvent::Expunged { mailbox_id, .. }
            | MailboxEvent::FlagsUpdated { mailbox_id, .. }
            | MailboxEvent::MailboxDeletion { mailbox_id, .. }
            | MailboxEvent::Other { mailbox_id, .. } => mailbox_id,
        }
    }

    pub fn session_id(&self) -> SessionId {
        match *self {
            MailboxEvent::Added { session_id, .. }
            | MailboxEvent::Expunged { session_id, .. }
            | MailboxEvent::FlagsUpdated { session_id, .. }
            | MailboxEvent::MailboxDeletion { session_id, .. }
            | MailboxEvent::Other { session_id, .. } => session_id,
        }
    }
}

pub trait EventListener: Send + Sync {
    fn event(&self, event: &MailboxEvent);
}

/// A handle on a listener registered with an `EventBus`.
pub trait Registration: Send + Sync + fmt::Debug {
    /// Stop delivering events to the listener.
    ///
    /// Calling this more than once has no further effect. Events being
    /// dispatched concurrently may or may not still reach the listener.
    fn unregister(&self);
}

pub trait EventBus: Send + Sync {
    /// Start delivering events concerning `mailbox_id` to `listener`.
    fn register(
        &self,
        listener: Arc<dyn EventListener>,
        mailbox_id: MailboxId,
    ) -> Result<Box<dyn Registration>, Error>;
}

/// An `EventBus` which delivers events synchronously on the thread calling
/// `dispatch`.
#[derive(Clone, Default)]
pub struct InVmEventBus {
    listeners: Arc<Mutex<Listeners>>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_mailbox: HashMap<MailboxId, Vec<(u64, Arc<dyn EventListener>)>>,
}

impl InVmEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener registered for its mailbox.
    ///
    /// The listener list is copied out before delivery so that listeners may
    /// themselves register or unregister.
    pub fn dispatch(&self, event: &MailboxEvent) {
        let targets = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .by_mailbox
                .get(&event.mailbox_id())
                .map(|v| {
                    v.iter().map(|(_, l)| Arc::clone(l)).collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        trace!(
            "Dispatching event for mailbox {} to {} listener(s)",
            event.mailbox_id(),
            targets.len()
        );
        for listener in targets {
            listener.event(event);
        }
    }

    pub fn listener_count(&self, mailbox_id: MailboxId) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .by_mailbox
            .get(&mailbox_id)
            .map_or(0, Vec::len)
    }
}

impl EventBus for InVmEventBus {
    fn register(
        &self,
        listener: Arc<dyn EventListener>,
        mailbox_id: MailboxId,
    ) -> Result<Box<dyn Registration>, Error> {
        let mut listeners = self.listeners.lock().unwrap();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_mailbox
            .entry(mailbox_id)
            .or_default()
            .push((id, listener));

        Ok(Box::new(InVmRegistration {
            listeners: Arc::downgrade(&self.listeners),
            mailbox_id,
            id,
        }))
    }
}

#[derive(Debug)]
struct InVmRegistration {
    listeners: Weak<Mutex<Listeners>>,
    mailbox_id: MailboxId,
    id: u64,
}

impl Registration for InVmRegistration {
    fn unregister(&self) {
        let listeners = match self.listeners.upgrade() {
            Some(l) => l,
            // Bus is gone; nothing left to deliver
            None => return,
        };

        let mut listeners = listeners.lock().unwrap();
        if let Some(v) = listeners.by_mailbox.get_mut(&self.mailbox_id) {
            v.retain(|&(id, _)| id != self.id);
            if v.is_empty() {
                listeners.by_mailbox.remove(&self.mailbox_id);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl EventListener for Counter {
        fn event(&self, _: &MailboxEvent) {
            self.0.fetch_add(1, SeqCst);
        }
    }

    fn other(mailbox: u64) -> MailboxEvent {
        MailboxEvent::Other {
            mailbox_id: MailboxId(mailbox),
            session_id: SessionId(1),
        }
    }

    fn flags(flags: &[Flag]) -> Flags {
        flags.iter().cloned().collect()
    }

    #[test]
    fn updated_flags_deltas() {
        let kw = Flag::Keyword("$Important".to_owned());
        let update = UpdatedFlags::new(
            Uid::u(1),
            flags(&[Flag::Seen, Flag::Recent]),
            flags(&[Flag::Answered, Flag::Recent, kw.clone()]),
        );

        assert_eq!(flags(&[Flag::Answered, kw.clone()]), update.added_flags());
        assert_eq!(flags(&[Flag::Seen]), update.removed_flags());
        assert_eq!(
            flags(&[Flag::Answered, Flag::Seen, kw.clone()]),
            update.modified_flags()
        );
        assert!(update.adds(&kw));
        assert!(!update.adds(&Flag::Recent));
        assert!(update.is_interesting());
    }

    #[test]
    fn recent_only_change_is_not_interesting() {
        let update =
            UpdatedFlags::new(Uid::u(1), flags(&[]), flags(&[Flag::Recent]));
        assert!(update.adds(&Flag::Recent));
        assert!(!update.is_interesting());

        let update = UpdatedFlags::new(
            Uid::u(1),
            flags(&[Flag::Seen]),
            flags(&[Flag::Seen]),
        );
        assert!(!update.is_interesting());
    }

    #[test]
    fn dispatch_only_reaches_matching_mailbox() {
        let bus = InVmEventBus::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let _ra = bus.register(a.clone(), MailboxId(1)).unwrap();
        let _rb = bus.register(b.clone(), MailboxId(2)).unwrap();

        bus.dispatch(&other(1));
        bus.dispatch(&other(1));
        bus.dispatch(&other(3));

        assert_eq!(2, a.0.load(SeqCst));
        assert_eq!(0, b.0.load(SeqCst));
    }

    #[test]
    fn unregister_is_idempotent() {
        let bus = InVmEventBus::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        let ra = bus.register(a.clone(), MailboxId(1)).unwrap();
        let _rb = bus.register(b.clone(), MailboxId(1)).unwrap();
        assert_eq!(2, bus.listener_count(MailboxId(1)));

        ra.unregister();
        ra.unregister();
        assert_eq!(1, bus.listener_count(MailboxId(1)));

        bus.dispatch(&other(1));
        assert_eq!(0, a.0.load(SeqCst));
        assert_eq!(1, b.0.load(SeqCst));
    }

    #[test]
    fn unregister_after_bus_dropped() {
        let bus = InVmEventBus::new();
        let r = bus
            .register(Arc::new(Counter::default()), MailboxId(1))
            .unwrap();
        drop(bus);
        r.unregister();
    }

    #[test]
    fn event_accessors() {
        let event = MailboxEvent::Expunged {
            mailbox_id: MailboxId(4),
            session_id: SessionId(9),
            uids: vec![Uid::u(1)],
        };
        assert_eq!(MailboxId(4), event.mailbox_id());
        assert_eq!(SessionId(9), event.session_id());
    }
}
