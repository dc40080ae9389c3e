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

//! Fakes for the collaborators of `SelectedMailbox`.

use std::sync::Arc;

use super::event::*;
use super::message_manager::*;
use super::model::*;
use super::session::ImapSession;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

pub const OWN_SESSION: SessionId = SessionId(1);
pub const OTHER_SESSION: SessionId = SessionId(2);
pub const MAILBOX: MailboxId = MailboxId(42);

pub struct FakeMessageManager {
    pub id: MailboxId,
    pub flags: Flags,
    pub uids: Vec<Uid>,
    pub fail_search: bool,
}

impl FakeMessageManager {
    pub fn new(id: MailboxId, uids: &[u64]) -> Self {
        FakeMessageManager {
            id,
            flags: Flags::new(),
            uids: uids.iter().copied().map(Uid::u).collect(),
            fail_search: false,
        }
    }
}

impl MessageManager for FakeMessageManager {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn applicable_flags(&self, _: &MailboxSession) -> Result<Flags, Error> {
        Ok(self.flags.clone())
    }

    fn search(
        &self,
        query: &SearchQuery,
        _: &MailboxSession,
    ) -> Result<Vec<Uid>, Error> {
        if self.fail_search {
            return Err(Error::MailboxBackend("search failed".to_owned()));
        }

        Ok(self
            .uids
            .iter()
            .copied()
            .filter(|&uid| query.matches(uid))
            .collect())
    }
}

pub struct FailingEventBus;

impl EventBus for FailingEventBus {
    fn register(
        &self,
        _: Arc<dyn EventListener>,
        _: MailboxId,
    ) -> Result<Box<dyn Registration>, Error> {
        Err(Error::EventBus("connection refused".to_owned()))
    }
}

/// An event bus which delivers `on_register` to each listener as it
/// registers, i.e., while the selected mailbox is still initialising.
pub struct EmittingEventBus {
    pub inner: InVmEventBus,
    pub on_register: Vec<MailboxEvent>,
}

impl EventBus for EmittingEventBus {
    fn register(
        &self,
        listener: Arc<dyn EventListener>,
        mailbox_id: MailboxId,
    ) -> Result<Box<dyn Registration>, Error> {
        let registration =
            self.inner.register(Arc::clone(&listener), mailbox_id)?;
        for event in &self.on_register {
            listener.event(event);
        }
        Ok(registration)
    }
}

pub fn imap_session(id: SessionId) -> Arc<ImapSession> {
    Arc::new(ImapSession::new(
        MailboxSession::new(id, "tellier"),
        LogPrefix::new("imap".to_owned()),
    ))
}

pub fn flags(flags: &[Flag]) -> Flags {
    flags.iter().cloned().collect()
}

pub fn kw(s: &str) -> Flag {
    Flag::Keyword(s.to_owned())
}

pub fn added(session_id: SessionId, uids: &[u64]) -> MailboxEvent {
    MailboxEvent::Added {
        mailbox_id: MAILBOX,
        session_id,
        uids: uids.iter().copied().map(Uid::u).collect(),
    }
}

pub fn expunged(session_id: SessionId, uids: &[u64]) -> MailboxEvent {
    MailboxEvent::Expunged {
        mailbox_id: MAILBOX,
        session_id,
        uids: uids.iter().copied().map(Uid::u).collect(),
    }
}

pub fn flags_updated(
    session_id: SessionId,
    updated_flags: Vec<UpdatedFlags>,
) -> MailboxEvent {
    MailboxEvent::FlagsUpdated {
        mailbox_id: MAILBOX,
        session_id,
        updated_flags,
    }
}
