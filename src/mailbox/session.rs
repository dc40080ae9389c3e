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

use std::sync::{Arc, Mutex};

use super::message_manager::MailboxSession;
use super::model::SessionId;
use super::selected::SelectedMailbox;
use crate::support::log_prefix::LogPrefix;

/// The part of an IMAP session's state that outlives any one selection.
///
/// A session has at most one selected mailbox at a time. Event handlers of
/// any `SelectedMailbox` belonging to this session consult the slot held
/// here to decide which mailbox newly arrived messages are recent in.
#[derive(Debug)]
pub struct ImapSession {
    mailbox_session: MailboxSession,
    log_prefix: LogPrefix,
    selected: Mutex<Option<Arc<SelectedMailbox>>>,
}

impl ImapSession {
    pub fn new(mailbox_session: MailboxSession, log_prefix: LogPrefix) -> Self {
        log_prefix.set_session(mailbox_session.id.0);
        log_prefix.set_user(mailbox_session.user.clone());
        ImapSession {
            mailbox_session,
            log_prefix,
            selected: Mutex::new(None),
        }
    }

    pub fn mailbox_session(&self) -> &MailboxSession {
        &self.mailbox_session
    }

    pub fn session_id(&self) -> SessionId {
        self.mailbox_session.id
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    /// Return the currently selected mailbox, if any.
    pub fn selected(&self) -> Option<Arc<SelectedMailbox>> {
        self.selected.lock().unwrap().clone()
    }

    pub(super) fn set_selected(&self, selected: Arc<SelectedMailbox>) {
        self.log_prefix
            .set_mailbox(Some(selected.mailbox_id().to_string()));
        *self.selected.lock().unwrap() = Some(selected);
    }

    pub(super) fn take_selected(&self) -> Option<Arc<SelectedMailbox>> {
        self.selected.lock().unwrap().take()
    }

    /// Clear the selection slot, but only if it still holds `selected`.
    pub(super) fn clear_selected_if(&self, selected: &SelectedMailbox) {
        let mut slot = self.selected.lock().unwrap();
        if slot.as_ref().map_or(false, |s| std::ptr::eq(&**s, selected)) {
            *slot = None;
            self.log_prefix.set_mailbox(None);
        }
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        // The event bus keeps the selection alive until it unregisters.
        let selected = match self.selected.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(selected) = selected {
            selected.deselect();
        }
    }
}
