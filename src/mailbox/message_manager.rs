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

//! The query surface the storage layer exposes for a single mailbox.

use super::model::{Flags, MailboxId, SessionId, Uid};
use crate::support::error::Error;

/// Identifies the user on whose behalf a storage operation runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxSession {
    pub id: SessionId,
    pub user: String,
}

impl MailboxSession {
    pub fn new(id: SessionId, user: impl Into<String>) -> Self {
        MailboxSession {
            id,
            user: user.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchQuery {
    /// Every message in the mailbox.
    All,
    /// Messages whose UID lies within the inclusive range.
    UidRange(Uid, Uid),
}

impl SearchQuery {
    pub fn matches(&self, uid: Uid) -> bool {
        match *self {
            SearchQuery::All => true,
            SearchQuery::UidRange(start, end) => uid >= start && uid <= end,
        }
    }
}

pub trait MessageManager: Send + Sync {
    fn id(&self) -> MailboxId;

    /// Return every flag currently in use in the mailbox.
    fn applicable_flags(&self, session: &MailboxSession)
        -> Result<Flags, Error>;

    /// Return the UIDs of the messages matching `query`, in any order.
    fn search(
        &self,
        query: &SearchQuery,
        session: &MailboxSession,
    ) -> Result<Vec<Uid>, Error>;
}
