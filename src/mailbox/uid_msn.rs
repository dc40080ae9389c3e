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

//! Mapping between UIDs and the sequence numbers a session sees.
//!
//! Sequence numbers are never stored. The converter keeps the UIDs known to
//! the session in a sorted vector, and a message's sequence number is simply
//! its rank within it.

use std::sync::Mutex;

use super::model::{Seqnum, Uid};

#[derive(Debug, Default)]
pub struct UidMsnConverter {
    uids: Mutex<Vec<Uid>>,
}

impl UidMsnConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `uid` to the set of known messages.
    ///
    /// Does nothing if it is already known. Appending a UID greater than all
    /// others is the common case and does not need to search.
    pub fn add_uid(&self, uid: Uid) {
        let mut uids = self.uids.lock().unwrap();
        if uids.last().map_or(true, |&last| uid > last) {
            uids.push(uid);
        } else if let Err(ix) = uids.binary_search(&uid) {
            uids.insert(ix, uid);
        }
    }

    /// Add every UID in `new` to the set of known messages.
    ///
    /// The input need not be sorted and may contain duplicates or UIDs which
    /// are already known.
    pub fn add_all(&self, new: impl IntoIterator<Item = Uid>) {
        let mut uids = self.uids.lock().unwrap();
        uids.extend(new);
        uids.sort_unstable();
        uids.dedup();
    }

    /// Forget `uid`, shifting the sequence numbers of all greater UIDs down
    /// by one.
    ///
    /// Returns whether the UID was known.
    pub fn remove(&self, uid: Uid) -> bool {
        let mut uids = self.uids.lock().unwrap();
        match uids.binary_search(&uid) {
            Ok(ix) => {
                uids.remove(ix);
                true
            }
            Err(_) => false,
        }
    }

    /// Return the sequence number of `uid`, or `None` if it is not known.
    pub fn get_msn(&self, uid: Uid) -> Option<Seqnum> {
        self.uids
            .lock()
            .unwrap()
            .binary_search(&uid)
            .ok()
            .map(Seqnum::from_index)
    }

    /// Return the UID at sequence number `msn`.
    ///
    /// `msn` is taken as a raw integer since it usually comes straight from
    /// the client; 0 and values beyond the number of messages yield `None`.
    pub fn get_uid(&self, msn: u32) -> Option<Uid> {
        let seqnum = Seqnum::of(msn)?;
        self.uids.lock().unwrap().get(seqnum.to_index()).copied()
    }

    pub fn first_uid(&self) -> Option<Uid> {
        self.uids.lock().unwrap().first().copied()
    }

    pub fn last_uid(&self) -> Option<Uid> {
        self.uids.lock().unwrap().last().copied()
    }

    pub fn num_messages(&self) -> usize {
        self.uids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.uids.lock().unwrap().clear();
    }

    /// Return a copy of all known UIDs in ascending order.
    pub fn snapshot(&self) -> Vec<Uid> {
        self.uids.lock().unwrap().clone()
    }
}
