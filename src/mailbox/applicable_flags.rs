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

//! The set of flags advertised to clients by the FLAGS response.

use super::event::UpdatedFlags;
use super::model::{Flag, Flags};

/// An immutable set of applicable flags plus a bit recording whether it grew
/// since the client was last told about it.
///
/// Updating produces a new value; holders swap the whole value under a lock
/// so the `updated` bit is always computed against the value it replaces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicableFlags {
    flags: Flags,
    updated: bool,
}

impl ApplicableFlags {
    pub fn new(flags: Flags) -> Self {
        ApplicableFlags {
            flags: strip_recent(flags),
            updated: false,
        }
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn updated(&self) -> bool {
        self.updated
    }

    /// Return the same flags with the `updated` bit cleared.
    pub fn ack_updates(&self) -> Self {
        ApplicableFlags {
            flags: self.flags.clone(),
            updated: false,
        }
    }

    /// Merge `new_flags` into this set.
    ///
    /// `\Recent` is never applicable. The result is marked updated if it was
    /// already, or if the merge introduced a user flag not previously
    /// present; system flags are always implicitly advertised so growing
    /// them does not count.
    pub fn update_with_new_flags(&self, new_flags: &Flags) -> Self {
        let flags = strip_recent(self.flags.union(new_flags));
        let updated = self.updated
            || flags.user_flag_count() > self.flags.user_flag_count();
        ApplicableFlags { flags, updated }
    }

    /// Merge flags fetched from the backend at selection time.
    ///
    /// Unlike `update_with_new_flags`, this never marks the value updated,
    /// since the client learns the initial set from the SELECT response.
    pub fn with_initial_flags(&self, initial: &Flags) -> Self {
        ApplicableFlags {
            flags: strip_recent(self.flags.union(initial)),
            updated: self.updated,
        }
    }
}

fn strip_recent(mut flags: Flags) -> Flags {
    flags.remove(&Flag::Recent);
    flags
}

/// Fold the new flags of every delta in `updates` into `current`.
pub fn update_applicable_flags(
    current: &ApplicableFlags,
    updates: &[UpdatedFlags],
) -> ApplicableFlags {
    let new_flags = updates
        .iter()
        .fold(Flags::new(), |acc, u| acc.union(&u.new_flags));
    current.update_with_new_flags(&new_flags)
}
