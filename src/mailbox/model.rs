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

use std::collections::BTreeSet;
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;

use bitflags::bitflags;

use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs are assigned by the backing store on append, increase strictly within
/// a mailbox and are never reused or changed once assigned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU64);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Uid(NonZeroU64::new_unchecked(1)) };
    pub const MAX: Self = unsafe { Uid(NonZeroU64::new_unchecked(u64::MAX)) };

    pub fn of(uid: u64) -> Option<Self> {
        NonZeroU64::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        self.0.get().checked_add(1).and_then(Uid::of)
    }

    #[cfg(test)]
    pub fn u(uid: u64) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl From<Uid> for u64 {
    fn from(uid: Uid) -> u64 {
        uid.0.get()
    }
}

/// The sequence number of a message.
///
/// This is one plus the number of messages known to the session which have a
/// UID less than the message's own. It is renumbered on every removal and
/// never persisted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seqnum(pub NonZeroU32);

impl Seqnum {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { Seqnum(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { Seqnum(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        let u: Result<usize, _> = self.0.get().try_into();
        u.unwrap() - 1
    }

    pub fn from_index(ix: usize) -> Self {
        Seqnum::of((ix + 1).try_into().unwrap()).unwrap()
    }
}

impl From<Seqnum> for u32 {
    fn from(seqnum: Seqnum) -> u32 {
        seqnum.0.get()
    }
}

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

/// Identifies a mailbox independently of its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MailboxId(pub u64);

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies the mailbox session which caused a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

/// A single message flag.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    /// The transient `\Recent` flag. It is tracked per session and never
    /// advertised as an applicable flag.
    Recent,
    Seen,
    Keyword(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\recent") {
            Ok(Flag::Recent)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.starts_with('\\') {
            Err(Error::NxFlag)
        } else if !s.is_empty()
            && s.as_bytes().iter().copied().all(is_atom_char)
        {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::UnsafeName)
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    match ch {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

bitflags! {
    /// The system flags defined by RFC 3501.
    #[derive(Default)]
    pub struct SystemFlags: u8 {
        const ANSWERED = 1 << 0;
        const DELETED = 1 << 1;
        const DRAFT = 1 << 2;
        const FLAGGED = 1 << 3;
        const RECENT = 1 << 4;
        const SEEN = 1 << 5;
    }
}

static SYSTEM_FLAGS: [(SystemFlags, Flag); 6] = [
    (SystemFlags::ANSWERED, Flag::Answered),
    (SystemFlags::DELETED, Flag::Deleted),
    (SystemFlags::DRAFT, Flag::Draft),
    (SystemFlags::FLAGGED, Flag::Flagged),
    (SystemFlags::RECENT, Flag::Recent),
    (SystemFlags::SEEN, Flag::Seen),
];

impl Flag {
    fn system_bit(&self) -> Option<SystemFlags> {
        match *self {
            Flag::Answered => Some(SystemFlags::ANSWERED),
            Flag::Deleted => Some(SystemFlags::DELETED),
            Flag::Draft => Some(SystemFlags::DRAFT),
            Flag::Flagged => Some(SystemFlags::FLAGGED),
            Flag::Recent => Some(SystemFlags::RECENT),
            Flag::Seen => Some(SystemFlags::SEEN),
            Flag::Keyword(_) => None,
        }
    }
}

/// A set of message flags: the system flags as a bitset plus user-defined
/// keywords.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Flags {
    system: SystemFlags,
    user: BTreeSet<String>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `flag` to this set.
    ///
    /// Returns true if it was not already present.
    pub fn insert(&mut self, flag: Flag) -> bool {
        match flag.system_bit() {
            Some(bit) => {
                let ret = !self.system.contains(bit);
                self.system.insert(bit);
                ret
            }
            None => match flag {
                Flag::Keyword(kw) => self.user.insert(kw),
                _ => false,
            },
        }
    }

    /// Remove `flag` from this set.
    ///
    /// Returns true if it was present.
    pub fn remove(&mut self, flag: &Flag) -> bool {
        match (flag.system_bit(), flag) {
            (Some(bit), _) => {
                let ret = self.system.contains(bit);
                self.system.remove(bit);
                ret
            }
            (None, &Flag::Keyword(ref kw)) => self.user.remove(kw),
            (None, _) => false,
        }
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        match (flag.system_bit(), flag) {
            (Some(bit), _) => self.system.contains(bit),
            (None, &Flag::Keyword(ref kw)) => self.user.contains(kw),
            (None, _) => false,
        }
    }

    pub fn system(&self) -> SystemFlags {
        self.system
    }

    pub fn user_flags(&self) -> impl Iterator<Item = &str> + '_ {
        self.user.iter().map(String::as_str)
    }

    pub fn user_flag_count(&self) -> usize {
        self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }

    pub fn len(&self) -> usize {
        self.system.bits().count_ones() as usize + self.user.len()
    }

    /// Iterate over the flags in this set, system flags first.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        SYSTEM_FLAGS
            .iter()
            .filter(move |&&(bit, _)| self.system.contains(bit))
            .map(|&(_, ref flag)| flag.clone())
            .chain(self.user.iter().cloned().map(Flag::Keyword))
    }

    /// Return the flags present in either `self` or `other`.
    pub fn union(&self, other: &Flags) -> Flags {
        Flags {
            system: self.system | other.system,
            user: self.user.union(&other.user).cloned().collect(),
        }
    }

    /// Return the flags present in `self` but not in `other`.
    pub fn difference(&self, other: &Flags) -> Flags {
        Flags {
            system: self.system - other.system,
            user: self.user.difference(&other.user).cloned().collect(),
        }
    }

    /// Return the flags present in exactly one of `self` and `other`.
    pub fn symmetric_difference(&self, other: &Flags) -> Flags {
        Flags {
            system: self.system ^ other.system,
            user: self
                .user
                .symmetric_difference(&other.user)
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(it: I) -> Self {
        let mut flags = Flags::new();
        for flag in it {
            flags.insert(flag);
        }
        flags
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
