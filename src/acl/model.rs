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

//! The data model of RFC 4314 access control lists.
//!
//! Everything here is an immutable value; edits produce new values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use lazy_static::lazy_static;

use crate::support::error::Error;

/// A single right applicable to a mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Right {
    /// `a`: perform SETACL, DELETEACL, GETACL, LISTRIGHTS
    Administer,
    /// `e`: perform EXPUNGE, and expunge as part of CLOSE
    PerformExpunge,
    /// `i`: APPEND or COPY into the mailbox
    Insert,
    /// `k`: create child mailboxes, or rename into this one
    CreateMailbox,
    /// `l`: the mailbox is visible to LIST
    Lookup,
    /// `p`: send mail to the submission address of the mailbox
    Post,
    /// `r`: SELECT the mailbox and perform STATUS
    Read,
    /// `s`: keep `\Seen` across sessions
    WriteSeenFlag,
    /// `t`: set or clear `\Deleted`
    DeleteMessages,
    /// `w`: set or clear flags other than `\Seen` and `\Deleted`
    Write,
    /// `x`: delete or rename the mailbox
    DeleteMailbox,
}

impl Right {
    /// Every right, in serialisation order.
    pub const ALL: [Right; 11] = [
        Right::Administer,
        Right::PerformExpunge,
        Right::Insert,
        Right::CreateMailbox,
        Right::Lookup,
        Right::Post,
        Right::Read,
        Right::WriteSeenFlag,
        Right::DeleteMessages,
        Right::Write,
        Right::DeleteMailbox,
    ];

    pub fn as_char(self) -> char {
        match self {
            Right::Administer => 'a',
            Right::PerformExpunge => 'e',
            Right::Insert => 'i',
            Right::CreateMailbox => 'k',
            Right::Lookup => 'l',
            Right::Post => 'p',
            Right::Read => 'r',
            Right::WriteSeenFlag => 's',
            Right::DeleteMessages => 't',
            Right::Write => 'w',
            Right::DeleteMailbox => 'x',
        }
    }

    pub fn for_char(ch: char) -> Result<Self, Error> {
        Right::ALL
            .iter()
            .copied()
            .find(|r| r.as_char() == ch)
            .ok_or(Error::UnsupportedRight(ch))
    }
}

bitflags! {
    /// A set of `Right`s.
    #[derive(Default)]
    pub struct Rfc4314Rights: u16 {
        const ADMINISTER = 1 << 0;
        const PERFORM_EXPUNGE = 1 << 1;
        const INSERT = 1 << 2;
        const CREATE_MAILBOX = 1 << 3;
        const LOOKUP = 1 << 4;
        const POST = 1 << 5;
        const READ = 1 << 6;
        const WRITE_SEEN_FLAG = 1 << 7;
        const DELETE_MESSAGES = 1 << 8;
        const WRITE = 1 << 9;
        const DELETE_MAILBOX = 1 << 10;
    }
}

impl From<Right> for Rfc4314Rights {
    fn from(right: Right) -> Self {
        Rfc4314Rights::from_bits_truncate(1 << right as u16)
    }
}

impl Rfc4314Rights {
    pub fn of(rights: &[Right]) -> Self {
        rights
            .iter()
            .fold(Rfc4314Rights::empty(), |acc, &r| acc | r.into())
    }

    /// Every right except those in `rights`.
    pub fn all_except(rights: &[Right]) -> Self {
        Self::all() - Self::of(rights)
    }

    /// The rights in `self` which are not in `other`.
    pub fn except(self, other: Self) -> Self {
        self - other
    }

    pub fn contains_right(self, right: Right) -> bool {
        self.contains(right.into())
    }

    /// Iterate over the rights in this set in serialisation order.
    pub fn rights(self) -> impl Iterator<Item = Right> {
        Right::ALL
            .into_iter()
            .filter(move |&r| self.contains_right(r))
    }
}

impl fmt::Display for Rfc4314Rights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for right in self.rights() {
            write!(f, "{}", right.as_char())?;
        }
        Ok(())
    }
}

impl FromStr for Rfc4314Rights {
    type Err = Error;

    /// Parse a right string such as `lrswi`.
    ///
    /// The RFC 2086 rights `c` and `d` are accepted and expand to the RFC
    /// 4314 rights which replaced them.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut rights = Rfc4314Rights::empty();
        for ch in s.chars() {
            rights |= match ch {
                'c' => {
                    Rfc4314Rights::CREATE_MAILBOX
                        | Rfc4314Rights::DELETE_MAILBOX
                }
                'd' => {
                    Rfc4314Rights::PERFORM_EXPUNGE
                        | Rfc4314Rights::DELETE_MESSAGES
                        | Rfc4314Rights::DELETE_MAILBOX
                }
                ch => Right::for_char(ch)?.into(),
            };
        }
        Ok(rights)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NameType {
    Group,
    Special,
    User,
}

/// Identifiers with a meaning fixed by RFC 4314 rather than naming a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialName {
    /// Everyone, including anonymous sessions.
    Anyone,
    /// Every authenticated user.
    Authenticated,
    /// Whoever owns the mailbox the ACL belongs to.
    Owner,
}

impl SpecialName {
    pub const ALL: [SpecialName; 3] = [
        SpecialName::Anyone,
        SpecialName::Authenticated,
        SpecialName::Owner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpecialName::Anyone => "anyone",
            SpecialName::Authenticated => "authenticated",
            SpecialName::Owner => "owner",
        }
    }

    pub fn for_name(name: &str) -> Option<Self> {
        SpecialName::ALL.iter().copied().find(|s| s.name() == name)
    }
}

/// The key of an ACL entry: whom it grants (or, if negative, denies) rights.
///
/// The serialised form is the name prefixed by `$` for groups, itself
/// prefixed by `-` for negative keys. A user name equal to one of the
/// special names cannot be expressed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey {
    name: String,
    name_type: NameType,
    negative: bool,
}

impl EntryKey {
    pub fn new(
        name: impl Into<String>,
        name_type: NameType,
        negative: bool,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::BadAclKey(name));
        }

        Ok(EntryKey {
            name,
            name_type,
            negative,
        })
    }

    pub fn user(name: impl Into<String>) -> Self {
        EntryKey {
            name: name.into(),
            name_type: NameType::User,
            negative: false,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        EntryKey {
            name: name.into(),
            name_type: NameType::Group,
            negative: false,
        }
    }

    pub fn special(name: SpecialName) -> Self {
        EntryKey {
            name: name.name().to_owned(),
            name_type: NameType::Special,
            negative: false,
        }
    }

    pub fn anyone() -> Self {
        Self::special(SpecialName::Anyone)
    }

    pub fn authenticated() -> Self {
        Self::special(SpecialName::Authenticated)
    }

    pub fn owner() -> Self {
        Self::special(SpecialName::Owner)
    }

    /// Return the negative counterpart of this key.
    pub fn negated(self) -> Self {
        EntryKey {
            negative: true,
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_type(&self) -> NameType {
        self.name_type
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// If this is a special key, return which one.
    pub fn special_name(&self) -> Option<SpecialName> {
        if NameType::Special == self.name_type {
            SpecialName::for_name(&self.name)
        } else {
            None
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        if NameType::Group == self.name_type {
            write!(f, "$")?;
        }
        write!(f, "{}", self.name)
    }
}

impl FromStr for EntryKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (name_type, name) = match rest.strip_prefix('$') {
            Some(name) => (NameType::Group, name),
            None if SpecialName::for_name(rest).is_some() => {
                (NameType::Special, rest)
            }
            None => (NameType::User, rest),
        };

        if name.is_empty() {
            return Err(Error::BadAclKey(s.to_owned()));
        }

        EntryKey::new(name, name_type, negative)
    }
}

/// Whether an `AclCommand` adds, removes, or replaces rights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditMode {
    Add,
    Remove,
    Replace,
}

/// A single SETACL/DELETEACL edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclCommand {
    pub key: EntryKey,
    pub edit_mode: EditMode,
    pub rights: Rfc4314Rights,
}

impl AclCommand {
    pub fn builder() -> AclCommandBuilder {
        AclCommandBuilder::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct AclCommandBuilder {
    key: Option<EntryKey>,
    edit_mode: Option<EditMode>,
    rights: Option<Rfc4314Rights>,
}

impl AclCommandBuilder {
    pub fn for_user(self, user: impl Into<String>) -> Self {
        self.key(EntryKey::user(user))
    }

    pub fn for_group(self, group: impl Into<String>) -> Self {
        self.key(EntryKey::group(group))
    }

    pub fn for_owner(self) -> Self {
        self.key(EntryKey::owner())
    }

    pub fn key(mut self, key: EntryKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn rights(mut self, rights: Rfc4314Rights) -> Self {
        self.rights = Some(rights);
        self
    }

    pub fn no_rights(self) -> Self {
        self.rights(Rfc4314Rights::empty())
    }

    pub fn mode(mut self, edit_mode: EditMode) -> Self {
        self.edit_mode = Some(edit_mode);
        self
    }

    pub fn as_addition(self) -> Result<AclCommand, Error> {
        self.mode(EditMode::Add).build()
    }

    pub fn as_removal(self) -> Result<AclCommand, Error> {
        self.mode(EditMode::Remove).build()
    }

    pub fn as_replacement(self) -> Result<AclCommand, Error> {
        self.mode(EditMode::Replace).build()
    }

    pub fn build(self) -> Result<AclCommand, Error> {
        match (self.key, self.edit_mode, self.rights) {
            (Some(key), Some(edit_mode), Some(rights)) => Ok(AclCommand {
                key,
                edit_mode,
                rights,
            }),
            _ => Err(Error::IncompleteAclCommand),
        }
    }
}

lazy_static! {
    static ref OWNER_FULL_ACL: MailboxAcl = MailboxAcl::from_entries(vec![(
        EntryKey::owner(),
        Rfc4314Rights::all()
    )]);
    static ref OWNER_FULL_EXCEPT_ADMINISTRATION_ACL: MailboxAcl =
        MailboxAcl::from_entries(vec![(
            EntryKey::owner(),
            Rfc4314Rights::all_except(&[Right::Administer]),
        )]);
}

/// The access control list of one mailbox.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailboxAcl {
    entries: BTreeMap<EntryKey, Rfc4314Rights>,
}

impl MailboxAcl {
    pub fn empty() -> Self {
        Self::default()
    }

    /// An ACL granting the owner every right.
    pub fn owner_full() -> Self {
        OWNER_FULL_ACL.clone()
    }

    /// An ACL granting the owner every right except administer.
    pub fn owner_full_except_administration() -> Self {
        OWNER_FULL_EXCEPT_ADMINISTRATION_ACL.clone()
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (EntryKey, Rfc4314Rights)>,
    ) -> Self {
        MailboxAcl {
            entries: entries.into_iter().collect(),
        }
    }

    /// Build an ACL from (key, rights) pairs in their serialised forms.
    pub fn from_serialized<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, Error> {
        let entries = entries
            .into_iter()
            .map(|(k, v)| -> Result<_, Error> {
                Ok((k.parse::<EntryKey>()?, v.parse::<Rfc4314Rights>()?))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>()?;
        Ok(MailboxAcl { entries })
    }

    pub fn entries(
        &self,
    ) -> impl Iterator<Item = (&EntryKey, &Rfc4314Rights)> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, key: &EntryKey) -> Option<&Rfc4314Rights> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply a SETACL/DELETEACL edit.
    pub fn apply(&self, command: &AclCommand) -> Self {
        match command.edit_mode {
            EditMode::Add => {
                self.union_entry(command.key.clone(), command.rights)
            }
            EditMode::Remove => {
                self.except_entry(&command.key, command.rights)
            }
            EditMode::Replace => {
                self.replace(command.key.clone(), command.rights)
            }
        }
    }

    /// Combine two ACLs, taking the union of the rights of keys present in
    /// both.
    ///
    /// E.g., `user1:lr user2:lrwt` union `user1:at -$group1:lrwt` is
    /// `user1:alrt user2:lrwt -$group1:lrwt`.
    pub fn union(&self, other: &MailboxAcl) -> Self {
        let mut entries = self.entries.clone();
        for (key, &rights) in &other.entries {
            *entries.entry(key.clone()).or_default() |= rights;
        }
        MailboxAcl { entries }
    }

    pub fn union_entry(&self, key: EntryKey, rights: Rfc4314Rights) -> Self {
        self.union(&MailboxAcl::from_entries(vec![(key, rights)]))
    }

    /// Remove the rights in `other` from the corresponding entries of this
    /// ACL.
    ///
    /// Entries left without rights are dropped, so `user1:lr user2:lrwt`
    /// except `user1:lr` is `user2:lrwt`.
    pub fn except(&self, other: &MailboxAcl) -> Self {
        MailboxAcl {
            entries: self
                .entries
                .iter()
                .map(|(key, &rights)| {
                    let remove =
                        other.entries.get(key).copied().unwrap_or_default();
                    (key.clone(), rights - remove)
                })
                .filter(|&(_, rights)| !rights.is_empty())
                .collect(),
        }
    }

    pub fn except_entry(&self, key: &EntryKey, rights: Rfc4314Rights) -> Self {
        self.except(&MailboxAcl::from_entries(vec![(key.clone(), rights)]))
    }

    /// Set the rights of `key` to exactly `rights`.
    ///
    /// Replacing with no rights removes the entry.
    pub fn replace(&self, key: EntryKey, rights: Rfc4314Rights) -> Self {
        let mut entries = self.entries.clone();
        if rights.is_empty() {
            entries.remove(&key);
        } else {
            entries.insert(key, rights);
        }
        MailboxAcl { entries }
    }

    /// Return the positive entries whose key has the given name type.
    pub fn of_positive_name_type(&self, name_type: NameType) -> Self {
        MailboxAcl {
            entries: self
                .entries
                .iter()
                .filter(|&(k, _)| !k.negative && name_type == k.name_type)
                .map(|(k, &v)| (k.clone(), v))
                .collect(),
        }
    }
}
