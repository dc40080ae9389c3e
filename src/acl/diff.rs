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

//! Comparison of two snapshots of a mailbox ACL.
//!
//! This is used to decide which users must be told that they gained or lost
//! access to a mailbox after its ACL was edited.

use super::model::{EntryKey, MailboxAcl, NameType, Rfc4314Rights};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclDiff {
    old_acl: MailboxAcl,
    new_acl: MailboxAcl,
}

impl AclDiff {
    /// Compare `old_acl` and `new_acl`, considering only positive user
    /// entries.
    pub fn compute(old_acl: &MailboxAcl, new_acl: &MailboxAcl) -> Self {
        AclDiff {
            old_acl: old_acl.of_positive_name_type(NameType::User),
            new_acl: new_acl.of_positive_name_type(NameType::User),
        }
    }

    /// Compare `old_acl` and `new_acl` across every kind of entry.
    pub fn compute_unrestricted(
        old_acl: &MailboxAcl,
        new_acl: &MailboxAcl,
    ) -> Self {
        AclDiff {
            old_acl: old_acl.clone(),
            new_acl: new_acl.clone(),
        }
    }

    pub fn old_acl(&self) -> &MailboxAcl {
        &self.old_acl
    }

    pub fn new_acl(&self) -> &MailboxAcl {
        &self.new_acl
    }

    /// Entries whose key is only in the new ACL.
    pub fn added_entries(&self) -> Vec<(EntryKey, Rfc4314Rights)> {
        only_in(&self.new_acl, &self.old_acl)
    }

    /// Entries whose key is only in the old ACL.
    pub fn removed_entries(&self) -> Vec<(EntryKey, Rfc4314Rights)> {
        only_in(&self.old_acl, &self.new_acl)
    }

    /// Entries whose key is in both ACLs but whose rights differ, with their
    /// new rights.
    pub fn changed_entries(&self) -> Vec<(EntryKey, Rfc4314Rights)> {
        self.new_acl
            .entries()
            .filter(|&(key, rights)| {
                self.old_acl.get(key).map_or(false, |old| old != rights)
            })
            .map(|(key, &rights)| (key.clone(), rights))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.old_acl == self.new_acl
    }
}

fn only_in(
    acl: &MailboxAcl,
    other: &MailboxAcl,
) -> Vec<(EntryKey, Rfc4314Rights)> {
    acl.entries()
        .filter(|&(key, _)| other.get(key).is_none())
        .map(|(key, &rights)| (key.clone(), rights))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn acl(entries: &[(&str, &str)]) -> MailboxAcl {
        MailboxAcl::from_serialized(entries.iter().copied()).unwrap()
    }

    fn entry(key: &str, rights: &str) -> (EntryKey, Rfc4314Rights) {
        (key.parse().unwrap(), rights.parse().unwrap())
    }

    #[test]
    fn added_changed_and_removed() {
        let diff = AclDiff::compute(
            &acl(&[("alice", "r")]),
            &acl(&[("alice", "lr"), ("dave", "w")]),
        );
        assert_eq!(vec![entry("dave", "w")], diff.added_entries());
        assert_eq!(vec![entry("alice", "lr")], diff.changed_entries());
        assert!(diff.removed_entries().is_empty());
        assert!(!diff.is_empty());

        let diff = AclDiff::compute(
            &acl(&[("alice", "lr"), ("dave", "w")]),
            &acl(&[("alice", "lr")]),
        );
        assert!(diff.added_entries().is_empty());
        assert!(diff.changed_entries().is_empty());
        assert_eq!(vec![entry("dave", "w")], diff.removed_entries());
    }

    #[test]
    fn identical_acls_have_no_diff() {
        let a = acl(&[("alice", "lr"), ("$staff", "l")]);
        let diff = AclDiff::compute(&a, &a);
        assert!(diff.is_empty());
        assert!(diff.added_entries().is_empty());
        assert!(diff.removed_entries().is_empty());
        assert!(diff.changed_entries().is_empty());
    }

    #[test]
    fn non_user_and_negative_entries_are_ignored_by_default() {
        let old = acl(&[("alice", "r"), ("-bob", "r")]);
        let new = acl(&[("alice", "r"), ("$staff", "l"), ("owner", "a")]);

        let diff = AclDiff::compute(&old, &new);
        assert!(diff.is_empty());
        assert_eq!(&acl(&[("alice", "r")]), diff.new_acl());

        let diff = AclDiff::compute_unrestricted(&old, &new);
        assert_eq!(
            vec![entry("owner", "a"), entry("$staff", "l")],
            diff.added_entries()
        );
        assert_eq!(vec![entry("-bob", "r")], diff.removed_entries());
        assert_eq!(&old, diff.old_acl());
    }
}
