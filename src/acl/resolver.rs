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

//! Resolution of the rights a user holds on a mailbox.
//!
//! Rights come from two ACLs: a global one, chosen by whether the mailbox is
//! owned by a user or a group, and the mailbox's own. Every entry whose key
//! applies to the requester contributes its rights, and the union of all
//! applicable negative entries is then removed from the union of all
//! applicable positive ones. Negative entries therefore always win,
//! regardless of where they appear.

use std::collections::HashSet;

use log::trace;

use super::model::*;
use crate::mailbox::model::{Flag, Flags};
use crate::support::error::Error;

pub trait GroupMembershipResolver: Send + Sync {
    fn is_member(&self, user: &str, group: &str) -> bool;
}

/// A `GroupMembershipResolver` backed by an in-memory set of memberships.
#[derive(Clone, Debug, Default)]
pub struct SimpleGroupMembershipResolver {
    memberships: HashSet<(String, String)>,
}

impl SimpleGroupMembershipResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_membership(
        &mut self,
        group: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.memberships.insert((group.into(), user.into()));
    }
}

impl GroupMembershipResolver for SimpleGroupMembershipResolver {
    fn is_member(&self, user: &str, group: &str) -> bool {
        // Avoid allocating a key just to probe the set
        self.memberships
            .iter()
            .any(|(g, u)| g == group && u == user)
    }
}

/// Determine whether the ACL entry keyed by `acl_key` applies to
/// `query_key`.
///
/// `query_key` is `None` for unauthenticated sessions; otherwise it is a
/// user, a group, or (only when answering LISTRIGHTS) a special identifier.
/// The owner of the mailbox is `resource_owner`, which names a group if
/// `owner_is_group`.
///
/// Returns `UnexpectedAclKey` if either key is a special key with an
/// unknown name.
pub fn applies(
    acl_key: &EntryKey,
    query_key: Option<&EntryKey>,
    groups: &dyn GroupMembershipResolver,
    resource_owner: &str,
    owner_is_group: bool,
) -> Result<bool, Error> {
    let acl_name = acl_key.name();
    // Matched on the name alone, whatever the key's type
    if SpecialName::Anyone.name() == acl_name {
        return Ok(true);
    }

    let query_key = match query_key {
        Some(q) => q,
        None => return Ok(false),
    };
    let query_name = query_key.name();

    let acl_special = || {
        acl_key
            .special_name()
            .ok_or_else(|| Error::UnexpectedAclKey(acl_key.to_string()))
    };

    match (query_key.name_type(), acl_key.name_type()) {
        (NameType::User, NameType::Special) => match acl_special()? {
            SpecialName::Authenticated => Ok(true),
            SpecialName::Owner => Ok(if owner_is_group {
                groups.is_member(query_name, resource_owner)
            } else {
                query_name == resource_owner
            }),
            SpecialName::Anyone => Ok(true),
        },
        (NameType::User, NameType::User) => Ok(acl_name == query_name),
        (NameType::User, NameType::Group) => {
            Ok(groups.is_member(query_name, acl_name))
        }

        // Groups count as authenticated so that LISTRIGHTS for a group
        // reports what its members would get through "authenticated".
        (NameType::Group, NameType::Special) => match acl_special()? {
            SpecialName::Authenticated => Ok(true),
            SpecialName::Owner => {
                Ok(owner_is_group && query_name == resource_owner)
            }
            SpecialName::Anyone => Ok(true),
        },
        (NameType::Group, NameType::User) => Ok(false),
        (NameType::Group, NameType::Group) => Ok(acl_name == query_name),

        (NameType::Special, NameType::Special) => {
            acl_special()?;
            let query_special = query_key
                .special_name()
                .ok_or_else(|| Error::UnexpectedAclKey(query_key.to_string()))?;
            // An authenticated owner eventually resolves through
            // "authenticated" too.
            Ok(acl_name == query_name
                || (SpecialName::Owner == query_special
                    && SpecialName::Authenticated.name() == acl_name))
        }
        (NameType::Special, NameType::User)
        | (NameType::Special, NameType::Group) => Ok(false),
    }
}

/// Determine whether a session is read-write per RFC 4314 section 4, given
/// the rights of its user and the flags shared between users of the
/// mailbox.
pub fn is_read_write(
    rights: Rfc4314Rights,
    shared_flags: Option<&Flags>,
) -> bool {
    if rights.contains_right(Right::Insert)
        || rights.contains_right(Right::PerformExpunge)
    {
        return true;
    }

    let shared_flags = match shared_flags {
        Some(f) => f,
        None => return false,
    };

    if shared_flags.contains(&Flag::Deleted)
        && rights.contains_right(Right::DeleteMessages)
    {
        true
    } else if shared_flags.contains(&Flag::Seen)
        && rights.contains_right(Right::WriteSeenFlag)
    {
        true
    } else {
        rights.contains_right(Right::Write)
            && shared_flags
                .iter()
                .any(|f| Flag::Deleted != f && Flag::Seen != f)
    }
}

/// Resolves rights by taking the union of all applicable entries of the
/// global and mailbox ACLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnionMailboxAclResolver {
    user_global_acl: MailboxAcl,
    group_global_acl: MailboxAcl,
}

impl Default for UnionMailboxAclResolver {
    /// Owners get every right on their own mailboxes; owning groups get
    /// everything except administer.
    fn default() -> Self {
        UnionMailboxAclResolver::new(
            MailboxAcl::owner_full(),
            MailboxAcl::owner_full_except_administration(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    positive: Rfc4314Rights,
    negative: Rfc4314Rights,
}

impl UnionMailboxAclResolver {
    pub fn new(
        user_global_acl: MailboxAcl,
        group_global_acl: MailboxAcl,
    ) -> Self {
        UnionMailboxAclResolver {
            user_global_acl,
            group_global_acl,
        }
    }

    pub fn user_global_acl(&self) -> &MailboxAcl {
        &self.user_global_acl
    }

    pub fn group_global_acl(&self) -> &MailboxAcl {
        &self.group_global_acl
    }

    fn global_acl(&self, owner_is_group: bool) -> &MailboxAcl {
        if owner_is_group {
            &self.group_global_acl
        } else {
            &self.user_global_acl
        }
    }

    /// Return the ACL to display for a mailbox, i.e., its own ACL merged
    /// with the applicable global ACL.
    pub fn apply_global_acl(
        &self,
        resource_acl: &MailboxAcl,
        owner_is_group: bool,
    ) -> MailboxAcl {
        resource_acl.union(self.global_acl(owner_is_group))
    }

    fn accumulate(
        acc: &mut Accumulator,
        acl: &MailboxAcl,
        query_key: Option<&EntryKey>,
        groups: &dyn GroupMembershipResolver,
        resource_owner: &str,
        owner_is_group: bool,
    ) -> Result<(), Error> {
        for (key, &rights) in acl.entries() {
            if applies(key, query_key, groups, resource_owner, owner_is_group)?
            {
                if key.is_negative() {
                    acc.negative |= rights;
                } else {
                    acc.positive |= rights;
                }
            }
        }
        Ok(())
    }

    /// Compute the rights `request_user` holds on a mailbox owned by
    /// `resource_owner` whose own ACL is `resource_acl`.
    ///
    /// `request_user` is `None` for unauthenticated sessions.
    pub fn resolve_rights(
        &self,
        request_user: Option<&str>,
        groups: &dyn GroupMembershipResolver,
        resource_acl: Option<&MailboxAcl>,
        resource_owner: &str,
        owner_is_group: bool,
    ) -> Result<Rfc4314Rights, Error> {
        let query_key = request_user.map(EntryKey::user);
        let mut acc = Accumulator::default();

        Self::accumulate(
            &mut acc,
            self.global_acl(owner_is_group),
            query_key.as_ref(),
            groups,
            resource_owner,
            owner_is_group,
        )?;
        if let Some(resource_acl) = resource_acl {
            Self::accumulate(
                &mut acc,
                resource_acl,
                query_key.as_ref(),
                groups,
                resource_owner,
                owner_is_group,
            )?;
        }

        let rights = acc.positive.except(acc.negative);
        trace!(
            "Resolved rights of {:?} on mailbox of {}: {} (denied {})",
            request_user,
            resource_owner,
            rights,
            acc.negative
        );
        Ok(rights)
    }

    /// Determine whether `request_user` holds `right` on a mailbox.
    ///
    /// This is the same as checking the result of `resolve_rights()`, but
    /// stops at the first applicable negative entry denying the right.
    pub fn has_right(
        &self,
        request_user: Option<&str>,
        groups: &dyn GroupMembershipResolver,
        right: Right,
        resource_acl: Option<&MailboxAcl>,
        resource_owner: &str,
        owner_is_group: bool,
    ) -> Result<bool, Error> {
        let query_key = request_user.map(EntryKey::user);
        let mut result = false;

        let acls = std::iter::once(self.global_acl(owner_is_group))
            .chain(resource_acl);
        for acl in acls {
            for (key, rights) in acl.entries() {
                if rights.contains_right(right)
                    && applies(
                        key,
                        query_key.as_ref(),
                        groups,
                        resource_owner,
                        owner_is_group,
                    )?
                {
                    if key.is_negative() {
                        return Ok(false);
                    }
                    result = true;
                }
            }
        }

        Ok(result)
    }

    /// Compute the LISTRIGHTS response for `query_key` on a mailbox owned by
    /// `resource_owner`.
    ///
    /// Only the global ACL is consulted. Each right the global ACL does not
    /// already grant is listed on its own, followed by the set of rights it
    /// does grant as the final element. For a negative `query_key`, the
    /// rights it denies are used in place of those it grants.
    pub fn list_rights(
        &self,
        query_key: &EntryKey,
        groups: &dyn GroupMembershipResolver,
        resource_owner: &str,
        owner_is_group: bool,
    ) -> Result<Vec<Rfc4314Rights>, Error> {
        let mut acc = Accumulator::default();
        Self::accumulate(
            &mut acc,
            self.global_acl(owner_is_group),
            Some(query_key),
            groups,
            resource_owner,
            owner_is_group,
        )?;

        let implicit = if query_key.is_negative() {
            acc.negative
        } else {
            acc.positive.except(acc.negative)
        };

        let mut ret = Rfc4314Rights::all()
            .except(implicit)
            .rights()
            .map(Rfc4314Rights::from)
            .collect::<Vec<_>>();
        ret.push(implicit);
        Ok(ret)
    }
}
