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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::acl::model::MailboxAcl;
use crate::acl::resolver::UnionMailboxAclResolver;
use crate::support::error::Error;

/// The system-wide configuration for Quire.
///
/// This is typically stored in a file named `quire.toml` next to the
/// `logging.toml` used by the embedding server.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SystemConfig {
    /// The global ACLs applied to every mailbox before its own ACL.
    #[serde(default)]
    pub acl: AclConfig,

    /// Options for the state kept per selected mailbox.
    #[serde(default)]
    pub session: SessionConfig,
}

impl SystemConfig {
    /// Load the configuration from the TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AclConfig {
    /// The global ACL for mailboxes owned by a single user, as a map from
    /// serialised entry key (`owner`, `-bob`, `$staff`) to serialised rights
    /// (`lrswi`).
    #[serde(default = "default_user_global")]
    pub user_global: BTreeMap<String, String>,
    /// The global ACL for mailboxes owned by a group.
    ///
    /// The default withholds the administer right from the owning group.
    #[serde(default = "default_group_global")]
    pub group_global: BTreeMap<String, String>,
}

impl Default for AclConfig {
    fn default() -> Self {
        AclConfig {
            user_global: default_user_global(),
            group_global: default_group_global(),
        }
    }
}

fn default_user_global() -> BTreeMap<String, String> {
    acl_to_map(&MailboxAcl::owner_full())
}

fn default_group_global() -> BTreeMap<String, String> {
    acl_to_map(&MailboxAcl::owner_full_except_administration())
}

fn acl_to_map(acl: &MailboxAcl) -> BTreeMap<String, String> {
    acl.entries()
        .map(|(key, rights)| (key.to_string(), rights.to_string()))
        .collect()
}

impl AclConfig {
    /// Parse the configured global ACLs and build a resolver from them.
    pub fn resolver(&self) -> Result<UnionMailboxAclResolver, Error> {
        let user_global = MailboxAcl::from_serialized(
            self.user_global.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?;
        let group_global = MailboxAcl::from_serialized(
            self.group_global.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )?;
        Ok(UnionMailboxAclResolver::new(user_global, group_global))
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// If true, flag changes made by a session are not reported back to
    /// that same session as unsolicited FETCH responses once it has selected
    /// a mailbox.
    #[serde(default = "default_true")]
    pub silence_own_flag_changes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            silence_own_flag_changes: true,
        }
    }
}

fn default_true() -> bool {
    true
}
