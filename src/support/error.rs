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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported right: {0:?}")]
    UnsupportedRight(char),
    #[error("Malformed ACL entry key: {0:?}")]
    BadAclKey(String),
    #[error("ACL key {0} matches no known identifier kind")]
    UnexpectedAclKey(String),
    #[error("ACL command is missing its key, edit mode, or rights")]
    IncompleteAclCommand,
    #[error("Non-existent flag")]
    NxFlag,
    #[error("Unsafe flag or identifier name")]
    UnsafeName,
    #[error("Event bus registration failed: {0}")]
    EventBus(String),
    #[error("Mailbox backend failure: {0}")]
    MailboxBackend(String),
    #[error("Logging initialisation failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
