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

//! Logging bootstrap for servers embedding Quire.
//!
//! All other modules only use the `log` facade.

use std::path::Path;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::file::Deserializers;

use crate::support::error::Error;

/// Initialise logging from a log4rs TOML file, such as `logging.toml`.
pub fn init_file(path: impl AsRef<Path>) -> Result<(), Error> {
    log4rs::init_file(path, Deserializers::new())
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Initialise logging to standard error at the given level.
///
/// This is used when no logging configuration file exists.
pub fn init_console(level: LevelFilter) -> Result<(), Error> {
    log4rs::init_config(console_config(level)?)
        .map(|_| ())
        .map_err(|e| Error::Logging(e.to_string()))
}

fn console_config(level: LevelFilter) -> Result<Config, Error> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} [{l}][{t}] {m}{n}",
        )))
        .build();

    Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| Error::Logging(e.to_string()))
}
