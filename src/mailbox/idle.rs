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

//! Support for idling, i.e., blocking until the idle is cancelled or a change
//! is discovered. This is used for the IDLE extension, but the functionality
//! here does not alone implement it.
//!
//! An `IdleListener` owns a one-slot channel. Its `IdleNotifier`s may be
//! registered with a `SelectedMailbox`, which forwards every event it receives
//! to them. Notifications coalesce: any number of wakeups before the listener
//! starts waiting result in a single wakeup.
//!
//! To avoid races, idling needs to run by the below procedure:
//!
//! ```ignore
//! while idling {
//!   let listener = IdleListener::prepare();
//!   selected.register_idle(Arc::new(listener.notifier()));
//!   send_poll_results(selected);
//!   listener.idle();
//! }
//! ```

use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use super::event::{EventListener, MailboxEvent};

/// A handle which can be used to idle until a change notification is
/// received.
#[derive(Debug)]
pub struct IdleListener {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl IdleListener {
    pub fn prepare() -> Self {
        let (tx, rx) = channel::bounded(1);
        IdleListener { tx, rx }
    }

    /// Return an `IdleNotifier` that can be used to awaken this listener.
    pub fn notifier(&self) -> IdleNotifier {
        IdleNotifier {
            tx: self.tx.clone(),
        }
    }

    /// Block until a notification is received for this listener.
    pub fn idle(self) {
        // The listener holds a sender itself, so the channel cannot become
        // disconnected while we wait.
        let _ = self.rx.recv();
    }

    /// Block until a notification is received or `timeout` elapses.
    ///
    /// Returns whether a notification was received.
    pub fn idle_timeout(self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

/// Wakes a single `IdleListener`.
#[derive(Debug, Clone)]
pub struct IdleNotifier {
    tx: Sender<()>,
}

impl IdleNotifier {
    pub fn notify(&self) {
        // Full means a wakeup is already pending; disconnected means the
        // listener is gone. Either way there is nothing to do.
        let _ = self.tx.try_send(());
    }
}

impl EventListener for IdleNotifier {
    fn event(&self, _: &MailboxEvent) {
        self.notify();
    }
}
