// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::trace;

/// A connection task's view of the broker-wide stop signal.
///
/// The signal is latched: once observed, `wait` returns immediately on every later call,
/// so a connection loop can select on it each iteration.
#[derive(Debug)]
pub struct Shutdown {
    signalled: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Subscribes to `notify_shutdown`. Only signals sent after this call are seen.
    pub fn listen(notify_shutdown: &broadcast::Sender<()>) -> Shutdown {
        Shutdown {
            signalled: false,
            notify: notify_shutdown.subscribe(),
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled
    }

    /// Resolves once the broker asks connections to stop.
    ///
    /// A dropped sender and a lagged receiver both count as the stop signal.
    pub async fn wait(&mut self) {
        if self.signalled {
            return;
        }
        match self.notify.recv().await {
            Ok(()) => trace!("shutdown signal received"),
            Err(RecvError::Closed) => trace!("shutdown sender dropped"),
            Err(RecvError::Lagged(missed)) => trace!("shutdown receiver lagged by {}", missed),
        }
        self.signalled = true;
    }
}
