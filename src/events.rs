// Copyright 2025 Fernando Borretti
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

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;

/// Out-of-band notifications from the engine to whatever front end is
/// driving it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A card is near the head of the queue; a collaborator can warm
    /// resources ahead of presentation. Emitted once per queue entry.
    UpcomingCard { exercise: String },
    /// Fresh progress data for an exercise landed in the cache.
    UserExerciseUpdated { exercise: String },
    /// The persistent store is unusable; progress lasts only as long as
    /// the process. Emitted at most once, after the first interaction.
    StoreUnavailable,
    /// The practice stack is finished.
    StackEnded { cards_completed: usize },
}

/// Sending half of the notice channel. Cheap to clone; every engine
/// component holds one.
#[derive(Clone)]
pub struct Notices {
    tx: UnboundedSender<Notice>,
}

impl Notices {
    pub fn channel() -> (Notices, UnboundedReceiver<Notice>) {
        let (tx, rx) = unbounded_channel();
        (Notices { tx }, rx)
    }

    /// A closed receiver means no front end is listening, which is fine.
    pub fn send(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let (notices, mut rx) = Notices::channel();
        notices.send(Notice::StoreUnavailable);
        assert!(matches!(rx.try_recv(), Ok(Notice::StoreUnavailable)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_listener_is_silent() {
        let (notices, rx) = Notices::channel();
        drop(rx);
        notices.send(Notice::StoreUnavailable);
    }
}
