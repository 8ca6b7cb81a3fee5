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

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;

use crate::api::ApiClient;
use crate::api::CardBatch;
use crate::cache::UserExerciseCache;
use crate::error::Fallible;
use crate::events::Notice;
use crate::events::Notices;
use crate::types::card::Card;

/// Previously-shown cards kept for reuse when the network lags.
const RECYCLE_CAP: usize = 5;

/// Request more cards when the current queue drops below this.
const REFILL_THRESHOLD: usize = 2;

/// How many queue heads get an upcoming notice.
const UPCOMING_COUNT: usize = 2;

struct QueueEntry {
    card: Card,
    upcoming_sent: bool,
}

/// An endless supply of practice cards.
///
/// `next` never blocks: refills are fired off as background tasks and
/// absorbed on a later call, and while the network lags the queue rotates
/// through a bounded tail of recently-shown cards. The only way to run the
/// queue dry is to pull from one that was never seeded, which is a bug in
/// the caller.
pub struct BottomlessQueue {
    topic: String,
    current: VecDeque<QueueEntry>,
    recycle: VecDeque<Card>,
    refill_enabled: bool,
    refill_in_flight: bool,
    refill_tx: UnboundedSender<Fallible<CardBatch>>,
    refill_rx: UnboundedReceiver<Fallible<CardBatch>>,
    api: Arc<ApiClient>,
    cache: Arc<UserExerciseCache>,
    notices: Notices,
}

impl BottomlessQueue {
    /// `refill_enabled` is false in review and replay modes, where the
    /// full card set is known up front and must not be server-augmented.
    pub fn new(
        topic: &str,
        api: Arc<ApiClient>,
        cache: Arc<UserExerciseCache>,
        notices: Notices,
        refill_enabled: bool,
    ) -> Self {
        let (refill_tx, refill_rx) = unbounded_channel();
        Self {
            topic: topic.to_string(),
            current: VecDeque::new(),
            recycle: VecDeque::new(),
            refill_enabled,
            refill_in_flight: false,
            refill_tx,
            refill_rx,
            api,
            cache,
            notices,
        }
    }

    /// Seed the current queue from the session-start payload.
    pub fn seed(&mut self, cards: Vec<Card>) {
        for card in cards {
            self.current.push_back(QueueEntry {
                card,
                upcoming_sent: false,
            });
        }
        self.notify_upcoming();
    }

    /// Append one card to the current queue.
    pub fn enqueue(&mut self, card: Card) {
        self.current.push_back(QueueEntry {
            card,
            upcoming_sent: false,
        });
        self.notify_upcoming();
    }

    /// Number of cards waiting in the current queue.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// True when both the current and recycle queues are empty, i.e. the
    /// next `next` call would panic.
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.recycle.is_empty()
    }

    /// Pop the next card. Never blocks.
    ///
    /// Panics if both queues are empty. Callers must seed the queue before
    /// pulling from it; this is a logic-error guard, not a runtime state.
    pub fn next(&mut self) -> Card {
        self.absorb_refills();
        if self.current.is_empty() {
            if self.recycle.is_empty() {
                panic!("card queue exhausted: no current or recycled cards");
            }
            // Restart the rotation through previously-seen cards.
            log::debug!(
                "current queue empty, reusing {} recycled cards",
                self.recycle.len()
            );
            for card in self.recycle.drain(..) {
                self.current.push_back(QueueEntry {
                    card,
                    upcoming_sent: false,
                });
            }
        }
        let Some(entry) = self.current.pop_front() else {
            unreachable!()
        };
        // Snapshot the card as it looked before this presentation, so the
        // recycled copy never carries mutations the caller makes next.
        self.recycle.push_back(entry.card.clone());
        if self.recycle.len() > RECYCLE_CAP {
            self.recycle.pop_front();
        }
        self.maybe_refill();
        self.notify_upcoming();
        entry.card
    }

    /// Drain completed refill responses. Successful batches extend the
    /// queue and seed the progress cache; failures are logged and dropped,
    /// which clears the in-flight flag and lets a later pull retry.
    fn absorb_refills(&mut self) {
        while let Ok(result) = self.refill_rx.try_recv() {
            self.refill_in_flight = false;
            match result {
                Ok(batch) => {
                    log::debug!("refill delivered {} cards", batch.cards.len());
                    for record in batch.user_exercises {
                        self.cache.cache_locally(Some(record));
                    }
                    for card in batch.cards {
                        self.enqueue(card);
                    }
                }
                Err(e) => {
                    log::warn!("card refill failed: {e}");
                }
            }
        }
    }

    fn maybe_refill(&mut self) {
        if !self.refill_enabled || self.refill_in_flight {
            return;
        }
        if self.current.len() >= REFILL_THRESHOLD {
            return;
        }
        self.refill_in_flight = true;
        let api = self.api.clone();
        let topic = self.topic.clone();
        let queued = self.queued_exercises();
        let tx = self.refill_tx.clone();
        log::debug!("requesting refill for {topic} ({} cards queued)", queued.len());
        tokio::spawn(async move {
            let result = api.fetch_cards(&topic, &queued).await;
            // The queue may be gone by the time the response lands.
            let _ = tx.send(result);
        });
    }

    /// Names of the exercises currently queued, sent along with a refill
    /// so the server avoids re-suggesting them.
    fn queued_exercises(&self) -> Vec<String> {
        self.current
            .iter()
            .map(|entry| entry.card.exercise().to_string())
            .collect()
    }

    /// Emit a preload notice for each of the first few queue entries,
    /// once per entry.
    fn notify_upcoming(&mut self) {
        for entry in self.current.iter_mut().take(UPCOMING_COUNT) {
            if !entry.upcoming_sent {
                entry.upcoming_sent = true;
                self.notices.send(Notice::UpcomingCard {
                    exercise: entry.card.exercise().to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn test_queue(refill_enabled: bool) -> (BottomlessQueue, UnboundedReceiver<Notice>) {
        let (notices, rx) = Notices::channel();
        let api = Arc::new(ApiClient::new("http://127.0.0.1:1"));
        let cache = Arc::new(UserExerciseCache::memory_only(notices.clone()));
        let queue = BottomlessQueue::new("addition", api, cache, notices, refill_enabled);
        (queue, rx)
    }

    fn card(exercise: &str) -> Card {
        Card::new(exercise, None)
    }

    fn upcoming(rx: &mut UnboundedReceiver<Notice>) -> Vec<String> {
        let mut exercises = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            if let Notice::UpcomingCard { exercise } = notice {
                exercises.push(exercise);
            }
        }
        exercises
    }

    #[tokio::test]
    async fn test_wraps_around_to_recycled_cards() {
        let (mut queue, _rx) = test_queue(false);
        queue.seed(vec![card("a"), card("b"), card("c")]);
        assert_eq!(queue.next().exercise(), "a");
        assert_eq!(queue.next().exercise(), "b");
        assert_eq!(queue.next().exercise(), "c");
        // The fourth pull restarts the rotation with the first card.
        assert_eq!(queue.next().exercise(), "a");
        assert_eq!(queue.next().exercise(), "b");
    }

    #[tokio::test]
    async fn test_recycle_queue_is_bounded() {
        let (mut queue, _rx) = test_queue(false);
        let cards = (0..8).map(|i| card(&format!("ex_{i}"))).collect();
        queue.seed(cards);
        for i in 0..20 {
            queue.next();
            assert!(queue.recycle.len() <= RECYCLE_CAP, "overflow at pull {i}");
        }
    }

    #[tokio::test]
    async fn test_oldest_recycled_card_is_evicted() {
        let (mut queue, _rx) = test_queue(false);
        let cards = (0..8).map(|i| card(&format!("ex_{i}"))).collect();
        queue.seed(cards);
        for _ in 0..8 {
            queue.next();
        }
        // Cards 0-2 fell off the recycle queue; the rotation restarts at 3.
        assert_eq!(queue.next().exercise(), "ex_3");
    }

    #[tokio::test]
    async fn test_recycled_card_ignores_later_mutations() {
        let (mut queue, _rx) = test_queue(false);
        queue.seed(vec![card("a")]);
        let mut first = queue.next();
        first.lower_ceiling();
        first.complete(false);
        let again = queue.next();
        assert!(!again.done());
        assert_eq!(again.leaves().available, 4);
        assert_eq!(again.leaves().earned, 0);
    }

    #[tokio::test]
    #[should_panic(expected = "card queue exhausted")]
    async fn test_next_on_empty_queue_panics() {
        let (mut queue, _rx) = test_queue(false);
        queue.next();
    }

    #[tokio::test]
    async fn test_upcoming_notices_fire_once_per_entry() {
        let (mut queue, mut rx) = test_queue(false);
        queue.seed(vec![card("a"), card("b"), card("c")]);
        assert_eq!(upcoming(&mut rx), vec!["a", "b"]);
        // Popping "a" moves "c" into the window.
        queue.next();
        assert_eq!(upcoming(&mut rx), vec!["c"]);
        // Popping the rest announces nothing new.
        queue.next();
        queue.next();
        assert!(upcoming(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_announces_the_head() {
        let (mut queue, mut rx) = test_queue(false);
        queue.enqueue(card("a"));
        queue.enqueue(card("b"));
        queue.enqueue(card("c"));
        assert_eq!(upcoming(&mut rx), vec!["a", "b"]);
    }
}
