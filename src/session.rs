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

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;

use crate::api::ApiClient;
use crate::api::Attempt;
use crate::cache::UserExerciseCache;
use crate::error::Fallible;
use crate::events::Notice;
use crate::events::Notices;
use crate::queue::BottomlessQueue;
use crate::types::card::Card;
use crate::types::user_exercise::UserExercise;

/// How a session sources its cards.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// Endless topic practice; the queue refills from the server.
    Practice,
    /// Previously-missed problems; fixed card set.
    Review,
    /// Replay of an earlier session; fixed card set.
    Replay,
}

impl Mode {
    /// Review and replay know their full card set up front, so the queue
    /// must never be server-augmented.
    pub fn read_only(self) -> bool {
        matches!(self, Mode::Review | Mode::Replay)
    }
}

/// Where a session is in its lifecycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionState {
    /// Nothing presented yet.
    NoCardShown,
    /// A card is in front of the user.
    CardCurrent,
    /// The card was completed; transition animations are the front end's
    /// business, the engine just waits for the advance event.
    CardTransitioning,
    /// Terminal.
    StackEnded,
}

/// The practice session orchestrator.
///
/// A front end dispatches the user-originated events (`check_answer`,
/// `hint_used`, `problem_done`, ...) and this type owns the resulting
/// state transitions. Events dispatched in the wrong state are logged and
/// ignored; a misbehaving front end cannot corrupt the stack.
pub struct PracticeSession {
    mode: Mode,
    state: SessionState,
    stack_size: usize,
    queue: BottomlessQueue,
    cache: Arc<UserExerciseCache>,
    api: Arc<ApiClient>,
    notices: Notices,
    incomplete: VecDeque<Card>,
    complete: Vec<Card>,
    current: Option<Card>,
    attempt_tx: UnboundedSender<(String, Fallible<UserExercise>)>,
    attempt_rx: UnboundedReceiver<(String, Fallible<UserExercise>)>,
}

impl PracticeSession {
    /// In practice mode the initial cards seed the bottomless queue and
    /// the stack ends after `stack_size` completions. In read-only modes
    /// they form the whole stack, which ends by exhaustion.
    pub fn new(
        mode: Mode,
        topic: &str,
        initial_cards: Vec<Card>,
        stack_size: usize,
        api: Arc<ApiClient>,
        cache: Arc<UserExerciseCache>,
        notices: Notices,
    ) -> Self {
        let stack_size = if mode.read_only() {
            initial_cards.len()
        } else {
            stack_size
        };
        let mut queue = BottomlessQueue::new(
            topic,
            api.clone(),
            cache.clone(),
            notices.clone(),
            !mode.read_only(),
        );
        let mut incomplete = VecDeque::new();
        if mode.read_only() {
            incomplete.extend(initial_cards);
        } else {
            queue.seed(initial_cards);
        }
        let (attempt_tx, attempt_rx) = unbounded_channel();
        Self {
            mode,
            state: SessionState::NoCardShown,
            stack_size,
            queue,
            cache,
            api,
            notices,
            incomplete,
            complete: Vec::new(),
            current: None,
            attempt_tx,
            attempt_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn current_card(&self) -> Option<&Card> {
        self.current.as_ref()
    }

    pub fn cards_completed(&self) -> usize {
        self.complete.len()
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Present the first card.
    pub fn begin(&mut self) {
        if self.state != SessionState::NoCardShown {
            log::warn!("begin dispatched in state {:?}, ignoring", self.state);
            return;
        }
        match self.next_card() {
            Some(card) => {
                self.current = Some(card);
                self.state = SessionState::CardCurrent;
            }
            None => self.end_stack(),
        }
    }

    /// The user checked an answer. A wrong answer burns a bonus leaf.
    pub fn check_answer(&mut self, correct: bool) {
        self.cache.note_interaction();
        if self.state != SessionState::CardCurrent {
            log::warn!("check_answer dispatched in state {:?}, ignoring", self.state);
            return;
        }
        if correct {
            return;
        }
        if let Some(card) = &mut self.current {
            card.lower_ceiling();
            log::debug!(
                "wrong answer on {}: ceiling now {}",
                card.exercise(),
                card.leaves().available
            );
        }
    }

    /// The user took a hint.
    pub fn hint_used(&mut self) {
        self.cache.note_interaction();
        if self.state != SessionState::CardCurrent {
            log::warn!("hint_used dispatched in state {:?}, ignoring", self.state);
            return;
        }
        if let Some(card) = &mut self.current {
            card.lower_ceiling();
            log::debug!(
                "hint on {}: ceiling now {}",
                card.exercise(),
                card.leaves().available
            );
        }
    }

    /// The user revealed every hint; only the participation leaf is left.
    pub fn all_hints_used(&mut self) {
        self.cache.note_interaction();
        if self.state != SessionState::CardCurrent {
            log::warn!(
                "all_hints_used dispatched in state {:?}, ignoring",
                self.state
            );
            return;
        }
        if let Some(card) = &mut self.current {
            card.forfeit_bonus();
        }
    }

    /// The user finished the problem. Banks the reward, reports the
    /// attempt to the server in the background, and waits for the front
    /// end to advance.
    pub fn problem_done(&mut self, correct: bool) {
        self.cache.note_interaction();
        if self.state != SessionState::CardCurrent {
            log::warn!("problem_done dispatched in state {:?}, ignoring", self.state);
            return;
        }
        let Some(mut card) = self.current.take() else {
            log::warn!("problem_done with no current card, ignoring");
            return;
        };
        card.complete(correct);
        self.submit_attempt(&card, correct);
        self.complete.push(card);
        self.state = SessionState::CardTransitioning;
    }

    /// Advance to the next card, or end the stack.
    pub fn goto_next_problem(&mut self) {
        if self.state != SessionState::CardTransitioning {
            log::warn!(
                "goto_next_problem dispatched in state {:?}, ignoring",
                self.state
            );
            return;
        }
        self.absorb_attempt_results();
        if self.complete.len() >= self.stack_size {
            self.end_stack();
            return;
        }
        match self.next_card() {
            Some(card) => {
                self.current = Some(card);
                self.state = SessionState::CardCurrent;
            }
            None => self.end_stack(),
        }
    }

    /// Pull from the local incomplete stack first; past that, read-only
    /// stacks are exhausted and practice delegates to the queue.
    fn next_card(&mut self) -> Option<Card> {
        if let Some(card) = self.incomplete.pop_front() {
            return Some(card);
        }
        if self.mode.read_only() {
            return None;
        }
        Some(self.queue.next())
    }

    fn submit_attempt(&mut self, card: &Card, correct: bool) {
        let attempt = Attempt {
            exercise: card.exercise().to_string(),
            correct,
            leaves_earned: card.leaves().earned,
        };
        let api = self.api.clone();
        let tx = self.attempt_tx.clone();
        tokio::spawn(async move {
            let exercise = attempt.exercise.clone();
            let result = api.submit_attempt(&attempt).await;
            let _ = tx.send((exercise, result));
        });
    }

    /// Drain completed attempt submissions. Responses are filtered by
    /// exercise identity rather than cancelled: the user has usually moved
    /// on by the time one lands, and the cache's counter guard makes stale
    /// rows harmless.
    fn absorb_attempt_results(&mut self) {
        while let Ok((exercise, result)) = self.attempt_rx.try_recv() {
            match result {
                Ok(record) => {
                    if record.exercise != exercise {
                        log::warn!(
                            "attempt response for {exercise} carried a record for {}, dropping",
                            record.exercise
                        );
                        continue;
                    }
                    self.cache.cache_locally(Some(record));
                }
                Err(e) => {
                    log::error!("attempt submission for {exercise} failed: {e}");
                    // Local progress may be poisoned; force a re-fetch from
                    // the server of record.
                    self.cache.clear_cache(&exercise);
                }
            }
        }
    }

    fn end_stack(&mut self) {
        self.state = SessionState::StackEnded;
        self.absorb_attempt_results();
        // Invalidate the completed stack's progress so the next session
        // starts from the server of record.
        let mut cleared: HashSet<&str> = HashSet::new();
        for card in &self.complete {
            if cleared.insert(card.exercise()) {
                self.cache.clear_cache(card.exercise());
            }
        }
        log::debug!("stack ended after {} cards", self.complete.len());
        self.notices.send(Notice::StackEnded {
            cards_completed: self.complete.len(),
        });
    }
}
