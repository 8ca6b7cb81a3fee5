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

use serde::Deserialize;
use serde::Serialize;

/// How many leaves a fresh card can earn.
const FULL_CEILING: u32 = 4;

/// Completing a problem always banks at least the participation leaf.
const FLOOR: u32 = 1;

/// One practice-problem presentation unit.
///
/// The identity fields come from the server and never change. The leaf
/// snapshot and the done flag are mutated over the course of a single
/// presentation, so a `clone()` taken when the card enters the recycle
/// queue is a true snapshot: later mutations of the original are not
/// visible through it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// The exercise this problem belongs to.
    exercise: String,
    /// Optional problem-type discriminator within the exercise.
    #[serde(default)]
    problem_type: Option<String>,
    /// Reward state for this presentation.
    #[serde(default = "LeafState::fresh")]
    leaves: LeafState,
    #[serde(default)]
    done: bool,
}

/// Leaves earned so far, and the ceiling still reachable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafState {
    pub earned: u32,
    pub available: u32,
}

impl LeafState {
    fn fresh() -> Self {
        Self {
            earned: 0,
            available: FULL_CEILING,
        }
    }
}

impl Card {
    pub fn new(exercise: impl Into<String>, problem_type: Option<String>) -> Self {
        Self {
            exercise: exercise.into(),
            problem_type,
            leaves: LeafState::fresh(),
            done: false,
        }
    }

    pub fn exercise(&self) -> &str {
        &self.exercise
    }

    pub fn problem_type(&self) -> Option<&str> {
        self.problem_type.as_deref()
    }

    pub fn leaves(&self) -> LeafState {
        self.leaves
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// Burn one bonus leaf. Hints and wrong answers lower the ceiling, but
    /// never below the participation leaf.
    pub fn lower_ceiling(&mut self) {
        if self.leaves.available > FLOOR {
            self.leaves.available -= 1;
        }
    }

    /// Drop the ceiling straight to the floor. Used when every hint has
    /// been revealed.
    pub fn forfeit_bonus(&mut self) {
        self.leaves.available = FLOOR;
    }

    /// Mark the card done and bank the reward: the full remaining ceiling
    /// for a correct answer, the participation leaf otherwise.
    pub fn complete(&mut self, correct: bool) {
        self.done = true;
        self.leaves.earned = if correct { self.leaves.available } else { FLOOR };
    }
}
