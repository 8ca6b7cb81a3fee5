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

use crate::types::timestamp::Timestamp;

/// Per-exercise progress for one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExercise {
    /// The exercise this record describes.
    pub exercise: String,
    /// How many problems the user has completed in this exercise, ever.
    pub total_done: u64,
    /// Consecutive correct answers.
    #[serde(default)]
    pub streak: u32,
    /// When the user last completed a problem here.
    #[serde(default)]
    pub last_done: Option<Timestamp>,
}

impl UserExercise {
    /// Whether this record may replace `other` in a cache. Completion
    /// counts only move forward, so a record carrying a lower count is a
    /// stale response that arrived out of order.
    pub fn supersedes(&self, other: &UserExercise) -> bool {
        self.total_done >= other.total_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total_done: u64) -> UserExercise {
        UserExercise {
            exercise: "addition_1".to_string(),
            total_done,
            streak: 0,
            last_done: None,
        }
    }

    #[test]
    fn test_supersedes_is_monotonic() {
        assert!(record(5).supersedes(&record(3)));
        assert!(record(5).supersedes(&record(5)));
        assert!(!record(3).supersedes(&record(5)));
    }

    #[test]
    fn test_deserialize_camel_case() {
        let record: UserExercise = serde_json::from_str(
            r#"{"exercise": "addition_1", "totalDone": 12, "streak": 4, "lastDone": "2025-11-02T10:30:00+00:00"}"#,
        )
        .unwrap();
        assert_eq!(record.total_done, 12);
        assert_eq!(record.streak, 4);
        assert!(record.last_done.is_some());
    }

    #[test]
    fn test_deserialize_minimal() {
        let record: UserExercise =
            serde_json::from_str(r#"{"exercise": "addition_1", "totalDone": 0}"#).unwrap();
        assert_eq!(record.streak, 0);
        assert_eq!(record.last_done, None);
    }
}
