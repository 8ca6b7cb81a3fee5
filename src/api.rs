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

use crate::error::Fallible;
use crate::error::fail;
use crate::types::card::Card;
use crate::types::user_exercise::UserExercise;

/// One batch of cards from the curriculum server, with whatever progress
/// records the server bundled alongside them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardBatch {
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub user_exercises: Vec<UserExercise>,
}

/// A completed problem, as reported to the server.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub exercise: String,
    pub correct: bool,
    pub leaves_earned: u32,
}

/// Client for the curriculum server's JSON API.
///
/// This layer does not retry: the queue owns the refill retry policy and
/// the session owns attempt-failure recovery.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the next batch of cards for a topic. `queued` names the
    /// exercises already waiting locally, so the server can avoid
    /// re-suggesting them.
    pub async fn fetch_cards(&self, topic: &str, queued: &[String]) -> Fallible<CardBatch> {
        let url = format!("{}/cards/next", self.base_url);
        let queued = serde_json::to_string(queued)?;
        let response = self
            .http
            .get(&url)
            .query(&[("topic", topic), ("queued", queued.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return fail(&format!(
                "card fetch failed with status {}.",
                response.status()
            ));
        }
        Ok(response.json().await?)
    }

    /// Fetch the fixed review stack.
    pub async fn fetch_review_cards(&self) -> Fallible<CardBatch> {
        let url = format!("{}/cards/review", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return fail(&format!(
                "review fetch failed with status {}.",
                response.status()
            ));
        }
        Ok(response.json().await?)
    }

    /// Report a completed problem. Returns the server-of-record progress
    /// row for the attempted exercise.
    pub async fn submit_attempt(&self, attempt: &Attempt) -> Fallible<UserExercise> {
        let url = format!("{}/attempt", self.base_url);
        let response = self.http.post(&url).json(attempt).send().await?;
        if !response.status().is_success() {
            return fail(&format!(
                "attempt submission failed with status {}.",
                response.status()
            ));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_batch_deserialization() {
        let batch: CardBatch = serde_json::from_str(
            r#"{
                "cards": [{"exercise": "addition_1"}, {"exercise": "addition_2"}],
                "userExercises": [{"exercise": "addition_1", "totalDone": 3}]
            }"#,
        )
        .unwrap();
        assert_eq!(batch.cards.len(), 2);
        assert_eq!(batch.user_exercises.len(), 1);
        assert_eq!(batch.user_exercises[0].total_done, 3);
    }

    #[test]
    fn test_card_batch_fields_are_optional() {
        let batch: CardBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.cards.is_empty());
        assert!(batch.user_exercises.is_empty());
    }

    #[test]
    fn test_attempt_serializes_camel_case() {
        let attempt = Attempt {
            exercise: "addition_1".to_string(),
            correct: true,
            leaves_earned: 3,
        };
        let json = serde_json::to_string(&attempt).unwrap();
        assert!(json.contains("\"leavesEarned\":3"));
    }
}
