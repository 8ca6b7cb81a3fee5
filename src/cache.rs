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

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::events::Notice;
use crate::events::Notices;
use crate::store::SessionStore;
use crate::types::user_exercise::UserExercise;

/// Two-tier cache of per-exercise progress: an in-memory map that is
/// authoritative for the process, over an optional persistent tier that
/// survives restarts.
///
/// Rendering code reads progress synchronously through `get`; network
/// responses land through `cache_locally`, which refuses to replace a
/// record with one carrying a lower completion count. That guard is what
/// keeps a slow, stale response from clobbering state written by a faster
/// request issued after it.
pub struct UserExerciseCache {
    records: Mutex<HashMap<String, UserExercise>>,
    store: Option<SessionStore>,
    advisory_pending: Mutex<bool>,
    notices: Notices,
}

impl UserExerciseCache {
    /// Open the cache, probing the persistent tier. A probe failure is not
    /// an error: the cache degrades to memory-only for the life of the
    /// process and arms a one-time advisory, surfaced after the first
    /// interaction rather than immediately.
    pub fn open(db_path: &Path, user_id: &str, notices: Notices) -> Self {
        match SessionStore::open(db_path, user_id) {
            Ok(store) => Self {
                records: Mutex::new(HashMap::new()),
                store: Some(store),
                advisory_pending: Mutex::new(false),
                notices,
            },
            Err(e) => {
                log::warn!("session store unavailable, caching in memory only: {e}");
                Self {
                    records: Mutex::new(HashMap::new()),
                    store: None,
                    advisory_pending: Mutex::new(true),
                    notices,
                }
            }
        }
    }

    /// A cache with no persistent tier and no advisory. Used for phantom
    /// users, whose progress is session-only by definition.
    pub fn memory_only(notices: Notices) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            store: None,
            advisory_pending: Mutex::new(false),
            notices,
        }
    }

    /// Absorb a progress record. No-op on `None`.
    ///
    /// An exercise with no in-memory entry is first hydrated lazily from
    /// the persistent tier, so the monotonicity check always runs against
    /// the freshest record known anywhere locally.
    pub fn cache_locally(&self, record: Option<UserExercise>) {
        let Some(record) = record else {
            return;
        };
        let mut records = self.records.lock().unwrap();
        if !records.contains_key(&record.exercise) {
            if let Some(store) = &self.store {
                match store.get(&record.exercise) {
                    Ok(Some(stored)) => {
                        records.insert(record.exercise.clone(), stored);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!(
                            "reading {} from the session store failed: {e}",
                            record.exercise
                        )
                    }
                }
            }
        }
        let replace = match records.get(&record.exercise) {
            Some(cached) => record.supersedes(cached),
            None => true,
        };
        if !replace {
            log::debug!(
                "discarding stale progress for {} (arrived out of order)",
                record.exercise
            );
            return;
        }
        if let Some(store) = &self.store {
            // A write failure leaves the memory tier authoritative.
            if let Err(e) = store.put(&record) {
                log::warn!("persisting progress for {} failed: {e}", record.exercise);
            }
        }
        let exercise = record.exercise.clone();
        records.insert(exercise.clone(), record);
        drop(records);
        self.notices.send(Notice::UserExerciseUpdated { exercise });
    }

    /// Drop both tiers' entries for an exercise, forcing the next load to
    /// re-fetch from the server of record. Used when an attempt submission
    /// fails and the local state can no longer be trusted.
    pub fn clear_cache(&self, exercise: &str) {
        self.records.lock().unwrap().remove(exercise);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(exercise) {
                log::warn!("clearing {exercise} from the session store failed: {e}");
            }
        }
    }

    /// Synchronous read from the memory tier.
    pub fn get(&self, exercise: &str) -> Option<UserExercise> {
        self.records.lock().unwrap().get(exercise).cloned()
    }

    /// Called on user interaction. The first call surfaces the deferred
    /// store advisory, if one is armed.
    pub fn note_interaction(&self) {
        let mut pending = self.advisory_pending.lock().unwrap();
        if *pending {
            *pending = false;
            self.notices.send(Notice::StoreUnavailable);
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    fn record(exercise: &str, total_done: u64) -> UserExercise {
        UserExercise {
            exercise: exercise.to_string(),
            total_done,
            streak: 0,
            last_done: None,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    #[test]
    fn test_never_downgrades_a_record() {
        let (notices, _rx) = Notices::channel();
        let cache = UserExerciseCache::memory_only(notices);
        cache.cache_locally(Some(record("addition_1", 5)));
        cache.cache_locally(Some(record("addition_1", 3)));
        assert_eq!(cache.get("addition_1").unwrap().total_done, 5);
    }

    #[test]
    fn test_equal_counter_replaces() {
        let (notices, _rx) = Notices::channel();
        let cache = UserExerciseCache::memory_only(notices);
        cache.cache_locally(Some(record("addition_1", 5)));
        let mut fresher = record("addition_1", 5);
        fresher.streak = 9;
        cache.cache_locally(Some(fresher));
        assert_eq!(cache.get("addition_1").unwrap().streak, 9);
    }

    #[test]
    fn test_none_is_a_noop() {
        let (notices, mut rx) = Notices::channel();
        let cache = UserExerciseCache::memory_only(notices);
        cache.cache_locally(None);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_update_notice() {
        let (notices, mut rx) = Notices::channel();
        let cache = UserExerciseCache::memory_only(notices);
        cache.cache_locally(Some(record("addition_1", 5)));
        cache.cache_locally(Some(record("addition_1", 3)));
        let notices = drain(&mut rx);
        // The stale record must not produce a second notice.
        assert_eq!(
            notices,
            vec![Notice::UserExerciseUpdated {
                exercise: "addition_1".to_string()
            }]
        );
    }

    #[test]
    fn test_hydrates_from_the_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.db");
        {
            let (notices, _rx) = Notices::channel();
            let cache = UserExerciseCache::open(&path, "user-1", notices);
            cache.cache_locally(Some(record("addition_1", 5)));
        }
        // A new process: empty memory tier, same store.
        let (notices, _rx) = Notices::channel();
        let cache = UserExerciseCache::open(&path, "user-1", notices);
        cache.cache_locally(Some(record("addition_1", 2)));
        assert_eq!(cache.get("addition_1").unwrap().total_done, 5);
    }

    #[test]
    fn test_clear_cache_clears_both_tiers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.db");
        {
            let (notices, _rx) = Notices::channel();
            let cache = UserExerciseCache::open(&path, "user-1", notices);
            cache.cache_locally(Some(record("addition_1", 5)));
            cache.clear_cache("addition_1");
            assert_eq!(cache.get("addition_1"), None);
        }
        // After a clear, a lower counter wins: nothing is left to hydrate.
        let (notices, _rx) = Notices::channel();
        let cache = UserExerciseCache::open(&path, "user-1", notices);
        cache.cache_locally(Some(record("addition_1", 1)));
        assert_eq!(cache.get("addition_1").unwrap().total_done, 1);
    }

    #[test]
    fn test_degraded_store_advisory_fires_once() {
        let (notices, mut rx) = Notices::channel();
        let cache = UserExerciseCache::open(Path::new("./derpherp/progress.db"), "user-1", notices);
        // Deferred: nothing until the first interaction.
        assert!(drain(&mut rx).is_empty());
        cache.note_interaction();
        assert_eq!(drain(&mut rx), vec![Notice::StoreUnavailable]);
        cache.note_interaction();
        assert!(drain(&mut rx).is_empty());
        // The cache still works, memory-only.
        cache.cache_locally(Some(record("addition_1", 5)));
        assert_eq!(cache.get("addition_1").unwrap().total_done, 5);
    }

    #[test]
    fn test_phantom_user_has_no_advisory() {
        let (notices, mut rx) = Notices::channel();
        let cache = UserExerciseCache::memory_only(notices);
        cache.note_interaction();
        assert!(drain(&mut rx).is_empty());
    }
}
