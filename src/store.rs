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

use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::Transaction;

use crate::error::Fallible;
use crate::types::timestamp::Timestamp;
use crate::types::user_exercise::UserExercise;

/// The session-scoped persistent tier of the progress cache: a small local
/// database keyed by (user, exercise). Writes are last-writer-wins at this
/// layer; ordering is enforced by the cache above it.
pub struct SessionStore {
    conn: Mutex<Connection>,
    user_id: String,
}

impl SessionStore {
    pub fn open(path: &Path, user_id: &str) -> Fallible<Self> {
        let mut conn = Connection::open(path)?;
        {
            let tx = conn.transaction()?;
            if !probe_schema_exists(&tx)? {
                tx.execute_batch(include_str!("schema.sql"))?;
                tx.commit()?;
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
            user_id: user_id.to_string(),
        })
    }

    /// Read one progress record.
    pub fn get(&self, exercise: &str) -> Fallible<Option<UserExercise>> {
        let conn = self.acquire();
        let sql = "select exercise, total_done, streak, last_done from user_exercises where user_id = ? and exercise = ?;";
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query((&self.user_id, exercise))?;
        if let Some(row) = rows.next()? {
            let exercise: String = row.get(0)?;
            let total_done: i64 = row.get(1)?;
            let total_done = total_done as u64;
            let streak: u32 = row.get(2)?;
            let last_done: Option<Timestamp> = row.get(3)?;
            Ok(Some(UserExercise {
                exercise,
                total_done,
                streak,
                last_done,
            }))
        } else {
            Ok(None)
        }
    }

    /// Write one progress record, replacing any previous row.
    pub fn put(&self, record: &UserExercise) -> Fallible<()> {
        let conn = self.acquire();
        let sql = "insert into user_exercises (user_id, exercise, total_done, streak, last_done) values (?, ?, ?, ?, ?) on conflict (user_id, exercise) do update set total_done = excluded.total_done, streak = excluded.streak, last_done = excluded.last_done;";
        conn.execute(
            sql,
            (
                &self.user_id,
                &record.exercise,
                record.total_done as i64,
                record.streak,
                &record.last_done,
            ),
        )?;
        Ok(())
    }

    /// Delete one progress record, if present.
    pub fn remove(&self, exercise: &str) -> Fallible<()> {
        let conn = self.acquire();
        let sql = "delete from user_exercises where user_id = ? and exercise = ?;";
        conn.execute(sql, (&self.user_id, exercise))?;
        Ok(())
    }

    fn acquire(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["user_exercises"], |row| row.get(0))?;
    Ok(count > 0)
}
