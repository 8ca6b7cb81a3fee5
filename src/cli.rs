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
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::api::ApiClient;
use crate::cache::UserExerciseCache;
use crate::config::Config;
use crate::error::Fallible;
use crate::error::fail;
use crate::events::Notice;
use crate::events::Notices;
use crate::session::Mode;
use crate::session::PracticeSession;
use crate::session::SessionState;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Practice a topic with an endless card queue.
    Practice {
        /// The topic to practice.
        topic: String,
        /// Override the configured server URL.
        #[arg(long)]
        server: Option<String>,
    },
    /// Work through previously-missed problems.
    Review {
        /// Override the configured server URL.
        #[arg(long)]
        server: Option<String>,
    },
    /// Replay a topic's stack as a fixed card set, without refills.
    Replay {
        /// The topic to replay.
        topic: String,
        /// Override the configured server URL.
        #[arg(long)]
        server: Option<String>,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    let mut config = Config::load(Path::new("drillstack.toml"))?;
    match cli {
        Command::Practice { topic, server } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            run_session(config, Mode::Practice, &topic).await
        }
        Command::Review { server } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            run_session(config, Mode::Review, "").await
        }
        Command::Replay { topic, server } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            run_session(config, Mode::Replay, &topic).await
        }
    }
}

async fn run_session(config: Config, mode: Mode, topic: &str) -> Fallible<()> {
    let api = Arc::new(ApiClient::new(config.server_url.clone()));
    let (notices, mut notice_rx) = Notices::channel();
    let cache = match &config.user_id {
        Some(user_id) => Arc::new(UserExerciseCache::open(
            &config.db_path(),
            user_id,
            notices.clone(),
        )),
        None => {
            log::debug!("no user id configured, progress will not persist");
            Arc::new(UserExerciseCache::memory_only(notices.clone()))
        }
    };

    let batch = match mode {
        Mode::Practice | Mode::Replay => api.fetch_cards(topic, &[]).await?,
        Mode::Review => api.fetch_review_cards().await?,
    };
    if batch.cards.is_empty() {
        return fail("the server returned no cards for this session.");
    }
    for record in batch.user_exercises {
        cache.cache_locally(Some(record));
    }

    let mut session = PracticeSession::new(
        mode,
        topic,
        batch.cards,
        config.stack_size,
        api,
        cache,
        notices,
    );
    drive(&mut session, &mut notice_rx)
}

/// The interactive front end: prints the current card, reads a choice,
/// dispatches the matching session event. The engine neither knows nor
/// cares that its collaborator is a terminal.
fn drive(
    session: &mut PracticeSession,
    notice_rx: &mut UnboundedReceiver<Notice>,
) -> Fallible<()> {
    loop {
        drain_notices(notice_rx);
        match session.state() {
            SessionState::StackEnded => {
                drain_notices(notice_rx);
                return Ok(());
            }
            SessionState::CardTransitioning => {
                session.goto_next_problem();
                continue;
            }
            SessionState::NoCardShown => {
                session.begin();
                continue;
            }
            SessionState::CardCurrent => {}
        }
        let Some(card) = session.current_card() else {
            return fail("no current card in an active session.");
        };
        println!();
        println!(
            "[{}/{}] Exercise: {}",
            session.cards_completed() + 1,
            session.stack_size(),
            card.exercise()
        );
        println!(
            "Leaves available: {} (1 = Right, 2 = Wrong, 3 = Hint, 4 = All hints, 5 = Give up, q = Quit)",
            card.leaves().available
        );
        match read_choice()?.as_str() {
            "1" => {
                session.check_answer(true);
                session.problem_done(true);
            }
            "2" => {
                session.check_answer(false);
            }
            "3" => {
                session.hint_used();
            }
            "4" => {
                session.all_hints_used();
            }
            "5" => {
                session.problem_done(false);
            }
            "q" => {
                return Ok(());
            }
            _ => {
                println!("Invalid input.");
            }
        }
    }
}

fn drain_notices(rx: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        match notice {
            Notice::UpcomingCard { exercise } => {
                log::debug!("warming resources for upcoming {exercise}");
            }
            Notice::UserExerciseUpdated { exercise } => {
                log::debug!("progress updated for {exercise}");
            }
            Notice::StoreUnavailable => {
                eprintln!(
                    "Warning: progress cannot be saved on this machine and will last only for this session."
                );
            }
            Notice::StackEnded { cards_completed } => {
                println!();
                println!("Stack complete! You finished {cards_completed} cards.");
            }
        }
    }
}

fn read_choice() -> Fallible<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
