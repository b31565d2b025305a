use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use undercover::content::BuiltinContent;
use undercover::protocol::EventKind;
use undercover::replication::{join_room, send_event, spawn_host_loop, HostReplicator};
use undercover::session::SessionContext;
use undercover::state::GameAction;
use undercover::store::MemoryStore;
use undercover::types::*;

/// Wait until the replicated snapshot satisfies a predicate.
async fn wait_for(
    rx: &mut watch::Receiver<GameState>,
    mut pred: impl FnMut(&GameState) -> bool,
) -> GameState {
    loop {
        {
            let state = rx.borrow();
            if pred(&state) {
                return state.clone();
            }
        }
        if rx.changed().await.is_err() {
            panic!("host loop ended before the expected state arrived");
        }
    }
}

/// Scripted single-room match: one host and two simulated remote players run
/// a full round against the in-memory store, logging each phase as it
/// replicates.
#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "undercover=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());

    let host_session = SessionContext::new("Ana");
    let host_id = host_session.player_id.clone();
    let host = HostReplicator::create_room(
        host_session,
        store.clone(),
        Arc::new(BuiltinContent),
    )
    .await
    .expect("room creation against the memory store cannot fail");
    let code = host.code().to_string();
    tracing::info!(code, "room open");

    let (action_tx, action_rx) = mpsc::channel(32);
    let (state_tx, mut state_rx) = watch::channel(host.state().clone());
    let loop_handle = spawn_host_loop(host, action_rx, state_tx);

    // Two remote players join by writing themselves into the roster
    let ben = SessionContext::new("Ben");
    let cleo = SessionContext::new("Cleo");
    let joins = futures::future::join_all([&ben, &cleo].map(|session| {
        let store = store.clone();
        let code = code.clone();
        async move {
            join_room(
                store.as_ref(),
                &code,
                session,
                chrono::Utc::now().timestamp_millis(),
            )
            .await
        }
    }))
    .await;
    for join in joins {
        join.expect("join against a fresh lobby");
    }
    wait_for(&mut state_rx, |s| s.players.len() == 3).await;

    // Host configures and starts; the word-reveal countdown is skipped by an
    // explicit BeginClue (the armed timer degrades to a no-op).
    action_tx
        .send(GameAction::SetConfig {
            topic: "animals".into(),
            show_clue: true,
            time_limit: None,
            voting_time_limit: None,
        })
        .await
        .expect("host loop is running");
    action_tx.send(GameAction::StartGame).await.expect("host loop is running");
    let revealed = wait_for(&mut state_rx, |s| s.phase == GamePhase::WordReveal).await;
    tracing::info!(
        word = revealed.secret_word,
        impostor = ?revealed.impostor_id,
        "roles dealt"
    );
    action_tx.send(GameAction::BeginClue).await.expect("host loop is running");
    wait_for(&mut state_rx, |s| s.phase == GamePhase::Clue).await;

    // Clue round: whoever the snapshot says is up submits a word
    let clues = [
        (host_id.clone(), "whiskers"),
        (ben.player_id.clone(), "river"),
        (cleo.player_id.clone(), "playful"),
    ];
    for spoken in 0..3usize {
        let state = wait_for(&mut state_rx, |s| {
            s.clues.len() == spoken && s.current_turn_index >= 0
        })
        .await;
        let speaker = state.players[state.current_turn_index as usize].id.clone();
        let Some((_, word)) = clues.iter().find(|(id, _)| *id == speaker) else {
            break;
        };
        let word = *word;
        tracing::info!(speaker, word, "clue submitted");
        if speaker == host_id {
            action_tx
                .send(GameAction::SubmitClue {
                    player_id: speaker,
                    word: word.to_string(),
                })
                .await
                .expect("host loop is running");
        } else {
            let session = if speaker == ben.player_id { &ben } else { &cleo };
            send_event(
                store.as_ref(),
                &code,
                session,
                EventKind::SubmitClue {
                    word: word.to_string(),
                },
            )
            .await
            .expect("event push");
        }
    }
    wait_for(&mut state_rx, |s| s.clues.len() == 3).await;

    action_tx.send(GameAction::OpenVoting).await.expect("host loop is running");
    wait_for(&mut state_rx, |s| s.phase == GamePhase::Voting).await;

    // Ana and Cleo gang up on Ben; the vote resolves once the last of the
    // three ballots is in.
    action_tx
        .send(GameAction::SubmitVote {
            voter_id: host_id.clone(),
            target_id: ben.player_id.clone(),
        })
        .await
        .expect("host loop is running");
    send_event(
        store.as_ref(),
        &code,
        &cleo,
        EventKind::SubmitVote {
            target_id: ben.player_id.clone(),
        },
    )
    .await
    .expect("event push");
    send_event(
        store.as_ref(),
        &code,
        &ben,
        EventKind::SubmitVote {
            target_id: cleo.player_id.clone(),
        },
    )
    .await
    .expect("event push");

    let done = wait_for(&mut state_rx, |s| s.phase == GamePhase::Reveal).await;
    match &done.elimination {
        Some(e) => tracing::info!(
            target = e.target_id,
            was_impostor = e.was_impostor,
            winner = ?done.winner,
            "vote resolved"
        ),
        None => tracing::info!("vote resolved with no elimination"),
    }

    // Dropping the action channel closes the room
    drop(action_tx);
    let _ = loop_handle.await;
    tracing::info!(code, "room closed");
}
