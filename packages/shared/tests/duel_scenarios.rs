//! End-to-end scenarios for the duel orchestrator.
//!
//! Every collaborator is in-memory except the judge, which is scripted per player
//! and can be held back with a gate to force interleavings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use shared::{
    clock::ManualClock,
    config::DuelConfig,
    models::{
        duel_session::DuelState,
        game_end::{GameEndReason, GameEndRecord},
        matchmaking::QueuePreferences,
        messages::{ErrorCode, ServerEvent},
        player::Player,
        question::{Difficulty, Language},
        submission::AttemptStatus,
    },
    repositories::{
        connection_repository::InMemoryConnectionRepository,
        game_end_repository::{GameEndRepository, InMemoryGameEndRepository},
        player_repository::{InMemoryPlayerRepository, PlayerRepository},
        question_repository::InMemoryQuestionRepository,
    },
    services::{
        duel_service::{DuelCollaborators, DuelService, JoinRequest},
        rating_service::EloRatingCalculator,
    },
};
use tokio::sync::mpsc::UnboundedReceiver;

mod mocks {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use shared::models::grading::{GradingResult, JudgeRequest};
    use shared::repositories::errors::judge_repository_errors::JudgeRepositoryError;
    use shared::repositories::judge_repository::JudgeRepository;
    use tokio::sync::Notify;

    pub struct Scripted {
        gate: Option<Arc<Notify>>,
        response: Result<GradingResult, JudgeRepositoryError>,
    }

    /// Answers each player's calls in order from a per-player script.
    #[derive(Default)]
    pub struct ScriptedJudge {
        scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: AtomicUsize,
    }

    impl ScriptedJudge {
        pub fn push(&self, player_id: &str, response: Result<GradingResult, JudgeRepositoryError>) {
            self.push_scripted(player_id, None, response);
        }

        /// The response is held until the returned gate is opened.
        pub fn push_gated(
            &self,
            player_id: &str,
            response: Result<GradingResult, JudgeRepositoryError>,
        ) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.push_scripted(player_id, Some(gate.clone()), response);
            gate
        }

        fn push_scripted(
            &self,
            player_id: &str,
            gate: Option<Arc<Notify>>,
            response: Result<GradingResult, JudgeRepositoryError>,
        ) {
            self.scripts
                .lock()
                .unwrap()
                .entry(player_id.to_string())
                .or_default()
                .push_back(Scripted { gate, response });
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub async fn wait_for_calls(&self, expected: usize) {
            while self.calls() < expected {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl JudgeRepository for ScriptedJudge {
        async fn run_or_submit(
            &self,
            request: &JudgeRequest,
            _timeout: Duration,
        ) -> Result<GradingResult, JudgeRepositoryError> {
            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&request.player_id)
                .and_then(|queue| queue.pop_front());
            self.calls.fetch_add(1, Ordering::SeqCst);
            let Some(scripted) = scripted else {
                return Err(JudgeRepositoryError::Unavailable("no script".to_string()));
            };
            if let Some(gate) = scripted.gate {
                gate.notified().await;
            }
            scripted.response
        }
    }

    pub fn graded(passed: u32, total: u32) -> Result<GradingResult, JudgeRepositoryError> {
        Ok(GradingResult {
            success: passed == total,
            total_passed: passed,
            total_tests: total,
            elapsed_time_ms: 40,
            error: None,
            test_results: vec![],
        })
    }
}

use mocks::{graded, ScriptedJudge};
use shared::repositories::errors::judge_repository_errors::JudgeRepositoryError;

type Events = UnboundedReceiver<ServerEvent>;

struct Harness {
    service: Arc<DuelService>,
    clock: Arc<ManualClock>,
    judge: Arc<ScriptedJudge>,
    players: Arc<InMemoryPlayerRepository>,
    game_ends: Arc<InMemoryGameEndRepository>,
    connections: Arc<InMemoryConnectionRepository>,
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn test_config() -> DuelConfig {
    DuelConfig {
        start_grace: Duration::ZERO,
        disconnect_grace: Duration::from_secs(30),
        duel_duration: Duration::from_secs(600),
        queue_max_wait: Duration::from_secs(60),
        ..DuelConfig::default()
    }
}

fn harness_with(config: DuelConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let judge = Arc::new(ScriptedJudge::default());
    let players = Arc::new(InMemoryPlayerRepository::with_players(vec![
        Player::new("alice", "Alice", 1500),
        Player::new("bob", "Bob", 1500),
        Player::new("carol", "Carol", 1510),
    ]));
    let game_ends = Arc::new(InMemoryGameEndRepository::new(Some(players.clone())));
    let connections = Arc::new(InMemoryConnectionRepository::new());
    let service = DuelService::new(
        config,
        DuelCollaborators {
            clock: clock.clone(),
            judge: judge.clone(),
            players: players.clone(),
            questions: Arc::new(InMemoryQuestionRepository::single("two-sum", Difficulty::Easy)),
            game_ends: game_ends.clone(),
            connections: connections.clone(),
            rating: Arc::new(EloRatingCalculator::new(32.0)),
        },
    );
    Harness {
        service,
        clock,
        judge,
        players,
        game_ends,
        connections,
    }
}

fn harness() -> Harness {
    harness_with(test_config())
}

impl Harness {
    async fn connect(&self, player_id: &str) -> Events {
        let connection_id = format!("conn-{}", player_id);
        let events = self.connections.store_connection(&connection_id).await;
        self.service.connect(player_id, &connection_id).await;
        events
    }

    async fn disconnect(&self, player_id: &str) {
        let connection_id = format!("conn-{}", player_id);
        self.service.disconnect(player_id, &connection_id).await;
        self.connections.remove_connection(&connection_id).await;
    }

    /// Pairs alice and bob and returns the started session id.
    async fn start_duel(&self) -> (String, Events, Events) {
        let mut alice = self.connect("alice").await;
        let mut bob = self.connect("bob").await;
        self.service
            .join_queue("alice", JoinRequest::default())
            .await
            .unwrap();
        self.service
            .join_queue("bob", JoinRequest::default())
            .await
            .unwrap();

        let session_id = drain(&mut alice)
            .into_iter()
            .find_map(|event| match event {
                ServerEvent::MatchFound { session_id, .. } => Some(session_id),
                _ => None,
            })
            .expect("alice should be matched");
        drain(&mut bob);
        (session_id, alice, bob)
    }

    fn at(&self, secs: i64) {
        self.clock.set(t0() + chrono::Duration::seconds(secs));
    }

    async fn state(&self, session_id: &str) -> Option<DuelState> {
        let handle = self.service.directory().get(session_id).await?;
        let state = handle.lock().await.state();
        Some(state)
    }
}

fn drain(events: &mut Events) -> Vec<ServerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn game_end_records(events: &[ServerEvent]) -> Vec<GameEndRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            ServerEvent::GameEnd { record } => Some(record.clone()),
            _ => None,
        })
        .collect()
}

fn rejection(events: &[ServerEvent]) -> Option<ErrorCode> {
    events.iter().find_map(|event| match event {
        ServerEvent::Rejected { code, .. } => Some(*code),
        _ => None,
    })
}

#[tokio::test]
async fn test_pairing_starts_session_and_notifies_both() {
    let h = harness_with(DuelConfig {
        start_grace: Duration::from_secs(20),
        ..test_config()
    });
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;

    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();

    let alice_events = drain(&mut alice);
    let session_id = alice_events
        .iter()
        .find_map(|event| match event {
            ServerEvent::MatchFound {
                session_id,
                opponent,
                question,
                deadline,
                ..
            } => {
                assert_eq!(opponent.id, "bob");
                assert_eq!(question.name, "two-sum");
                assert_eq!(*deadline, t0() + chrono::Duration::seconds(620));
                Some(session_id.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(h.state(&session_id).await, Some(DuelState::WaitingStart));

    h.at(3);
    h.service.mark_ready("alice", &session_id).await.unwrap();
    assert_eq!(h.state(&session_id).await, Some(DuelState::WaitingStart));
    h.service.mark_ready("bob", &session_id).await.unwrap();
    assert_eq!(h.state(&session_id).await, Some(DuelState::InProgress));

    let started = drain(&mut bob).into_iter().find_map(|event| match event {
        ServerEvent::GameStart {
            started_at,
            deadline,
            ..
        } => Some((started_at, deadline)),
        _ => None,
    });
    let (started_at, deadline) = started.unwrap();
    assert_eq!(started_at, t0() + chrono::Duration::seconds(3));
    assert_eq!(deadline - started_at, chrono::Duration::seconds(600));
}

#[tokio::test]
async fn test_cannot_enqueue_while_queued_or_in_session() {
    let h = harness();
    let mut alice = h.connect("alice").await;

    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    let err = h
        .service
        .join_queue("alice", JoinRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyQueued);

    h.connect("bob").await;
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    drain(&mut alice);

    let err = h
        .service
        .join_queue("alice", JoinRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyQueued);
}

#[tokio::test]
async fn test_unknown_player_needs_guest_flag() {
    let h = harness();
    let mut guest = h.connect("visitor").await;

    let err = h
        .service
        .join_queue("visitor", JoinRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownPlayer);

    let ticket = h
        .service
        .join_queue(
            "visitor",
            JoinRequest {
                anonymous: true,
                display_name: Some("Visitor".to_string()),
                ..JoinRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(ticket.player.rating, h.service.config().default_rating);
    assert!(ticket.player.anonymous);
    assert!(drain(&mut guest)
        .iter()
        .any(|event| matches!(event, ServerEvent::QueueJoined { position: 1, .. })));
}

#[tokio::test]
async fn test_leave_queue_and_queue_timeout() {
    let h = harness();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;

    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.leave_queue("alice").await.unwrap();
    assert!(drain(&mut alice)
        .iter()
        .any(|event| matches!(event, ServerEvent::QueueLeft { .. })));
    let err = h.service.leave_queue("alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotQueued);

    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    h.at(61);
    h.service.run_matchmaking().await;
    assert!(drain(&mut bob)
        .iter()
        .any(|event| matches!(event, ServerEvent::QueueTimeout { .. })));
    assert!(h.service.matchmaking().is_empty().await);
}

#[tokio::test]
async fn test_earlier_successful_submit_wins() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    h.judge.push("alice", graded(10, 10));
    h.judge.push("bob", graded(10, 10));

    h.at(10);
    h.service
        .submit_code("alice", &session_id, "solution", Language::Python)
        .await
        .unwrap();
    h.at(12);
    let late = h
        .service
        .submit_code("bob", &session_id, "solution", Language::Python)
        .await;

    assert_eq!(late.unwrap_err().code(), ErrorCode::SessionNotFound);
    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(records[0].reason(), GameEndReason::Completed);
    assert_eq!(records[0].winner_time_ms(), Some(10_000));
    assert_eq!(game_end_records(&drain(&mut bob)), records);
    assert_eq!(h.state(&session_id).await, None);
}

#[tokio::test]
async fn test_earlier_pending_submit_overtakes_later_success() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    let alice_gate = h.judge.push_gated("alice", graded(10, 10));
    h.judge.push("bob", graded(10, 10));

    h.at(10);
    let service = h.service.clone();
    let sid = session_id.clone();
    let alice_submit = tokio::spawn(async move {
        service
            .submit_code("alice", &sid, "solution", Language::Python)
            .await
    });
    h.judge.wait_for_calls(1).await;

    h.at(12);
    h.service
        .submit_code("bob", &session_id, "solution", Language::Python)
        .await
        .unwrap();
    assert_eq!(h.state(&session_id).await, Some(DuelState::GradingPending(1)));
    assert!(game_end_records(&drain(&mut bob)).is_empty());

    alice_gate.notify_one();
    alice_submit.await.unwrap().unwrap();

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(records[0].loser_id(), Some("bob"));
    assert_eq!(records[0].loser_time_ms(), Some(12_000));
}

#[tokio::test]
async fn test_same_millisecond_success_goes_to_player_a() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    let alice_gate = h.judge.push_gated("alice", graded(4, 4));
    let bob_gate = h.judge.push_gated("bob", graded(4, 4));
    h.at(42);

    let mut tasks = Vec::new();
    for player in ["alice", "bob"] {
        let service = h.service.clone();
        let sid = session_id.clone();
        tasks.push(tokio::spawn(async move {
            service
                .submit_code(player, &sid, "solution", Language::Cpp)
                .await
        }));
        h.judge.wait_for_calls(tasks.len()).await;
    }

    bob_gate.notify_one();
    alice_gate.notify_one();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(records[0].reason(), GameEndReason::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_successful_submits_produce_one_record() {
    for _ in 0..20 {
        let h = harness();
        let (session_id, mut alice, mut bob) = h.start_duel().await;
        h.judge.push("alice", graded(3, 3));
        h.judge.push("bob", graded(3, 3));

        let (a, b) = tokio::join!(
            h.service
                .submit_code("alice", &session_id, "a", Language::Java),
            h.service
                .submit_code("bob", &session_id, "b", Language::Java),
        );
        // The loser of the race may find the session already closed.
        for result in [a, b] {
            if let Err(err) = result {
                assert!(matches!(
                    err.code(),
                    ErrorCode::SessionNotFound | ErrorCode::SessionEnded
                ));
            }
        }

        let alice_records = game_end_records(&drain(&mut alice));
        let bob_records = game_end_records(&drain(&mut bob));
        assert_eq!(alice_records.len(), 1);
        assert_eq!(alice_records, bob_records);
        assert_eq!(h.game_ends.len().await, 1);
    }
}

#[tokio::test]
async fn test_second_attempt_while_pending_is_rejected() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    let gate = h.judge.push_gated("alice", graded(1, 5));

    let service = h.service.clone();
    let sid = session_id.clone();
    let first = tokio::spawn(async move {
        service
            .run_code("alice", &sid, "draft", Language::Python)
            .await
    });
    h.judge.wait_for_calls(1).await;

    let err = h
        .service
        .submit_code("alice", &session_id, "final", Language::Python)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SubmissionInFlight);

    gate.notify_one();
    first.await.unwrap().unwrap();
    let events = drain(&mut alice);
    assert!(events.iter().any(|event| matches!(
        event,
        ServerEvent::RunResult {
            hidden_tests_excluded: true,
            status: AttemptStatus::Completed,
            ..
        }
    )));

    // The opponent sees activity and counts, never results of runs.
    let bob_events = drain(&mut bob);
    assert!(bob_events.iter().all(|event| match event {
        ServerEvent::OpponentProgress { total_passed, .. } => total_passed.is_none(),
        _ => true,
    }));
}

#[tokio::test]
async fn test_judge_timeout_keeps_session_open() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    h.judge.push("alice", Err(JudgeRepositoryError::Timeout));
    h.judge.push("alice", graded(7, 7));

    h.at(30);
    h.service
        .submit_code("alice", &session_id, "slow", Language::Javascript)
        .await
        .unwrap();

    assert_eq!(h.state(&session_id).await, Some(DuelState::InProgress));
    assert!(drain(&mut alice).iter().any(|event| matches!(
        event,
        ServerEvent::SubmitResult {
            status: AttemptStatus::TimedOut,
            ..
        }
    )));

    h.at(45);
    h.service
        .submit_code("alice", &session_id, "fast", Language::Javascript)
        .await
        .unwrap();
    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records[0].winner_id(), Some("alice"));
}

#[tokio::test]
async fn test_sandbox_error_reaches_only_the_owner() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    h.judge.push(
        "alice",
        Err(JudgeRepositoryError::Unavailable("segfault in sandbox".to_string())),
    );

    h.service
        .submit_code("alice", &session_id, "bad", Language::Cpp)
        .await
        .unwrap();

    assert!(drain(&mut alice).iter().any(|event| matches!(
        event,
        ServerEvent::SubmitResult { error: Some(message), .. } if message == "segfault in sandbox"
    )));
    let bob_events = serde_json::to_string(&drain(&mut bob)).unwrap();
    assert!(!bob_events.contains("segfault"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_resolves_by_partial_correctness() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    h.judge.push("alice", graded(8, 10));
    h.judge.push("bob", graded(6, 10));

    h.at(100);
    h.service
        .submit_code("alice", &session_id, "a", Language::Python)
        .await
        .unwrap();
    h.service
        .submit_code("bob", &session_id, "b", Language::Python)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(601)).await;

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason(), GameEndReason::Timeout);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(h.state(&session_id).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_with_equal_results_is_a_draw() {
    let h = harness();
    let (_session_id, mut alice, _bob) = h.start_duel().await;

    tokio::time::sleep(Duration::from_secs(601)).await;

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert!(records[0].is_draw());
    assert_eq!(records[0].winner_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_past_grace_forfeits() {
    let h = harness();
    let (_session_id, mut alice, _bob) = h.start_duel().await;

    h.disconnect("bob").await;
    assert!(drain(&mut alice).iter().any(|event| matches!(
        event,
        ServerEvent::OpponentConnection {
            connected: false,
            ..
        }
    )));

    tokio::time::sleep(Duration::from_secs(31)).await;

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason(), GameEndReason::Forfeit);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(records[0].loser_id(), Some("bob"));
    assert!(!h.service.matchmaking().is_engaged("alice").await);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_resumes_session() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;

    h.disconnect("bob").await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut bob = h.connect("bob").await;

    let snapshot = drain(&mut bob).into_iter().find_map(|event| match event {
        ServerEvent::SessionSnapshot { snapshot } => Some(snapshot),
        _ => None,
    });
    let snapshot = snapshot.expect("snapshot replayed on reconnect");
    assert_eq!(snapshot.session_id, session_id);
    assert_eq!(snapshot.opponent.id, "alice");
    assert!(snapshot.opponent_connected);
    assert!(snapshot.deadline.is_some());

    tokio::time::sleep(Duration::from_secs(60)).await;
    let alice_events = drain(&mut alice);
    assert!(game_end_records(&alice_events).is_empty());
    assert!(alice_events.iter().any(|event| matches!(
        event,
        ServerEvent::OpponentConnection {
            connected: true,
            ..
        }
    )));
    assert_eq!(h.state(&session_id).await, Some(DuelState::InProgress));
}

#[tokio::test(start_paused = true)]
async fn test_both_disconnected_aborts_without_record() {
    let h = harness();
    let (session_id, _alice, _bob) = h.start_duel().await;

    h.disconnect("alice").await;
    h.disconnect("bob").await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.state(&session_id).await, None);
    assert!(h.game_ends.is_empty().await);
}

#[tokio::test]
async fn test_leave_game_forfeits_and_discards_late_judge_response() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    let gate = h.judge.push_gated("alice", graded(9, 9));

    let service = h.service.clone();
    let sid = session_id.clone();
    let pending = tokio::spawn(async move {
        service
            .submit_code("alice", &sid, "winner?", Language::Python)
            .await
    });
    h.judge.wait_for_calls(1).await;

    h.service.leave_game("bob", &session_id).await.unwrap();
    gate.notify_one();
    pending.await.unwrap().unwrap();

    let alice_events = drain(&mut alice);
    let records = game_end_records(&alice_events);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason(), GameEndReason::Forfeit);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert!(!alice_events
        .iter()
        .any(|event| matches!(event, ServerEvent::SubmitResult { .. })));
    assert_eq!(game_end_records(&drain(&mut bob)), records);
}

#[tokio::test]
async fn test_redelivered_record_is_not_applied_twice() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    h.judge.push("alice", graded(2, 2));

    h.service
        .submit_code("alice", &session_id, "ok", Language::Python)
        .await
        .unwrap();
    let record = game_end_records(&drain(&mut alice)).remove(0);
    let rating = h.players.get_player_snapshot("alice").await.unwrap().rating;
    assert_eq!(rating, 1500 + record.rating_delta_winner());

    assert!(!h.game_ends.apply_game_end(&record).await.unwrap());
    assert_eq!(
        h.players.get_player_snapshot("alice").await.unwrap().rating,
        rating
    );
}

#[tokio::test]
async fn test_players_can_queue_again_after_game_end() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    h.judge.push("bob", graded(1, 1));
    h.service
        .submit_code("bob", &session_id, "ok", Language::Python)
        .await
        .unwrap();
    drain(&mut alice);

    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    assert_eq!(h.service.matchmaking().len().await, 1);
}

#[tokio::test]
async fn test_rejections_carry_stable_codes() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    h.connect("carol").await;

    let err = h
        .service
        .submit_code("carol", &session_id, "x", Language::Python)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotInSession);

    let err = h
        .service
        .run_code("alice", "no-such-session", "x", Language::Python)
        .await
        .unwrap_err();
    h.service.reject("alice", &err).await;
    assert_eq!(rejection(&drain(&mut alice)), Some(ErrorCode::SessionNotFound));
}

#[tokio::test]
async fn test_shutdown_aborts_sessions_and_refuses_new_players() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;

    h.service.shutdown().await;

    for events in [drain(&mut alice), drain(&mut bob)] {
        assert!(events.iter().any(|event| matches!(
            event,
            ServerEvent::SessionAborted { reason, .. } if reason == "shutdown"
        )));
    }
    assert_eq!(h.state(&session_id).await, None);
    assert!(h.game_ends.is_empty().await);
    let err = h
        .service
        .join_queue("carol", JoinRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InternalError);
}

#[tokio::test(start_paused = true)]
async fn test_in_time_submit_is_graded_after_deadline() {
    let h = harness();
    let (session_id, mut alice, mut bob) = h.start_duel().await;
    let gate = h.judge.push_gated("alice", graded(10, 10));

    tokio::time::sleep(Duration::from_secs(590)).await;
    h.at(590);
    let service = h.service.clone();
    let sid = session_id.clone();
    let pending = tokio::spawn(async move {
        service
            .submit_code("alice", &sid, "solution", Language::Python)
            .await
    });
    h.judge.wait_for_calls(1).await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    h.at(601);
    assert_eq!(h.state(&session_id).await, Some(DuelState::GradingPending(1)));
    let err = h
        .service
        .submit_code("bob", &session_id, "too late", Language::Python)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeadlinePassed);

    gate.notify_one();
    pending.await.unwrap().unwrap();

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner_id(), Some("alice"));
    assert_eq!(records[0].reason(), GameEndReason::Completed);
    assert_eq!(records[0].winner_time_ms(), Some(590_000));
    assert_eq!(game_end_records(&drain(&mut bob)), records);
    assert_eq!(h.state(&session_id).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_closes_once_in_time_submit_times_out() {
    let h = harness();
    let (session_id, mut alice, _bob) = h.start_duel().await;
    let _gate = h.judge.push_gated("alice", graded(10, 10));

    tokio::time::sleep(Duration::from_secs(595)).await;
    h.at(595);
    let service = h.service.clone();
    let sid = session_id.clone();
    let pending = tokio::spawn(async move {
        service
            .submit_code("alice", &sid, "solution", Language::Python)
            .await
    });
    h.judge.wait_for_calls(1).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    pending.await.unwrap().unwrap();

    let records = game_end_records(&drain(&mut alice));
    assert_eq!(records.len(), 1);
    assert!(records[0].is_draw());
    assert_eq!(h.state(&session_id).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_start_grace_expiry_starts_duel_anyway() {
    let h = harness_with(DuelConfig {
        start_grace: Duration::from_secs(20),
        ..test_config()
    });
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    let session_id = drain(&mut alice)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::MatchFound { session_id, .. } => Some(session_id),
            _ => None,
        })
        .unwrap();
    drain(&mut bob);

    h.service.mark_ready("alice", &session_id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(h.state(&session_id).await, Some(DuelState::WaitingStart));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.state(&session_id).await, Some(DuelState::InProgress));
    assert!(drain(&mut bob)
        .iter()
        .any(|event| matches!(event, ServerEvent::GameStart { .. })));
}

fn aborted_with(events: &[ServerEvent], expected: &str) -> bool {
    events.iter().any(|event| {
        matches!(event, ServerEvent::SessionAborted { reason, .. } if reason == expected)
    })
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_before_start_aborts_as_opponent_absent() {
    let h = harness_with(DuelConfig {
        start_grace: Duration::from_secs(120),
        ..test_config()
    });
    let mut alice = h.connect("alice").await;
    h.connect("bob").await;
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    assert_eq!(h.service.directory().len().await, 1);

    h.disconnect("bob").await;
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(aborted_with(&drain(&mut alice), "opponent_absent"));
    assert!(h.service.directory().is_empty().await);
    assert!(h.game_ends.is_empty().await);
    assert!(!h.service.matchmaking().is_engaged("alice").await);
}

#[tokio::test(start_paused = true)]
async fn test_player_unreachable_at_pairing_is_treated_as_absent() {
    let h = harness_with(DuelConfig {
        start_grace: Duration::from_secs(120),
        ..test_config()
    });
    let mut alice = h.connect("alice").await;
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(aborted_with(&drain(&mut alice), "opponent_absent"));
    assert!(h.service.directory().is_empty().await);
}

#[tokio::test]
async fn test_leave_before_start_aborts_session() {
    let h = harness_with(DuelConfig {
        start_grace: Duration::from_secs(120),
        ..test_config()
    });
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    let session_id = drain(&mut alice)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::MatchFound { session_id, .. } => Some(session_id),
            _ => None,
        })
        .unwrap();

    h.service.leave_game("alice", &session_id).await.unwrap();

    assert!(aborted_with(&drain(&mut alice), "player_left"));
    assert!(aborted_with(&drain(&mut bob), "player_left"));
    assert_eq!(h.state(&session_id).await, None);
    assert!(h.game_ends.is_empty().await);
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
}

#[tokio::test]
async fn test_no_question_for_shared_difficulty_releases_players() {
    let h = harness();
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let hard_only = || JoinRequest {
        preferences: QueuePreferences::new(&[Difficulty::Hard]),
        ..JoinRequest::default()
    };

    h.service.join_queue("alice", hard_only()).await.unwrap();
    h.service.join_queue("bob", hard_only()).await.unwrap();

    for events in [drain(&mut alice), drain(&mut bob)] {
        assert_eq!(rejection(&events), Some(ErrorCode::NoQuestionAvailable));
    }
    assert!(h.service.directory().is_empty().await);
    assert!(h.service.matchmaking().is_empty().await);
    assert!(!h.service.matchmaking().is_engaged("alice").await);
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
}

#[tokio::test]
async fn test_guest_rating_moves_after_game() {
    let h = harness_with(DuelConfig {
        default_rating: 1500,
        ..test_config()
    });
    let mut visitor = h.connect("visitor").await;
    h.connect("bob").await;
    let guest = JoinRequest {
        anonymous: true,
        display_name: Some("Visitor".to_string()),
        ..JoinRequest::default()
    };

    h.service.join_queue("visitor", guest).await.unwrap();
    h.service.join_queue("bob", JoinRequest::default()).await.unwrap();
    let session_id = drain(&mut visitor)
        .into_iter()
        .find_map(|event| match event {
            ServerEvent::MatchFound { session_id, .. } => Some(session_id),
            _ => None,
        })
        .unwrap();
    h.judge.push("visitor", graded(3, 3));
    h.service
        .submit_code("visitor", &session_id, "ok", Language::Python)
        .await
        .unwrap();

    let record = game_end_records(&drain(&mut visitor)).remove(0);
    assert_eq!(record.winner_id(), Some("visitor"));
    let snapshot = h.players.get_player_snapshot("visitor").await.unwrap();
    assert!(snapshot.anonymous);
    assert_eq!(snapshot.rating, 1500 + record.rating_delta_winner());
}

#[tokio::test]
async fn test_new_connection_displaces_old_one() {
    let h = harness();
    let mut old = h.connections.store_connection("tab-1").await;
    assert_eq!(h.service.connect("alice", "tab-1").await, None);
    h.service.join_queue("alice", JoinRequest::default()).await.unwrap();
    drain(&mut old);

    let mut current = h.connections.store_connection("tab-2").await;
    assert_eq!(
        h.service.connect("alice", "tab-2").await,
        Some("tab-1".to_string())
    );

    assert!(matches!(
        old.recv().await,
        Some(ServerEvent::ConnectionDisplaced { .. })
    ));
    assert_eq!(old.recv().await, None);

    // The stale socket closing does not cost the player their ticket.
    h.service.disconnect("alice", "tab-1").await;
    assert_eq!(h.service.matchmaking().len().await, 1);
    h.service.ping("alice").await;
    assert!(drain(&mut current)
        .iter()
        .any(|event| matches!(event, ServerEvent::Pong { .. })));
}
