use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::DuelConfig;
use crate::models::duel_session::{
    Decision, DuelSession, DuelState, PlayerActivity, SessionId, TransitionError,
};
use crate::models::game_end::GameEndRecord;
use crate::models::grading::SubmissionMode;
use crate::models::matchmaking::{MatchmakingTicket, Pairing, QueuePreferences};
use crate::models::messages::ServerEvent;
use crate::models::player::{Player, PlayerId};
use crate::models::question::Language;
use crate::models::submission::SubmissionAttempt;
use crate::repositories::connection_repository::{ConnectionId, ConnectionRepository};
use crate::repositories::errors::player_repository_errors::PlayerRepositoryError;
use crate::repositories::game_end_repository::GameEndRepository;
use crate::repositories::judge_repository::JudgeRepository;
use crate::repositories::player_repository::PlayerRepository;
use crate::repositories::question_repository::QuestionRepository;
use crate::services::errors::duel_service_errors::DuelServiceError;
use crate::services::grading_service::GradingService;
use crate::services::matchmaking_service::MatchmakingService;
use crate::services::notification_service::NotificationService;
use crate::services::outcome_service::{OutcomeService, Termination};
use crate::services::rating_service::RatingCalculator;
use crate::services::session_directory::{SessionDirectory, SessionHandle};
use crate::services::session_timers::TimerKey;

/// External collaborators the orchestrator talks to.
pub struct DuelCollaborators {
    pub clock: Arc<dyn Clock>,
    pub judge: Arc<dyn JudgeRepository>,
    pub players: Arc<dyn PlayerRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub game_ends: Arc<dyn GameEndRepository>,
    pub connections: Arc<dyn ConnectionRepository>,
    pub rating: Arc<dyn RatingCalculator>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinRequest {
    pub preferences: QueuePreferences,
    pub display_name: Option<String>,
    pub avatar_ref: Option<String>,
    pub anonymous: bool,
}

/// Work left once a session reached a terminal state and its lock was released.
struct Closing {
    session_id: SessionId,
    player_ids: [PlayerId; 2],
    record: Option<GameEndRecord>,
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis() as i64)
}

fn result_event(session_id: &str, attempt: &SubmissionAttempt) -> ServerEvent {
    match attempt.mode {
        SubmissionMode::Run => ServerEvent::RunResult {
            session_id: session_id.to_string(),
            attempt_id: attempt.attempt_id,
            status: attempt.status,
            result: attempt.result.clone(),
            error: attempt.error.clone(),
            hidden_tests_excluded: true,
        },
        SubmissionMode::Submit => ServerEvent::SubmitResult {
            session_id: session_id.to_string(),
            attempt_id: attempt.attempt_id,
            status: attempt.status,
            result: attempt.result.clone(),
            error: attempt.error.clone(),
        },
    }
}

/// The duel session orchestrator: queue, sessions, grading and verdicts.
pub struct DuelService {
    me: Weak<DuelService>,
    config: DuelConfig,
    clock: Arc<dyn Clock>,
    players: Arc<dyn PlayerRepository>,
    questions: Arc<dyn QuestionRepository>,
    game_ends: Arc<dyn GameEndRepository>,
    matchmaking: MatchmakingService,
    grading: GradingService,
    outcome: OutcomeService,
    directory: Arc<SessionDirectory>,
    notifications: NotificationService,
    shutting_down: AtomicBool,
}

impl DuelService {
    pub fn new(config: DuelConfig, collaborators: DuelCollaborators) -> Arc<Self> {
        let directory = Arc::new(SessionDirectory::new());
        Arc::new_cyclic(|me| DuelService {
            me: me.clone(),
            matchmaking: MatchmakingService::new(config.pairing.clone(), config.queue_max_wait),
            grading: GradingService::new(collaborators.judge, config.judge_timeout),
            outcome: OutcomeService::new(collaborators.rating),
            notifications: NotificationService::new(directory.clone(), collaborators.connections),
            directory,
            clock: collaborators.clock,
            players: collaborators.players,
            questions: collaborators.questions,
            game_ends: collaborators.game_ends,
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &DuelConfig {
        &self.config
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn matchmaking(&self) -> &MatchmakingService {
        &self.matchmaking
    }

    async fn handle(&self, session_id: &str) -> Result<Arc<SessionHandle>, DuelServiceError> {
        self.directory
            .get(session_id)
            .await
            .ok_or_else(|| DuelServiceError::SessionNotFound(session_id.to_string()))
    }

    /// Sends the caller a rejection carrying the error's stable code.
    pub async fn reject(&self, player_id: &str, err: &DuelServiceError) {
        debug!("Rejecting request from {}: {}", player_id, err);
        self.notifications
            .notify(
                player_id,
                &ServerEvent::Rejected {
                    code: err.code(),
                    message: err.to_string(),
                },
            )
            .await;
    }

    pub async fn ping(&self, player_id: &str) {
        self.notifications
            .notify(
                player_id,
                &ServerEvent::Pong {
                    timestamp: self.clock.now(),
                },
            )
            .await;
    }

    // Connections

    /// Binds a connection to the player. If the player is in a live session this is a
    /// reconnect: the grace timer stops and the current snapshot is replayed.
    /// A connection the player already had is told it was displaced and closed;
    /// its id is returned.
    pub async fn connect(&self, player_id: &str, connection_id: &str) -> Option<ConnectionId> {
        let displaced = self
            .directory
            .bind_connection(player_id, connection_id)
            .await
            .filter(|previous| previous != connection_id);
        if let Some(previous) = &displaced {
            info!(
                "Player {} replaced connection {} with {}",
                player_id, previous, connection_id
            );
            self.notifications.displace(previous).await;
        }
        self.reattach(player_id).await;
        displaced
    }

    async fn reattach(&self, player_id: &str) {
        let Some(handle) = self.directory.session_for_player(player_id).await else {
            return;
        };
        let mut session = handle.lock().await;
        let Some(seat) = session.seat_of(player_id) else {
            return;
        };
        if session.state().is_terminal() {
            return;
        }

        let was_connected = session.is_connected(seat);
        if let Err(err) = session.set_connected(player_id, true) {
            warn!("Could not mark {} connected: {}", player_id, err);
            return;
        }
        handle
            .timers()
            .cancel(&TimerKey::Disconnect(player_id.to_string()));
        info!(
            "Player {} reattached to session {}",
            player_id,
            session.session_id()
        );

        if let Some(snapshot) = session.snapshot_for(player_id) {
            self.notifications
                .notify(player_id, &ServerEvent::SessionSnapshot { snapshot })
                .await;
        }
        if !was_connected {
            let opponent = session.player(seat.other()).id.clone();
            self.notifications
                .notify(
                    &opponent,
                    &ServerEvent::OpponentConnection {
                        session_id: session.session_id().to_string(),
                        connected: true,
                    },
                )
                .await;
        }
    }

    /// Connection loss. Queued players lose their ticket; players in a session get
    /// the disconnect grace period before forfeiting.
    pub async fn disconnect(&self, player_id: &str, connection_id: &str) {
        if !self
            .directory
            .unbind_connection(player_id, connection_id)
            .await
        {
            debug!(
                "Connection {} of {} was already replaced",
                connection_id, player_id
            );
            return;
        }

        if let Ok(ticket) = self.matchmaking.cancel_for_player(player_id).await {
            info!(
                "Dropped ticket {} of disconnected player {}",
                ticket.ticket_id, player_id
            );
        }

        let Some(handle) = self.directory.session_for_player(player_id).await else {
            return;
        };
        let mut session = handle.lock().await;
        let Some(seat) = session.seat_of(player_id) else {
            return;
        };
        if session.state().is_terminal() || session.set_connected(player_id, false).is_err() {
            return;
        }

        info!(
            "Player {} disconnected from session {}, grace {:?}",
            player_id,
            session.session_id(),
            self.config.disconnect_grace
        );
        let opponent = session.player(seat.other()).id.clone();
        self.notifications
            .notify(
                &opponent,
                &ServerEvent::OpponentConnection {
                    session_id: session.session_id().to_string(),
                    connected: false,
                },
            )
            .await;
        self.schedule(
            &handle,
            TimerKey::Disconnect(player_id.to_string()),
            self.config.disconnect_grace,
        );
    }

    // Queue

    pub async fn join_queue(
        &self,
        player_id: &str,
        request: JoinRequest,
    ) -> Result<MatchmakingTicket, DuelServiceError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(DuelServiceError::ShuttingDown);
        }

        let player = match self.players.get_player_snapshot(player_id).await {
            Ok(player) => player,
            Err(PlayerRepositoryError::NotFound) if request.anonymous => {
                info!("Creating guest snapshot for {}", player_id);
                let guest = Player::guest(
                    Some(player_id),
                    request.display_name.as_deref().unwrap_or("Guest"),
                    request.avatar_ref.clone(),
                    self.config.default_rating,
                );
                if let Err(err) = self.players.register_guest(&guest).await {
                    warn!("Could not register guest {}: {}", player_id, err);
                }
                guest
            }
            Err(err) => return Err(err.into()),
        };

        let now = self.clock.now();
        let ticket = self
            .matchmaking
            .enqueue(player, request.preferences, now)
            .await?;
        let position = self
            .matchmaking
            .queue_status(player_id, now)
            .await
            .map_or(0, |status| status.position);
        self.notifications
            .notify(
                player_id,
                &ServerEvent::QueueJoined {
                    ticket_id: ticket.ticket_id.clone(),
                    position,
                },
            )
            .await;

        self.run_matchmaking().await;
        Ok(ticket)
    }

    pub async fn leave_queue(&self, player_id: &str) -> Result<(), DuelServiceError> {
        let ticket = self.matchmaking.cancel_for_player(player_id).await?;
        self.notifications
            .notify(
                player_id,
                &ServerEvent::QueueLeft {
                    ticket_id: ticket.ticket_id,
                },
            )
            .await;
        Ok(())
    }

    pub async fn queue_status(&self, player_id: &str) {
        let status = self
            .matchmaking
            .queue_status(player_id, self.clock.now())
            .await;
        self.notifications
            .notify(
                player_id,
                &ServerEvent::QueueStatus {
                    in_queue: status.is_some(),
                    status,
                },
            )
            .await;
    }

    /// One matchmaking pass: expire overdue tickets, then pair what can be paired.
    /// Runs on every enqueue and on the periodic ticker.
    pub async fn run_matchmaking(&self) {
        let now = self.clock.now();
        for ticket in self.matchmaking.expire_overdue(now).await {
            self.notifications
                .notify(
                    &ticket.player.id,
                    &ServerEvent::QueueTimeout {
                        ticket_id: ticket.ticket_id.clone(),
                    },
                )
                .await;
        }

        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        for pairing in self.matchmaking.tick(now).await {
            self.create_session(pairing).await;
        }
    }

    async fn create_session(&self, pairing: Pairing) {
        let Pairing {
            first,
            second,
            common_difficulties,
        } = pairing;
        let session_id = Uuid::new_v4().to_string();
        let player_ids = [first.player.id.clone(), second.player.id.clone()];

        let mut busy = Vec::new();
        for player_id in &player_ids {
            if let Some(existing) = self.directory.session_for_player(player_id).await {
                busy.push((player_id.clone(), existing.session_id().to_string()));
            }
        }
        if !busy.is_empty() {
            error!(
                "Invariant violation: pairing {} includes players already in a session: {:?}",
                session_id, busy
            );
            for player_id in &player_ids {
                if !busy.iter().any(|(busy_id, _)| busy_id == player_id) {
                    self.matchmaking.release(player_id).await;
                }
            }
            self.notifications
                .broadcast(
                    &player_ids,
                    &ServerEvent::SessionAborted {
                        session_id,
                        reason: "invariant_violation".to_string(),
                    },
                )
                .await;
            return;
        }

        let order = {
            let mut order = common_difficulties;
            order.shuffle(&mut rand::thread_rng());
            order
        };
        let mut question = None;
        for difficulty in order {
            question = self.questions.pick_question(difficulty).await;
            if question.is_some() {
                break;
            }
        }
        let Some(question) = question else {
            warn!("No question available for pairing {:?}", player_ids);
            let err = DuelServiceError::NoQuestionAvailable;
            for player_id in &player_ids {
                self.matchmaking.release(player_id).await;
                self.reject(player_id, &err).await;
            }
            return;
        };

        let now = self.clock.now();
        let handle = SessionHandle::new(DuelSession::new(
            &session_id,
            first.player,
            second.player,
            question,
            now,
        ));
        let mut session = handle.lock().await;
        self.directory.insert(handle.clone(), &player_ids).await;
        info!(
            "Created session {} for {} and {} on {}",
            session_id,
            player_ids[0],
            player_ids[1],
            session.question().name
        );

        let ready_by = now + chrono_duration(self.config.start_grace);
        let latest_deadline = ready_by + chrono_duration(self.config.duel_duration);
        for player_id in &player_ids {
            let Some(opponent) = session.opponent_of(player_id) else {
                continue;
            };
            let event = ServerEvent::MatchFound {
                session_id: session_id.clone(),
                opponent: opponent.public_profile(),
                question: session.question().clone(),
                deadline: latest_deadline,
                ready_by,
            };
            if !self.notifications.notify(player_id, &event).await {
                if let Err(err) = session.set_connected(player_id, false) {
                    warn!("Could not mark {} disconnected: {}", player_id, err);
                }
                self.schedule(
                    &handle,
                    TimerKey::Disconnect(player_id.clone()),
                    self.config.disconnect_grace,
                );
            }
        }

        if self.config.start_grace.is_zero() {
            self.start_locked(&handle, &mut session).await;
        } else {
            self.schedule(&handle, TimerKey::StartGrace, self.config.start_grace);
        }
    }

    // Session

    pub async fn mark_ready(&self, player_id: &str, session_id: &str) -> Result<(), DuelServiceError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        let started = session.mark_ready(
            player_id,
            self.clock.now(),
            chrono_duration(self.config.duel_duration),
        )?;
        if started {
            self.announce_start(&handle, &session).await;
        }
        Ok(())
    }

    async fn start_locked(&self, handle: &SessionHandle, session: &mut DuelSession) {
        if session.state() != DuelState::WaitingStart {
            return;
        }
        match session.start(self.clock.now(), chrono_duration(self.config.duel_duration)) {
            Ok(()) => self.announce_start(handle, session).await,
            Err(err) => warn!("Could not start session {}: {}", session.session_id(), err),
        }
    }

    async fn announce_start(&self, handle: &SessionHandle, session: &DuelSession) {
        handle.timers().cancel(&TimerKey::StartGrace);
        self.schedule(handle, TimerKey::Deadline, self.config.duel_duration);
        let (Some(started_at), Some(deadline)) = (session.started_at(), session.deadline()) else {
            return;
        };
        info!(
            "Session {} started, deadline {}",
            session.session_id(),
            deadline
        );
        self.notifications
            .broadcast(
                &session.player_ids(),
                &ServerEvent::GameStart {
                    session_id: session.session_id().to_string(),
                    started_at,
                    deadline,
                },
            )
            .await;
    }

    pub async fn run_code(
        &self,
        player_id: &str,
        session_id: &str,
        code: &str,
        language: Language,
    ) -> Result<(), DuelServiceError> {
        self.attempt(player_id, session_id, SubmissionMode::Run, code, language)
            .await
    }

    pub async fn submit_code(
        &self,
        player_id: &str,
        session_id: &str,
        code: &str,
        language: Language,
    ) -> Result<(), DuelServiceError> {
        self.attempt(player_id, session_id, SubmissionMode::Submit, code, language)
            .await
    }

    /// Registers the attempt under the session lock, grades it with the lock released,
    /// then applies the verdict under the lock again.
    async fn attempt(
        &self,
        player_id: &str,
        session_id: &str,
        mode: SubmissionMode,
        code: &str,
        language: Language,
    ) -> Result<(), DuelServiceError> {
        let handle = self.handle(session_id).await?;
        let (attempt, question) = {
            let mut session = handle.lock().await;
            let attempt =
                session.begin_attempt(player_id, mode, code, language, self.clock.now())?;
            info!(
                "Attempt {} ({:?}) by {} in session {}",
                attempt.attempt_id, mode, player_id, session_id
            );
            self.notifications
                .notify(
                    player_id,
                    &ServerEvent::AttemptAccepted {
                        session_id: session_id.to_string(),
                        attempt_id: attempt.attempt_id,
                    },
                )
                .await;
            self.relay_progress(&session, player_id).await;
            (attempt, session.question().clone())
        };

        let outcome = self.grading.grade(&question, &attempt).await;

        let closing = {
            let mut session = handle.lock().await;
            if session.state().is_terminal() {
                warn!(
                    "Discarding late judge response for attempt {} in closed session {}",
                    attempt.attempt_id, session_id
                );
                return Ok(());
            }
            match session.complete_attempt(player_id, attempt.attempt_id, outcome) {
                Ok((resolved, decision)) => {
                    self.notifications
                        .notify(player_id, &result_event(session_id, &resolved))
                        .await;
                    self.relay_progress(&session, player_id).await;
                    match decision {
                        Decision::Conclude => {
                            self.finish_locked(&handle, &mut session, Termination::Concluded)
                                .await
                        }
                        Decision::Continue
                            if session.submissions_closed()
                                && !session.has_pending_submit_in_time() =>
                        {
                            info!(
                                "Last in-time submit resolved for session {}, closing",
                                session_id
                            );
                            self.finish_locked(&handle, &mut session, Termination::DeadlineExpired)
                                .await
                        }
                        Decision::Hold => {
                            info!(
                                "Session {} holding for an earlier pending submit",
                                session_id
                            );
                            None
                        }
                        Decision::Continue => None,
                    }
                }
                Err(err) => self.force_abort_locked(&handle, &mut session, &err).await,
            }
        };

        if let Some(closing) = closing {
            self.close(closing).await;
        }
        Ok(())
    }

    pub async fn player_status(
        &self,
        player_id: &str,
        session_id: &str,
        activity: PlayerActivity,
    ) -> Result<(), DuelServiceError> {
        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        session.set_activity(player_id, activity)?;
        self.relay_progress(&session, player_id).await;
        Ok(())
    }

    /// Leaving an active duel forfeits it. Leaving before the start aborts the session.
    pub async fn leave_game(&self, player_id: &str, session_id: &str) -> Result<(), DuelServiceError> {
        let handle = self.handle(session_id).await?;
        let closing = {
            let mut session = handle.lock().await;
            if session.seat_of(player_id).is_none() {
                return Err(DuelServiceError::NotInSession(player_id.to_string()));
            }
            match session.state() {
                DuelState::WaitingStart => {
                    self.abort_locked(&handle, &mut session, "player_left").await
                }
                DuelState::InProgress | DuelState::GradingPending(_) => {
                    info!("Player {} left session {}", player_id, session_id);
                    self.finish_locked(
                        &handle,
                        &mut session,
                        Termination::Forfeit {
                            absent: player_id.to_string(),
                        },
                    )
                    .await
                }
                DuelState::Finished | DuelState::Aborted => {
                    return Err(TransitionError::SessionClosed.into())
                }
            }
        };
        if let Some(closing) = closing {
            self.close(closing).await;
        }
        Ok(())
    }

    /// Stops accepting work and aborts every live session.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let handles = self.directory.all().await;
        info!("Shutting down, aborting {} sessions", handles.len());
        for handle in handles {
            let closing = {
                let mut session = handle.lock().await;
                self.abort_locked(&handle, &mut session, "shutdown").await
            };
            if let Some(closing) = closing {
                self.close(closing).await;
            }
        }
    }

    // Timers

    fn schedule(&self, handle: &SessionHandle, key: TimerKey, after: Duration) {
        let Some(service) = self.me.upgrade() else {
            return;
        };
        let session_id = handle.session_id().to_string();
        let fired = key.clone();
        handle.timers().schedule(key, after, async move {
            service.on_timer(&session_id, fired).await;
        });
    }

    async fn on_timer(&self, session_id: &str, key: TimerKey) {
        let Some(handle) = self.directory.get(session_id).await else {
            debug!("{:?} timer fired for retired session {}", key, session_id);
            return;
        };
        let closing = {
            let mut session = handle.lock().await;
            if session.state().is_terminal() {
                return;
            }
            match key {
                TimerKey::StartGrace => {
                    self.start_locked(&handle, &mut session).await;
                    None
                }
                TimerKey::Deadline => {
                    if !session.state().is_active() {
                        return;
                    }
                    if session.close_submissions() {
                        info!(
                            "Deadline reached for session {}, waiting on a submit made in time",
                            session_id
                        );
                        self.schedule(&handle, TimerKey::Overtime, self.config.judge_timeout);
                        None
                    } else {
                        info!("Deadline reached for session {}", session_id);
                        self.finish_locked(&handle, &mut session, Termination::DeadlineExpired)
                            .await
                    }
                }
                TimerKey::Overtime => {
                    warn!(
                        "Submit in session {} still ungraded after the deadline, closing",
                        session_id
                    );
                    self.finish_locked(&handle, &mut session, Termination::DeadlineExpired)
                        .await
                }
                TimerKey::Disconnect(player_id) => {
                    let Some(seat) = session.seat_of(&player_id) else {
                        return;
                    };
                    if session.is_connected(seat) {
                        return;
                    }
                    info!(
                        "Player {} did not return to session {} in time",
                        player_id, session_id
                    );
                    if !session.is_connected(seat.other()) {
                        self.abort_locked(&handle, &mut session, "both_disconnected")
                            .await
                    } else if session.state() == DuelState::WaitingStart {
                        self.abort_locked(&handle, &mut session, "opponent_absent")
                            .await
                    } else {
                        self.finish_locked(
                            &handle,
                            &mut session,
                            Termination::Forfeit { absent: player_id },
                        )
                        .await
                    }
                }
            }
        };
        if let Some(closing) = closing {
            self.close(closing).await;
        }
    }

    // Terminal transitions

    async fn finish_locked(
        &self,
        handle: &SessionHandle,
        session: &mut DuelSession,
        termination: Termination,
    ) -> Option<Closing> {
        let record = self.outcome.resolve(session, &termination);
        if let Err(err) = session.finish(record.clone()) {
            return self.force_abort_locked(handle, session, &err).await;
        }
        handle.timers().cancel_all();
        self.notifications
            .broadcast(
                &session.player_ids(),
                &ServerEvent::GameEnd {
                    record: record.clone(),
                },
            )
            .await;
        Some(Closing {
            session_id: session.session_id().to_string(),
            player_ids: session.player_ids(),
            record: Some(record),
        })
    }

    async fn abort_locked(
        &self,
        handle: &SessionHandle,
        session: &mut DuelSession,
        reason: &str,
    ) -> Option<Closing> {
        if let Err(err) = session.abort(reason) {
            warn!("Could not abort session {}: {}", session.session_id(), err);
            return None;
        }
        handle.timers().cancel_all();
        info!("Session {} aborted: {}", session.session_id(), reason);
        self.notifications
            .broadcast(
                &session.player_ids(),
                &ServerEvent::SessionAborted {
                    session_id: session.session_id().to_string(),
                    reason: reason.to_string(),
                },
            )
            .await;
        Some(Closing {
            session_id: session.session_id().to_string(),
            player_ids: session.player_ids(),
            record: None,
        })
    }

    async fn force_abort_locked(
        &self,
        handle: &SessionHandle,
        session: &mut DuelSession,
        err: &TransitionError,
    ) -> Option<Closing> {
        error!(
            "Invariant violation in session {} ({:?}): {}",
            session.session_id(),
            session.state(),
            err
        );
        let closing = self
            .abort_locked(handle, session, "invariant_violation")
            .await;
        if closing.is_none() {
            handle.timers().cancel_all();
        }
        closing
    }

    async fn close(&self, closing: Closing) {
        self.directory.remove(&closing.session_id).await;
        for player_id in &closing.player_ids {
            self.matchmaking.release(player_id).await;
        }
        let Some(record) = closing.record else {
            return;
        };
        match self.game_ends.apply_game_end(&record).await {
            Ok(true) => info!("Recorded game end for session {}", closing.session_id),
            Ok(false) => info!(
                "Game end for session {} was already recorded",
                closing.session_id
            ),
            Err(err) => error!(
                "Failed to record game end for session {}: {}",
                closing.session_id, err
            ),
        }
    }

    async fn relay_progress(&self, session: &DuelSession, player_id: &str) {
        let Some(seat) = session.seat_of(player_id) else {
            return;
        };
        let progress = session.progress(seat);
        let opponent = &session.player(seat.other()).id;
        self.notifications
            .notify(
                opponent,
                &ServerEvent::OpponentProgress {
                    session_id: session.session_id().to_string(),
                    activity: progress.activity,
                    total_passed: progress.total_passed,
                    total_tests: progress.total_tests,
                },
            )
            .await;
    }
}
