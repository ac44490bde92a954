use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::game_end::GameEndRecord;
use crate::models::grading::SubmissionMode;
use crate::models::player::{Player, PlayerId, PublicProfile};
use crate::models::question::{Language, QuestionRef};
use crate::models::submission::{AttemptId, AttemptOutcome, SubmissionAttempt};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "state", content = "pending", rename_all = "snake_case")]
pub enum DuelState {
    WaitingStart,
    InProgress,
    /// Number of attempts currently out at the judge.
    GradingPending(usize),
    Finished,
    Aborted,
}

impl DuelState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DuelState::Finished | DuelState::Aborted)
    }

    /// States that accept run/submit requests.
    pub fn is_active(&self) -> bool {
        matches!(self, DuelState::InProgress | DuelState::GradingPending(_))
    }
}

/// Join order inside the session. `A` came from the older ticket and wins exact ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Seat {
    A,
    B,
}

impl Seat {
    pub fn other(self) -> Seat {
        match self {
            Seat::A => Seat::B,
            Seat::B => Seat::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Seat::A => 0,
            Seat::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerActivity {
    Waiting,
    Typing,
    Idle,
    Running,
    Submitting,
    Submitted,
}

/// Public progress of a player: counts only, never code or hidden test detail.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerProgress {
    pub activity: PlayerActivity,
    pub attempts: usize,
    pub total_passed: Option<u32>,
    pub total_tests: Option<u32>,
}

/// State replayed to a client that reconnects.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: DuelState,
    pub question: QuestionRef,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub opponent: PublicProfile,
    pub opponent_connected: bool,
    pub opponent_progress: PlayerProgress,
    pub own_attempts: Vec<SubmissionAttempt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionError {
    NotAParticipant(String),
    /// The request is not valid in the session's current state.
    InvalidState(DuelState),
    DeadlinePassed,
    SubmissionInFlight,
    UnknownAttempt(AttemptId),
    /// Terminal sessions accept nothing further.
    SessionClosed,
    InvariantViolation(String),
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionError::NotAParticipant(id) => {
                write!(f, "Player {} is not part of this session", id)
            }
            TransitionError::InvalidState(state) => {
                write!(f, "Operation not allowed in state {:?}", state)
            }
            TransitionError::DeadlinePassed => write!(f, "The duel deadline has passed"),
            TransitionError::SubmissionInFlight => {
                write!(f, "An attempt is already being graded")
            }
            TransitionError::UnknownAttempt(id) => write!(f, "Unknown attempt {}", id),
            TransitionError::SessionClosed => write!(f, "Session has already ended"),
            TransitionError::InvariantViolation(msg) => {
                write!(f, "Invariant violation: {}", msg)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// What the orchestrator should do after an attempt resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No successful submit yet.
    Continue,
    /// A successful submit exists but an earlier opponent submit is still being graded.
    Hold,
    /// The outcome is settled; run the resolver.
    Conclude,
}

#[derive(Debug, Clone)]
struct PlayerSeat {
    player: Player,
    ready: bool,
    connected: bool,
    activity: PlayerActivity,
    attempts: Vec<SubmissionAttempt>,
}

impl PlayerSeat {
    fn new(player: Player) -> Self {
        PlayerSeat {
            player,
            ready: false,
            connected: true,
            activity: PlayerActivity::Waiting,
            attempts: Vec::new(),
        }
    }

    fn pending(&self) -> Option<&SubmissionAttempt> {
        self.attempts.iter().find(|a| a.is_pending())
    }
}

/// Per-match state machine. Owned by exactly one session handle and only
/// mutated while that handle's lock is held.
#[derive(Debug, Clone)]
pub struct DuelSession {
    session_id: SessionId,
    seats: [PlayerSeat; 2],
    question: QuestionRef,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    state: DuelState,
    /// Set once the deadline timer fired while a submit was still at the judge.
    submissions_closed: bool,
    next_attempt_id: AttemptId,
    outcome: Option<GameEndRecord>,
    abort_reason: Option<String>,
}

impl DuelSession {
    pub fn new(
        session_id: &str,
        player_a: Player,
        player_b: Player,
        question: QuestionRef,
        created_at: DateTime<Utc>,
    ) -> Self {
        DuelSession {
            session_id: session_id.to_string(),
            seats: [PlayerSeat::new(player_a), PlayerSeat::new(player_b)],
            question,
            created_at,
            started_at: None,
            deadline: None,
            state: DuelState::WaitingStart,
            submissions_closed: false,
            next_attempt_id: 1,
            outcome: None,
            abort_reason: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> DuelState {
        self.state
    }

    pub fn question(&self) -> &QuestionRef {
        &self.question
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn outcome(&self) -> Option<&GameEndRecord> {
        self.outcome.as_ref()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn player(&self, seat: Seat) -> &Player {
        &self.seats[seat.index()].player
    }

    pub fn player_a(&self) -> &Player {
        self.player(Seat::A)
    }

    pub fn player_b(&self) -> &Player {
        self.player(Seat::B)
    }

    pub fn player_ids(&self) -> [PlayerId; 2] {
        [self.player_a().id.clone(), self.player_b().id.clone()]
    }

    pub fn seat_of(&self, player_id: &str) -> Option<Seat> {
        if self.seats[0].player.id == player_id {
            Some(Seat::A)
        } else if self.seats[1].player.id == player_id {
            Some(Seat::B)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<&Player> {
        self.seat_of(player_id).map(|seat| self.player(seat.other()))
    }

    pub fn is_connected(&self, seat: Seat) -> bool {
        self.seats[seat.index()].connected
    }

    pub fn attempts(&self, seat: Seat) -> &[SubmissionAttempt] {
        &self.seats[seat.index()].attempts
    }

    pub fn pending_attempts(&self) -> usize {
        self.seats.iter().filter(|s| s.pending().is_some()).count()
    }

    fn seat_for(&self, player_id: &str) -> Result<Seat, TransitionError> {
        self.seat_of(player_id)
            .ok_or_else(|| TransitionError::NotAParticipant(player_id.to_string()))
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            Err(TransitionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Records a readiness acknowledgement. Returns true when this started the duel.
    pub fn mark_ready(
        &mut self,
        player_id: &str,
        now: DateTime<Utc>,
        duel_duration: chrono::Duration,
    ) -> Result<bool, TransitionError> {
        self.ensure_open()?;
        let seat = self.seat_for(player_id)?;
        if self.state != DuelState::WaitingStart {
            return Ok(false);
        }
        self.seats[seat.index()].ready = true;
        if self.seats.iter().all(|s| s.ready) {
            self.start(now, duel_duration)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Moves WAITING_START to IN_PROGRESS and fixes the deadline.
    pub fn start(
        &mut self,
        now: DateTime<Utc>,
        duel_duration: chrono::Duration,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        if self.state != DuelState::WaitingStart {
            return Err(TransitionError::InvalidState(self.state));
        }
        self.started_at = Some(now);
        self.deadline = Some(now + duel_duration);
        self.state = DuelState::InProgress;
        for seat in self.seats.iter_mut() {
            seat.activity = PlayerActivity::Idle;
        }
        Ok(())
    }

    /// Registers a new pending attempt. At most one pending attempt per player.
    pub fn begin_attempt(
        &mut self,
        player_id: &str,
        mode: SubmissionMode,
        code: &str,
        language: Language,
        now: DateTime<Utc>,
    ) -> Result<SubmissionAttempt, TransitionError> {
        self.ensure_open()?;
        let seat = self.seat_for(player_id)?;
        if !self.state.is_active() {
            return Err(TransitionError::InvalidState(self.state));
        }
        if self.submissions_closed || self.deadline.is_some_and(|deadline| now >= deadline) {
            return Err(TransitionError::DeadlinePassed);
        }
        if self.seats[seat.index()].pending().is_some() {
            return Err(TransitionError::SubmissionInFlight);
        }

        let attempt = SubmissionAttempt::new(
            self.next_attempt_id,
            player_id,
            mode,
            code,
            language,
            now,
        );
        self.next_attempt_id += 1;

        let slot = &mut self.seats[seat.index()];
        slot.activity = match mode {
            SubmissionMode::Run => PlayerActivity::Running,
            SubmissionMode::Submit => PlayerActivity::Submitting,
        };
        slot.attempts.push(attempt.clone());
        self.refresh_pending_state();
        Ok(attempt)
    }

    /// Applies the grading coordinator's verdict to a pending attempt.
    pub fn complete_attempt(
        &mut self,
        player_id: &str,
        attempt_id: AttemptId,
        outcome: AttemptOutcome,
    ) -> Result<(SubmissionAttempt, Decision), TransitionError> {
        self.ensure_open()?;
        let seat = self.seat_for(player_id)?;
        let slot = &mut self.seats[seat.index()];
        let attempt = slot
            .attempts
            .iter_mut()
            .find(|a| a.attempt_id == attempt_id)
            .ok_or(TransitionError::UnknownAttempt(attempt_id))?;
        if !attempt.resolve(outcome) {
            return Err(TransitionError::InvariantViolation(format!(
                "attempt {} resolved twice",
                attempt_id
            )));
        }
        let resolved = attempt.clone();
        slot.activity = if resolved.mode == SubmissionMode::Submit {
            PlayerActivity::Submitted
        } else {
            PlayerActivity::Idle
        };

        self.refresh_pending_state();
        Ok((resolved, self.decision()))
    }

    fn refresh_pending_state(&mut self) {
        if !self.state.is_active() {
            return;
        }
        let pending = self.pending_attempts();
        self.state = if pending == 0 {
            DuelState::InProgress
        } else {
            DuelState::GradingPending(pending)
        };
    }

    /// Earliest successful submit, ties broken by seat (A before B).
    pub fn earliest_successful_submit(&self) -> Option<(Seat, &SubmissionAttempt)> {
        let deadline = self.deadline;
        [Seat::A, Seat::B]
            .into_iter()
            .flat_map(move |seat| {
                self.attempts(seat)
                    .iter()
                    .filter(move |a| {
                        a.is_successful_submit() && deadline.map_or(true, |d| a.submitted_at <= d)
                    })
                    .map(move |a| (seat, a))
            })
            .min_by_key(|(seat, a)| (a.submitted_at, *seat))
    }

    /// Whether a successful submit settles the outcome, or an earlier pending
    /// submit by the opponent could still overtake it.
    pub fn decision(&self) -> Decision {
        let Some((best_seat, best)) = self.earliest_successful_submit() else {
            return Decision::Continue;
        };
        let best_key = (best.submitted_at, best_seat);
        let overtakable = [Seat::A, Seat::B].into_iter().any(|seat| {
            self.seats[seat.index()].pending().is_some_and(|pending| {
                pending.mode == SubmissionMode::Submit && (pending.submitted_at, seat) < best_key
            })
        });
        if overtakable {
            Decision::Hold
        } else {
            Decision::Conclude
        }
    }

    /// Whether a submit made by the deadline is still being graded.
    pub fn has_pending_submit_in_time(&self) -> bool {
        let deadline = self.deadline;
        self.seats.iter().any(|seat| {
            seat.pending().is_some_and(|pending| {
                pending.mode == SubmissionMode::Submit
                    && deadline.map_or(true, |d| pending.submitted_at <= d)
            })
        })
    }

    /// Deadline reached. Refuses further attempts and reports whether the
    /// session must wait for an in-time submit before it can be resolved.
    pub fn close_submissions(&mut self) -> bool {
        self.submissions_closed = true;
        self.has_pending_submit_in_time()
    }

    pub fn submissions_closed(&self) -> bool {
        self.submissions_closed
    }

    /// Best completed submit: highest pass ratio, earlier submission on ties.
    pub fn best_submit(&self, seat: Seat) -> Option<&SubmissionAttempt> {
        self.attempts(seat)
            .iter()
            .filter(|a| a.graded_submit().is_some())
            .filter(|a| self.deadline.map_or(true, |d| a.submitted_at <= d))
            .fold(None, |best: Option<&SubmissionAttempt>, candidate| match best {
                None => Some(candidate),
                Some(current) => {
                    let current_ratio = current.graded_submit().map_or(0.0, |r| r.pass_ratio());
                    let candidate_ratio =
                        candidate.graded_submit().map_or(0.0, |r| r.pass_ratio());
                    if candidate_ratio > current_ratio {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            })
    }

    /// Milliseconds from the start of the duel to `at`.
    pub fn elapsed_ms(&self, at: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| (at - started).num_milliseconds().max(0) as u64)
    }

    pub fn progress(&self, seat: Seat) -> PlayerProgress {
        let slot = &self.seats[seat.index()];
        let best = self.best_submit(seat).and_then(|a| a.graded_submit());
        PlayerProgress {
            activity: slot.activity,
            attempts: slot.attempts.len(),
            total_passed: best.map(|r| r.total_passed),
            total_tests: best.map(|r| r.total_tests),
        }
    }

    pub fn set_activity(
        &mut self,
        player_id: &str,
        activity: PlayerActivity,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let seat = self.seat_for(player_id)?;
        let slot = &mut self.seats[seat.index()];
        // Running/submitting are owned by the grading flow.
        if slot.pending().is_none() {
            slot.activity = activity;
        }
        Ok(())
    }

    pub fn set_connected(&mut self, player_id: &str, connected: bool) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let seat = self.seat_for(player_id)?;
        self.seats[seat.index()].connected = connected;
        Ok(())
    }

    /// Commits the resolver's record. Exactly once per session.
    pub fn finish(&mut self, record: GameEndRecord) -> Result<(), TransitionError> {
        if self.outcome.is_some() {
            return Err(TransitionError::InvariantViolation(format!(
                "session {} already has a game end record",
                self.session_id
            )));
        }
        self.ensure_open()?;
        if record.session_id() != self.session_id {
            return Err(TransitionError::InvariantViolation(format!(
                "record for {} applied to session {}",
                record.session_id(),
                self.session_id
            )));
        }
        self.state = DuelState::Finished;
        self.outcome = Some(record);
        Ok(())
    }

    pub fn abort(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.state = DuelState::Aborted;
        self.abort_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn snapshot_for(&self, player_id: &str) -> Option<SessionSnapshot> {
        let seat = self.seat_of(player_id)?;
        let opponent = seat.other();
        Some(SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state,
            question: self.question.clone(),
            started_at: self.started_at,
            deadline: self.deadline,
            opponent: self.player(opponent).public_profile(),
            opponent_connected: self.is_connected(opponent),
            opponent_progress: self.progress(opponent),
            own_attempts: self.attempts(seat).to_vec(),
        })
    }
}
