use std::sync::Arc;

use tracing::info;

use crate::models::duel_session::{DuelSession, Seat};
use crate::models::game_end::{GameEndReason, GameEndRecord};
use crate::services::rating_service::RatingCalculator;

/// Why the orchestrator is asking for a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A successful submit settled the duel.
    Concluded,
    DeadlineExpired,
    /// The given player left or stayed away past the grace period.
    Forfeit { absent: String },
}

/// Turns a session's final state into its one GameEndRecord.
///
/// Policy, in order:
/// 1. earliest successful submit before the deadline wins (`completed`), same-millisecond
///    ties go to player_a;
/// 2. forfeit: the player who stayed wins;
/// 3. otherwise the better best-submit pass ratio wins (`timeout`), an exact tie is a `draw`.
#[derive(Clone)]
pub struct OutcomeService {
    rating: Arc<dyn RatingCalculator>,
}

impl OutcomeService {
    pub fn new(rating: Arc<dyn RatingCalculator>) -> Self {
        OutcomeService { rating }
    }

    pub fn resolve(&self, session: &DuelSession, termination: &Termination) -> GameEndRecord {
        let record = if let Some((seat, _)) = session.earliest_successful_submit() {
            self.decided(session, seat, GameEndReason::Completed)
        } else if let Termination::Forfeit { absent } = termination {
            let winner = match session.seat_of(absent) {
                Some(absent_seat) => absent_seat.other(),
                None => Seat::A,
            };
            self.decided(session, winner, GameEndReason::Forfeit)
        } else {
            self.by_partial_correctness(session)
        };

        info!(
            "Session {} resolved: {:?}, winner {:?}",
            session.session_id(),
            record.reason(),
            record.winner_id()
        );
        record
    }

    fn by_partial_correctness(&self, session: &DuelSession) -> GameEndRecord {
        let ratio = |seat: Seat| {
            session
                .best_submit(seat)
                .and_then(|a| a.graded_submit())
                .map_or(0.0, |r| r.pass_ratio())
        };
        let (ratio_a, ratio_b) = (ratio(Seat::A), ratio(Seat::B));

        if ratio_a > ratio_b {
            self.decided(session, Seat::A, GameEndReason::Timeout)
        } else if ratio_b > ratio_a {
            self.decided(session, Seat::B, GameEndReason::Timeout)
        } else {
            let (a, b) = (session.player_a(), session.player_b());
            let (delta_a, delta_b) = self
                .rating
                .rating_deltas(a.rating, b.rating, GameEndReason::Draw);
            GameEndRecord::draw(
                session.session_id(),
                &a.id,
                &b.id,
                self.submit_time(session, Seat::A),
                self.submit_time(session, Seat::B),
                delta_a,
                delta_b,
            )
        }
    }

    fn decided(&self, session: &DuelSession, winner: Seat, reason: GameEndReason) -> GameEndRecord {
        let winner_player = session.player(winner);
        let loser_player = session.player(winner.other());
        let (delta_winner, delta_loser) =
            self.rating
                .rating_deltas(winner_player.rating, loser_player.rating, reason);

        let winner_time = match reason {
            GameEndReason::Completed => session
                .earliest_successful_submit()
                .and_then(|(_, attempt)| session.elapsed_ms(attempt.submitted_at)),
            _ => self.submit_time(session, winner),
        };

        GameEndRecord::decided(
            session.session_id(),
            &winner_player.id,
            &loser_player.id,
            reason,
            winner_time,
            self.submit_time(session, winner.other()),
            delta_winner,
            delta_loser,
        )
    }

    /// Time into the duel of the seat's best submit.
    fn submit_time(&self, session: &DuelSession, seat: Seat) -> Option<u64> {
        session
            .best_submit(seat)
            .and_then(|attempt| session.elapsed_ms(attempt.submitted_at))
    }
}
