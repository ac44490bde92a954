use crate::models::game_end::GameEndReason;

#[cfg(test)]
use mockall::automock;

/// External rating function. For a draw the first argument is player_a's rating
/// and the returned pair is (delta_a, delta_b).
#[cfg_attr(test, automock)]
pub trait RatingCalculator: Send + Sync {
    fn rating_deltas(&self, winner_rating: i32, loser_rating: i32, reason: GameEndReason)
        -> (i32, i32);
}

/// Zero-sum Elo update.
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    k_factor: f64,
}

impl EloRatingCalculator {
    pub fn new(k_factor: f64) -> Self {
        EloRatingCalculator { k_factor }
    }

    fn expected_score(rating: i32, opponent: i32) -> f64 {
        1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
    }
}

impl RatingCalculator for EloRatingCalculator {
    fn rating_deltas(
        &self,
        winner_rating: i32,
        loser_rating: i32,
        reason: GameEndReason,
    ) -> (i32, i32) {
        let score = match reason {
            GameEndReason::Draw => 0.5,
            _ => 1.0,
        };
        let expected = Self::expected_score(winner_rating, loser_rating);
        let delta = (self.k_factor * (score - expected)).round() as i32;
        (delta, -delta)
    }
}
