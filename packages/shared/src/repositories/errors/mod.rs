pub mod connection_repository_errors;
pub mod game_end_repository_errors;
pub mod judge_repository_errors;
pub mod player_repository_errors;
