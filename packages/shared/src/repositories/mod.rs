pub mod connection_repository;
pub mod errors;
pub mod game_end_repository;
pub mod judge_repository;
pub mod player_repository;
pub mod question_repository;
