pub mod duel_session;
pub mod game_end;
pub mod grading;
pub mod matchmaking;
pub mod messages;
pub mod player;
pub mod question;
pub mod submission;
