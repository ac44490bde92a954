pub mod duel_service;
pub mod errors;
pub mod grading_service;
pub mod matchmaking_service;
pub mod notification_service;
pub mod outcome_service;
pub mod rating_service;
pub mod session_directory;
pub mod session_timers;
