pub mod duel_service_errors;
pub mod matchmaking_service_errors;
