use std::sync::Arc;

use shared::repositories::connection_repository::InMemoryConnectionRepository;
use shared::services::duel_service::DuelService;

#[derive(Clone)]
pub struct AppState {
    pub duel_service: Arc<DuelService>,
    pub connections: Arc<InMemoryConnectionRepository>,
}
