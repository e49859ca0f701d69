pub mod equivalence;
pub mod error;
pub mod events;
pub mod game;
pub mod handlers;
pub mod math;
pub mod missions;
pub mod models;
pub mod routes;
pub mod scoring;
pub mod store;
pub mod validators;

use game::{GameConfig, GameEngine};
use std::sync::Arc;
use store::InMemoryStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GameEngine>,
}

pub fn build_state() -> AppState {
    build_state_with(GameConfig::from_env())
}

pub fn build_state_with(config: GameConfig) -> AppState {
    let store = Arc::new(InMemoryStore::new());
    AppState { engine: Arc::new(GameEngine::new(store, config)) }
}
