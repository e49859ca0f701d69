use crate::models::{MissionTimesPatch, Session, Team};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage collaborator for sessions and teams. The in-memory default
/// below is the reference semantics; a persistent adapter is a drop-in
/// replacement (idempotent re-reads return the same logical state).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session);
    async fn session(&self, code: &str) -> Option<Session>;
    async fn save_session(&self, session: Session);
    async fn team(&self, id: &str) -> Option<Team>;
    async fn save_team(&self, team: Team);
    /// Teams of a session in join order.
    async fn teams_by_session(&self, code: &str) -> Vec<Team>;
    async fn update_session_timers(&self, code: &str, patch: &MissionTimesPatch) -> bool;
}

#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    teams: RwLock<HashMap<String, Team>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, session: Session) {
        self.sessions.write().await.insert(session.code.clone(), session);
    }

    async fn session(&self, code: &str) -> Option<Session> {
        self.sessions.read().await.get(code).cloned()
    }

    async fn save_session(&self, session: Session) {
        self.sessions.write().await.insert(session.code.clone(), session);
    }

    async fn team(&self, id: &str) -> Option<Team> {
        self.teams.read().await.get(id).cloned()
    }

    async fn save_team(&self, team: Team) {
        self.teams.write().await.insert(team.id.clone(), team);
    }

    async fn teams_by_session(&self, code: &str) -> Vec<Team> {
        let ids = match self.sessions.read().await.get(code) {
            Some(s) => s.teams.clone(),
            None => return Vec::new(),
        };
        let teams = self.teams.read().await;
        ids.iter().filter_map(|id| teams.get(id).cloned()).collect()
    }

    async fn update_session_timers(&self, code: &str, patch: &MissionTimesPatch) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(code) {
            Some(session) => {
                session.mission_times.merge(patch);
                true
            }
            None => false,
        }
    }
}
