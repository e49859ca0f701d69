use crate::error::GameError;
use crate::events::{EventBus, MISSION_UNLOCKED, SESSION_UPDATE};
use crate::missions::{final_target, seed_missions, EquationSet};
use crate::models::{
    FinalProgress, MissionTimes, MissionTimesPatch, PhaseKey, Session, SessionRules, SessionState,
    SessionStatus, Team,
};
use crate::scoring::compute_score;
use crate::store::SessionStore;
use crate::validators::{validate_final, validate_mission, FinalCheck, MissionCheck};
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Session codes use an unambiguous alphabet (no 0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_ALLOC_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub code_length: usize,
    pub tick_interval: Duration,
    pub default_hint_penalty: u64,
    pub default_allow_partial: bool,
    pub require_justification: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            tick_interval: Duration::from_millis(1000),
            default_hint_penalty: 1,
            default_allow_partial: false,
            require_justification: true,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let env_num = |key: &str, fallback: u64| {
            std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(fallback)
        };
        let env_bool = |key: &str, fallback: bool| {
            std::env::var(key).ok().map(|v| v == "true").unwrap_or(fallback)
        };
        Self {
            code_length: (env_num("SESSION_CODE_LENGTH", defaults.code_length as u64) as usize)
                .max(1),
            tick_interval: Duration::from_millis(env_num(
                "TICK_INTERVAL_MS",
                defaults.tick_interval.as_millis() as u64,
            )),
            default_hint_penalty: env_num("HINT_PENALTY", defaults.default_hint_penalty),
            default_allow_partial: env_bool("ALLOW_PARTIAL", defaults.default_allow_partial),
            require_justification: env_bool(
                "REQUIRE_JUSTIFICATION",
                defaults.require_justification,
            ),
        }
    }
}

/// One cancellable periodic task per session code. `start` replaces any
/// existing task for the code so a session never gets double-decremented;
/// tasks are generation-tagged so a stale task exiting late cannot remove
/// its successor from the registry.
pub struct TimerScheduler {
    tasks: Arc<DashMap<String, (u64, JoinHandle<()>)>>,
    generation: AtomicU64,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self { tasks: Arc::new(DashMap::new()), generation: AtomicU64::new(0) }
    }
}

impl TimerScheduler {
    pub fn stop(&self, code: &str) {
        if let Some((_, (_, handle))) = self.tasks.remove(code) {
            handle.abort();
        }
    }

    pub fn is_running(&self, code: &str) -> bool {
        self.tasks.get(code).map(|entry| !entry.1.is_finished()).unwrap_or(false)
    }

    fn start(&self, code: &str, interval: Duration, engine: Arc<GameEngine>) {
        self.stop(code);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let tasks = Arc::clone(&self.tasks);
        let owned_code = code.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately; skip it so the
            // countdown starts a full period after start().
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.tick_session(&owned_code).await {
                    break;
                }
            }
            tasks.remove_if(&owned_code, |_, (gen, _)| *gen == generation);
        });
        self.tasks.insert(code.to_string(), (generation, handle));
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionParams {
    #[serde(default)]
    pub timers: Option<MissionTimesPatch>,
    #[serde(default)]
    pub allow_partial: Option<bool>,
    #[serde(default)]
    pub hint_penalty: Option<u64>,
    #[serde(default)]
    pub equation_set: Option<EquationSet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvanceReason {
    Timeout,
    Completed,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    #[serde(flatten)]
    pub check: MissionCheck,
    pub score: u64,
    pub points_earned: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalOutcome {
    #[serde(flatten)]
    pub check: FinalCheck,
    pub score: u64,
    pub points_earned: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HintOutcome {
    pub hints: u64,
    pub score: u64,
}

/// The session lifecycle state machine. All mutation is serialized
/// through one write gate (single-writer discipline), so request
/// handlers and timer ticks never interleave on the same state, and
/// reads taken under the gate observe consistent snapshots.
pub struct GameEngine {
    store: Arc<dyn SessionStore>,
    pub events: EventBus,
    pub scheduler: TimerScheduler,
    config: GameConfig,
    write_gate: Mutex<()>,
}

impl GameEngine {
    pub fn new(store: Arc<dyn SessionStore>, config: GameConfig) -> Self {
        Self {
            store,
            events: EventBus::new(),
            scheduler: TimerScheduler::default(),
            config,
            write_gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn random_code(&self) -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        (0..self.config.code_length)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    async fn allocate_code(&self) -> Result<String, GameError> {
        for _ in 0..CODE_ALLOC_ATTEMPTS {
            let code = self.random_code();
            if self.store.session(&code).await.is_none() {
                return Ok(code);
            }
        }
        Err(GameError::StateConflict("could not allocate a unique session code".into()))
    }

    fn validated_times(patch: Option<&MissionTimesPatch>) -> Result<MissionTimes, GameError> {
        let mut times = MissionTimes::default();
        if let Some(patch) = patch {
            for v in [patch.m1, patch.m2, patch.m3, patch.final_phase].into_iter().flatten() {
                if v == 0 {
                    return Err(GameError::Validation("timers must be positive".into()));
                }
            }
            times.merge(patch);
        }
        Ok(times)
    }

    pub async fn create_session(
        &self,
        teacher_name: &str,
        params: CreateSessionParams,
    ) -> Result<Session, GameError> {
        if teacher_name.trim().is_empty() {
            return Err(GameError::Validation("teacherName must not be empty".into()));
        }
        let _gate = self.write_gate.lock().await;

        let code = self.allocate_code().await?;
        let set = params.equation_set.unwrap_or_default();
        let mission_times = Self::validated_times(params.timers.as_ref())?;
        let session = Session {
            code: code.clone(),
            teacher_name: teacher_name.trim().to_string(),
            status: SessionStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            current_mission: PhaseKey::M1,
            total_time_remaining: 0,
            mission_times,
            rules: SessionRules {
                allow_partial: params.allow_partial.unwrap_or(self.config.default_allow_partial),
                hint_penalty: params.hint_penalty.unwrap_or(self.config.default_hint_penalty),
            },
            missions: seed_missions(set)?,
            final_target: final_target(set)?,
            teams: Vec::new(),
        };
        self.store.create_session(session.clone()).await;
        info!(code = %code, set = set.key(), "session created");
        self.emit_update(&session);
        Ok(session)
    }

    pub async fn join_team(&self, code: &str, team_name: &str) -> Result<Team, GameError> {
        if team_name.trim().is_empty() {
            return Err(GameError::Validation("teamName must not be empty".into()));
        }
        let _gate = self.write_gate.lock().await;

        let mut session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        if session.status != SessionStatus::Waiting {
            return Err(GameError::SessionAlreadyStarted(code.to_string()));
        }

        let team = Team::new(code, session.teams.len() + 1, team_name.trim().to_string());
        session.teams.push(team.id.clone());
        self.store.save_team(team.clone()).await;
        self.store.save_session(session.clone()).await;
        self.emit_update(&session);
        Ok(team)
    }

    pub async fn update_timers(
        &self,
        code: &str,
        patch: MissionTimesPatch,
    ) -> Result<MissionTimes, GameError> {
        for v in [patch.m1, patch.m2, patch.m3, patch.final_phase].into_iter().flatten() {
            if v == 0 {
                return Err(GameError::Validation("timers must be positive".into()));
            }
        }
        let _gate = self.write_gate.lock().await;

        let session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        if session.status != SessionStatus::Waiting {
            return Err(GameError::StateConflict(
                "timers can only change before the session starts".into(),
            ));
        }
        if !self.store.update_session_timers(code, &patch).await {
            return Err(GameError::SessionNotFound(code.to_string()));
        }
        let session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        self.emit_update(&session);
        Ok(session.mission_times)
    }

    /// Waiting -> Active: the shared countdown begins at the m1 budget.
    pub async fn start_session(self: Arc<Self>, code: &str) -> Result<(), GameError> {
        let _gate = self.write_gate.lock().await;

        let mut session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        if session.status != SessionStatus::Waiting {
            return Err(GameError::StateConflict("session has already started".into()));
        }
        session.status = SessionStatus::Active;
        session.started_at = Some(Utc::now());
        session.current_mission = PhaseKey::M1;
        session.total_time_remaining = session.mission_times.m1;
        self.store.save_session(session.clone()).await;

        self.scheduler.start(code, self.config.tick_interval, Arc::clone(&self));
        info!(code = %code, "session started");
        self.emit_update(&session);
        Ok(())
    }

    /// Explicit teacher stop, from any live state. Finished is terminal.
    pub async fn finish_session(&self, code: &str) -> Result<(), GameError> {
        let _gate = self.write_gate.lock().await;

        let mut session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        if session.status == SessionStatus::Finished {
            return Err(GameError::StateConflict("session is already finished".into()));
        }
        session.status = SessionStatus::Finished;
        session.finished_at = Some(Utc::now());
        session.total_time_remaining = 0;
        self.store.save_session(session.clone()).await;
        self.scheduler.stop(code);
        info!(code = %code, "session finished by teacher");
        self.emit_update(&session);
        Ok(())
    }

    /// One countdown step. Returns whether the timer task should keep
    /// ticking. Timer-triggered exhaustion advances the whole session.
    pub async fn tick_session(&self, code: &str) -> bool {
        let _gate = self.write_gate.lock().await;

        let Some(mut session) = self.store.session(code).await else {
            return false;
        };
        if session.status != SessionStatus::Active {
            return false;
        }
        if session.total_time_remaining > 0 {
            session.total_time_remaining -= 1;
            if session.total_time_remaining == 0 {
                info!(code = %code, mission = session.current_mission.as_str(), "mission time expired");
                self.advance(&mut session, AdvanceReason::Timeout).await;
            }
        }
        self.store.save_session(session.clone()).await;
        self.emit_update(&session);
        session.status == SessionStatus::Active
    }

    /// Move to the next phase, or finish after the final one. Only a
    /// timeout marks the unsolved teams of the phase being left; a
    /// completion-driven advance leaves other teams' records untouched
    /// (the shared clock simply moves on).
    async fn advance(&self, session: &mut Session, reason: AdvanceReason) {
        let leaving = session.current_mission;
        if reason == AdvanceReason::Timeout {
            for id in session.teams.clone() {
                if let Some(mut team) = self.store.team(&id).await {
                    if !team.progress.is_solved(leaving) {
                        team.progress.mark_expired(leaving);
                        self.store.save_team(team).await;
                    }
                }
            }
        }
        match leaving.next() {
            Some(next) => {
                session.current_mission = next;
                session.total_time_remaining = session.mission_times.budget(next);
                self.events.emit(
                    &session.code,
                    MISSION_UNLOCKED,
                    json!({ "mission": next, "totalTimeRemaining": session.total_time_remaining }),
                );
            }
            None => {
                session.status = SessionStatus::Finished;
                session.finished_at = Some(Utc::now());
                session.total_time_remaining = 0;
                info!(code = %session.code, "session finished");
            }
        }
    }

    /// Completing the *current* phase advances the whole session,
    /// exactly once per completion event.
    async fn on_phase_completed(&self, session: &mut Session, phase: PhaseKey) {
        if session.status != SessionStatus::Active || phase != session.current_mission {
            return;
        }
        self.advance(session, AdvanceReason::Completed).await;
        self.store.save_session(session.clone()).await;
        if session.status == SessionStatus::Finished {
            self.scheduler.stop(&session.code);
        }
    }

    pub async fn submit_mission(
        &self,
        team_id: &str,
        mission_key: &str,
        payload: Value,
    ) -> Result<SubmitOutcome, GameError> {
        let Some(key) = PhaseKey::parse_mission(mission_key) else {
            return Err(GameError::MissionNotFound(mission_key.to_string()));
        };
        let _gate = self.write_gate.lock().await;

        let mut team = self
            .store
            .team(team_id)
            .await
            .ok_or_else(|| GameError::TeamNotFound(team_id.to_string()))?;
        let mut session = self
            .store
            .session(&team.code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(team.code.clone()))?;
        let mission = session
            .mission(key)
            .ok_or_else(|| GameError::MissionNotFound(mission_key.to_string()))?;

        let result = validate_mission(&mission.func, &payload)?;

        let budget = session.mission_times.budget(key);
        let remaining = session.total_time_remaining;
        let Some(progress) = team.progress.mission_mut(key) else {
            return Err(GameError::MissionNotFound(mission_key.to_string()));
        };
        progress.attempts += 1;
        progress.answers = payload;

        let newly_correct = result.ok && !progress.is_correct;
        if newly_correct {
            progress.is_correct = true;
            progress.time_used = Some(budget.saturating_sub(remaining));
        }

        let old_score = team.score;
        team.score = compute_score(&session.mission_times, &session.rules, &team.progress);
        let points_earned = team.score.saturating_sub(old_score);
        self.store.save_team(team.clone()).await;

        if newly_correct {
            info!(team = %team.id, mission = key.as_str(), points = points_earned, "mission solved");
            self.on_phase_completed(&mut session, key).await;
        }
        self.emit_update(&session);

        Ok(SubmitOutcome { check: result, score: team.score, points_earned })
    }

    pub async fn submit_final(
        &self,
        team_id: &str,
        equation: &str,
        justification: &str,
    ) -> Result<FinalOutcome, GameError> {
        let _gate = self.write_gate.lock().await;

        let mut team = self
            .store
            .team(team_id)
            .await
            .ok_or_else(|| GameError::TeamNotFound(team_id.to_string()))?;
        let mut session = self
            .store
            .session(&team.code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(team.code.clone()))?;

        let check = validate_final(
            &session.final_target.polynomial,
            equation,
            justification,
            self.config.require_justification,
        );

        // A solved final phase stays solved; later attempts are ignored
        // for record and progression alike.
        let newly_correct = check.ok && !team.progress.final_phase.is_correct;
        if !team.progress.final_phase.is_correct {
            let budget = session.mission_times.final_phase;
            let time_used = budget.saturating_sub(session.total_time_remaining);
            team.progress.final_phase = FinalProgress {
                equation: equation.to_string(),
                justification: justification.to_string(),
                is_correct: check.ok,
                time_used: Some(time_used),
                time_expired: team.progress.final_phase.time_expired,
            };
        }

        let old_score = team.score;
        team.score = compute_score(&session.mission_times, &session.rules, &team.progress);
        let points_earned = team.score.saturating_sub(old_score);
        self.store.save_team(team.clone()).await;

        if newly_correct {
            info!(team = %team.id, points = points_earned, "final phase solved");
            self.on_phase_completed(&mut session, PhaseKey::Final).await;
        }
        self.emit_update(&session);

        Ok(FinalOutcome { check, score: team.score, points_earned })
    }

    pub async fn use_hint(&self, team_id: &str, mission_key: &str) -> Result<HintOutcome, GameError> {
        let Some(key) = PhaseKey::parse_mission(mission_key) else {
            return Err(GameError::MissionNotFound(mission_key.to_string()));
        };
        let _gate = self.write_gate.lock().await;

        let mut team = self
            .store
            .team(team_id)
            .await
            .ok_or_else(|| GameError::TeamNotFound(team_id.to_string()))?;
        let session = self
            .store
            .session(&team.code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(team.code.clone()))?;

        let Some(progress) = team.progress.mission_mut(key) else {
            return Err(GameError::MissionNotFound(mission_key.to_string()));
        };
        progress.hints += 1;
        let hints = progress.hints;
        team.score = compute_score(&session.mission_times, &session.rules, &team.progress);
        self.store.save_team(team.clone()).await;
        self.emit_update(&session);
        Ok(HintOutcome { hints, score: team.score })
    }

    /// Consistent read snapshot, taken under the same gate as mutations.
    pub async fn session_state(&self, code: &str) -> Result<SessionState, GameError> {
        let _gate = self.write_gate.lock().await;
        let session = self
            .store
            .session(code)
            .await
            .ok_or_else(|| GameError::SessionNotFound(code.to_string()))?;
        let teams = self.store.teams_by_session(code).await;
        Ok(SessionState::project(&session, teams))
    }

    fn emit_update(&self, session: &Session) {
        self.events.emit(
            &session.code,
            SESSION_UPDATE,
            json!({
                "code": session.code,
                "status": session.status,
                "currentMission": session.current_mission,
                "totalTimeRemaining": session.total_time_remaining,
            }),
        );
    }
}
