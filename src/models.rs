use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

/// The four phases a session moves through, in strict order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKey {
    M1,
    M2,
    M3,
    Final,
}

impl PhaseKey {
    pub const ORDER: [PhaseKey; 4] = [PhaseKey::M1, PhaseKey::M2, PhaseKey::M3, PhaseKey::Final];

    pub fn next(self) -> Option<PhaseKey> {
        match self {
            PhaseKey::M1 => Some(PhaseKey::M2),
            PhaseKey::M2 => Some(PhaseKey::M3),
            PhaseKey::M3 => Some(PhaseKey::Final),
            PhaseKey::Final => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKey::M1 => "m1",
            PhaseKey::M2 => "m2",
            PhaseKey::M3 => "m3",
            PhaseKey::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<PhaseKey> {
        match s {
            "m1" => Some(PhaseKey::M1),
            "m2" => Some(PhaseKey::M2),
            "m3" => Some(PhaseKey::M3),
            "final" => Some(PhaseKey::Final),
            _ => None,
        }
    }

    /// Mission phases only, the ones a structured answer can target.
    pub fn parse_mission(s: &str) -> Option<PhaseKey> {
        PhaseKey::parse(s).filter(|k| *k != PhaseKey::Final)
    }
}

/// Per-phase time budgets in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionTimes {
    pub m1: u64,
    pub m2: u64,
    pub m3: u64,
    #[serde(rename = "final")]
    pub final_phase: u64,
}

impl Default for MissionTimes {
    fn default() -> Self {
        Self { m1: 600, m2: 600, m3: 600, final_phase: 480 }
    }
}

impl MissionTimes {
    pub fn budget(&self, key: PhaseKey) -> u64 {
        match key {
            PhaseKey::M1 => self.m1,
            PhaseKey::M2 => self.m2,
            PhaseKey::M3 => self.m3,
            PhaseKey::Final => self.final_phase,
        }
    }

    pub fn merge(&mut self, patch: &MissionTimesPatch) {
        if let Some(v) = patch.m1 {
            self.m1 = v;
        }
        if let Some(v) = patch.m2 {
            self.m2 = v;
        }
        if let Some(v) = patch.m3 {
            self.m3 = v;
        }
        if let Some(v) = patch.final_phase {
            self.final_phase = v;
        }
    }
}

/// Partial override of the per-phase budgets, valid only while waiting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MissionTimesPatch {
    pub m1: Option<u64>,
    pub m2: Option<u64>,
    pub m3: Option<u64>,
    #[serde(rename = "final")]
    pub final_phase: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRules {
    pub allow_partial: bool,
    pub hint_penalty: u64,
}

/// One scored puzzle tied to a specific quadratic. Immutable once the
/// session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub key: PhaseKey,
    pub name: String,
    pub func: String,
    pub description: String,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTarget {
    pub polynomial: String,
    pub factored: String,
    pub description: String,
    pub hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    pub teacher_name: String,
    pub status: SessionStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub current_mission: PhaseKey,
    pub total_time_remaining: u64,
    pub mission_times: MissionTimes,
    pub rules: SessionRules,
    pub missions: Vec<Mission>,
    pub final_target: FinalTarget,
    pub teams: Vec<String>,
}

impl Session {
    pub fn mission(&self, key: PhaseKey) -> Option<&Mission> {
        self.missions.iter().find(|m| m.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionProgress {
    pub answers: Value,
    pub is_correct: bool,
    pub hints: u64,
    pub attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_used: Option<u64>,
    pub time_expired: bool,
}

impl Default for MissionProgress {
    fn default() -> Self {
        Self {
            answers: Value::Object(Default::default()),
            is_correct: false,
            hints: 0,
            attempts: 0,
            time_used: None,
            time_expired: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalProgress {
    pub equation: String,
    pub justification: String,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_used: Option<u64>,
    pub time_expired: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProgress {
    pub m1: MissionProgress,
    pub m2: MissionProgress,
    pub m3: MissionProgress,
    #[serde(rename = "final")]
    pub final_phase: FinalProgress,
}

impl TeamProgress {
    pub fn mission(&self, key: PhaseKey) -> Option<&MissionProgress> {
        match key {
            PhaseKey::M1 => Some(&self.m1),
            PhaseKey::M2 => Some(&self.m2),
            PhaseKey::M3 => Some(&self.m3),
            PhaseKey::Final => None,
        }
    }

    pub fn mission_mut(&mut self, key: PhaseKey) -> Option<&mut MissionProgress> {
        match key {
            PhaseKey::M1 => Some(&mut self.m1),
            PhaseKey::M2 => Some(&mut self.m2),
            PhaseKey::M3 => Some(&mut self.m3),
            PhaseKey::Final => None,
        }
    }

    /// Whether the given phase has been solved, final included.
    pub fn is_solved(&self, key: PhaseKey) -> bool {
        match key {
            PhaseKey::Final => self.final_phase.is_correct,
            k => self.mission(k).map(|p| p.is_correct).unwrap_or(false),
        }
    }

    pub fn mark_expired(&mut self, key: PhaseKey) {
        match key {
            PhaseKey::Final => self.final_phase.time_expired = true,
            k => {
                if let Some(p) = self.mission_mut(k) {
                    p.time_expired = true;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub code: String,
    pub name: String,
    pub score: u64,
    pub progress: TeamProgress,
}

impl Team {
    pub fn new(code: &str, ordinal: usize, name: String) -> Self {
        Self {
            id: format!("{code}:{ordinal}"),
            code: code.to_string(),
            name,
            score: 0,
            progress: TeamProgress::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardEntry {
    pub id: String,
    pub name: String,
    pub score: u64,
}

/// Public surface of the final target: hints only. The polynomial and
/// its factored spelling are the answer and stay server-side.
#[derive(Debug, Clone, Serialize)]
pub struct FinalTargetPublic {
    pub description: String,
    pub hints: Vec<String>,
}

/// Externally visible snapshot of a session, assembled under the store
/// lock so readers never observe a half-mutated state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub code: String,
    pub status: SessionStatus,
    pub current_mission: PhaseKey,
    pub total_time_remaining: u64,
    pub mission_times: MissionTimes,
    pub rules: SessionRules,
    pub missions: Vec<Mission>,
    pub final_target: FinalTargetPublic,
    pub teams: Vec<Team>,
    pub scoreboard: Vec<ScoreboardEntry>,
}

impl SessionState {
    pub fn project(session: &Session, mut teams: Vec<Team>) -> Self {
        teams.sort_by(|a, b| a.id.cmp(&b.id));
        let mut scoreboard: Vec<ScoreboardEntry> = teams
            .iter()
            .map(|t| ScoreboardEntry { id: t.id.clone(), name: t.name.clone(), score: t.score })
            .collect();
        scoreboard.sort_by(|a, b| b.score.cmp(&a.score));
        Self {
            code: session.code.clone(),
            status: session.status,
            current_mission: session.current_mission,
            total_time_remaining: session.total_time_remaining,
            mission_times: session.mission_times,
            rules: session.rules.clone(),
            missions: session.missions.clone(),
            final_target: FinalTargetPublic {
                description: session.final_target.description.clone(),
                hints: session.final_target.hints.clone(),
            },
            teams,
            scoreboard,
        }
    }
}
