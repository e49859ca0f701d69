use crate::models::{MissionTimes, PhaseKey, SessionRules, TeamProgress};

const MISSION_BASE_POINTS: u64 = 10;
const TIME_BONUS_STEP_SECS: u64 = 30;

/// Total score for a team: 10 points per solved phase plus one bonus
/// point per 30 unused seconds (when the solve time was recorded), minus
/// the hint penalty, floored at zero.
pub fn compute_score(times: &MissionTimes, rules: &SessionRules, progress: &TeamProgress) -> u64 {
    let mut total: u64 = 0;
    for key in PhaseKey::ORDER {
        let (is_correct, time_used) = match key {
            PhaseKey::M1 => (progress.m1.is_correct, progress.m1.time_used),
            PhaseKey::M2 => (progress.m2.is_correct, progress.m2.time_used),
            PhaseKey::M3 => (progress.m3.is_correct, progress.m3.time_used),
            PhaseKey::Final => {
                (progress.final_phase.is_correct, progress.final_phase.time_used)
            }
        };
        if !is_correct {
            continue;
        }
        let mut mission_score = MISSION_BASE_POINTS;
        if let Some(used) = time_used {
            let budget = times.budget(key);
            let remaining = budget.saturating_sub(used);
            mission_score += remaining / TIME_BONUS_STEP_SECS;
        }
        total += mission_score;
    }

    let hints_used = progress.m1.hints + progress.m2.hints + progress.m3.hints;
    let penalty = hints_used * rules.hint_penalty;
    total.saturating_sub(penalty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MissionProgress;

    fn rules(hint_penalty: u64) -> SessionRules {
        SessionRules { allow_partial: false, hint_penalty }
    }

    #[test]
    fn solved_mission_with_time_bonus() {
        let times = MissionTimes::default();
        let mut progress = TeamProgress::default();
        progress.m1 = MissionProgress {
            is_correct: true,
            time_used: Some(times.m1 - 90),
            ..Default::default()
        };
        // 10 base + floor(90 / 30) = 13.
        assert_eq!(compute_score(&times, &rules(1), &progress), 13);
    }

    #[test]
    fn unsolved_missions_score_nothing() {
        let times = MissionTimes::default();
        let progress = TeamProgress::default();
        assert_eq!(compute_score(&times, &rules(1), &progress), 0);
    }

    #[test]
    fn solve_without_recorded_time_earns_base_only() {
        let times = MissionTimes::default();
        let mut progress = TeamProgress::default();
        progress.m2.is_correct = true;
        assert_eq!(compute_score(&times, &rules(0), &progress), 10);
    }

    #[test]
    fn hint_penalty_subtracts_and_floors_at_zero() {
        let times = MissionTimes::default();
        let mut progress = TeamProgress::default();
        progress.m1.is_correct = true;
        progress.m1.time_used = Some(times.m1 - 90);
        progress.m1.hints = 2;
        assert_eq!(compute_score(&times, &rules(1), &progress), 11);

        // Hints without any solved mission cannot go negative.
        let mut broke = TeamProgress::default();
        broke.m1.hints = 5;
        broke.m2.hints = 4;
        assert_eq!(compute_score(&times, &rules(3), &broke), 0);
    }

    #[test]
    fn final_phase_counts_like_a_mission() {
        let times = MissionTimes::default();
        let mut progress = TeamProgress::default();
        progress.final_phase.is_correct = true;
        progress.final_phase.time_used = Some(times.final_phase - 60);
        // 10 base + floor(60 / 30) = 12.
        assert_eq!(compute_score(&times, &rules(1), &progress), 12);
    }

    #[test]
    fn overtime_solve_gets_no_bonus() {
        let mut times = MissionTimes::default();
        times.m1 = 60;
        let mut progress = TeamProgress::default();
        progress.m1.is_correct = true;
        progress.m1.time_used = Some(120);
        assert_eq!(compute_score(&times, &rules(0), &progress), 10);
    }
}
