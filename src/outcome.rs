// Score/outcome state machine: maps a cumulative score to the game state
// and picks the narrative template used for the next oracle call.

use serde::{Deserialize, Serialize};

use crate::prompts;

/// Cumulative score at or above which the planet is saved.
pub const WIN_THRESHOLD: f64 = 200.0;
/// Cumulative score at or below which the planet is lost.
pub const LOSE_THRESHOLD: f64 = -50.0;

/// Where a game stands given its cumulative score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Continuing,
    Won,
    Lost,
}

impl Outcome {
    pub fn from_total_score(total_score: f64) -> Self {
        if total_score >= WIN_THRESHOLD {
            Outcome::Won
        } else if total_score <= LOSE_THRESHOLD {
            Outcome::Lost
        } else {
            Outcome::Continuing
        }
    }

    /// System instruction to prepend to the oracle prompt for this state.
    pub fn system_instruction(self) -> &'static str {
        match self {
            Outcome::Continuing => prompts::CONTINUING_INSTRUCTION,
            Outcome::Won => prompts::WON_INSTRUCTION,
            Outcome::Lost => prompts::LOST_INSTRUCTION,
        }
    }

    /// Only an ongoing game asks the oracle for a score delta.
    pub fn requests_delta(self) -> bool {
        matches!(self, Outcome::Continuing)
    }
}

/// Final status persisted with a game result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Won,
    Lost,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Won => "won",
            GameStatus::Lost => "lost",
        }
    }

    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "won" => Some(GameStatus::Won),
            "lost" => Some(GameStatus::Lost),
            _ => None,
        }
    }

    /// Status implied by a final score when the client does not report one.
    pub fn from_total_score(total_score: f64) -> Self {
        match Outcome::from_total_score(total_score) {
            Outcome::Won => GameStatus::Won,
            Outcome::Continuing | Outcome::Lost => GameStatus::Lost,
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_inclusive() {
        assert_eq!(Outcome::from_total_score(200.0), Outcome::Won);
        assert_eq!(Outcome::from_total_score(-50.0), Outcome::Lost);
        assert_eq!(Outcome::from_total_score(199.9), Outcome::Continuing);
        assert_eq!(Outcome::from_total_score(-49.9), Outcome::Continuing);
    }

    #[test]
    fn test_mapping_is_monotonic() {
        let mut last = Outcome::Lost;
        let rank = |o: Outcome| match o {
            Outcome::Lost => 0,
            Outcome::Continuing => 1,
            Outcome::Won => 2,
        };
        let mut score = -500.0;
        while score <= 500.0 {
            let current = Outcome::from_total_score(score);
            assert!(rank(current) >= rank(last), "regressed at {score}");
            last = current;
            score += 2.5;
        }
        assert_eq!(last, Outcome::Won);
    }

    #[test]
    fn test_only_continuing_requests_delta() {
        assert!(Outcome::Continuing.requests_delta());
        assert!(!Outcome::Won.requests_delta());
        assert!(!Outcome::Lost.requests_delta());
    }

    #[test]
    fn test_each_state_has_its_own_template() {
        let c = Outcome::Continuing.system_instruction();
        let w = Outcome::Won.system_instruction();
        let l = Outcome::Lost.system_instruction();
        assert_ne!(c, w);
        assert_ne!(w, l);
        assert_ne!(c, l);
        assert!(c.contains("+40 to +50"));
        assert!(w.contains("utopia"));
        assert!(l.contains("extinction"));
    }

    #[test]
    fn test_game_status_parsing() {
        assert_eq!(GameStatus::from_str_name("won"), Some(GameStatus::Won));
        assert_eq!(GameStatus::from_str_name(" LOST "), Some(GameStatus::Lost));
        assert_eq!(GameStatus::from_str_name("draw"), None);
        assert_eq!(GameStatus::from_total_score(250.0), GameStatus::Won);
        assert_eq!(GameStatus::from_total_score(10.0), GameStatus::Lost);
        assert_eq!(GameStatus::Won.to_string(), "won");
    }
}
