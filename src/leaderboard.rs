// End-of-game bookkeeping and leaderboard listing on top of a `LeaderboardStore`.

use serde::{Deserialize, Serialize};

use crate::db::{GameResult, LeaderboardSort, LeaderboardStore, NewGameResult, UpsertOutcome};
use crate::error::AppError;
use crate::metrics;
use crate::outcome::GameStatus;
use crate::session::normalize_nickname;

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Body of `POST /api/game/end`. Everything is optional so missing fields
/// can be reported as a 400 with a useful message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndGameRequest {
    pub nickname: Option<String>,
    #[serde(alias = "playerId")]
    pub player_id: Option<String>,
    #[serde(alias = "initialYears")]
    pub initial_years: Option<i64>,
    #[serde(alias = "finalYears")]
    pub final_years: Option<f64>,
    #[serde(alias = "totalScore")]
    pub total_score: Option<f64>,
    #[serde(alias = "actionsCount")]
    pub actions_count: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameSummary {
    pub message: String,
    pub id: i64,
    pub rank: i64,
    pub years_saved: f64,
    pub improved: bool,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(skip)]
    pub created: bool,
}

/// Record a finished run; only a strictly better score replaces the stored one.
pub async fn end_game(
    store: &dyn LeaderboardStore,
    req: EndGameRequest,
) -> Result<EndGameSummary, AppError> {
    let nickname = normalize_nickname(req.nickname.as_deref())?;
    let (Some(initial_years), Some(final_years), Some(total_score)) =
        (req.initial_years, req.final_years, req.total_score)
    else {
        return Err(AppError::validation(
            "nickname, initial_years, final_years and total_score are required",
        ));
    };
    if !final_years.is_finite() || !total_score.is_finite() {
        return Err(AppError::validation(
            "final_years and total_score must be finite numbers",
        ));
    }
    let actions_count = req.actions_count.unwrap_or(0);
    if actions_count < 0 {
        return Err(AppError::validation("actions_count must not be negative"));
    }
    let status = match req.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => GameStatus::from_str_name(s)
            .ok_or_else(|| AppError::validation("status must be 'won' or 'lost'"))?,
        None => GameStatus::from_total_score(total_score),
    };
    let player_id = req
        .player_id
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    let submission = NewGameResult {
        player_id,
        nickname,
        initial_years,
        final_years,
        total_score,
        actions_count,
        status: status.as_str().to_string(),
        played_at: chrono::Utc::now().to_rfc3339(),
    };
    let years_saved = final_years - initial_years as f64;

    let outcome = store.upsert_if_better(submission).await?;
    metrics::GAMES_ENDED_TOTAL
        .with_label_values(&[status.as_str(), outcome.label()])
        .inc();

    let record = outcome.record();
    let rank = store.rank_of(record.total_score).await?;

    let summary = match &outcome {
        UpsertOutcome::Created(r) => {
            tracing::info!(nickname = %r.nickname, score = r.total_score, rank, "New leaderboard entry");
            EndGameSummary {
                message: "Game result saved".to_string(),
                id: r.id,
                rank,
                years_saved,
                improved: true,
                status,
                best_score: None,
                created: true,
            }
        }
        UpsertOutcome::Updated(r) => {
            tracing::info!(nickname = %r.nickname, score = r.total_score, rank, "Leaderboard entry improved");
            EndGameSummary {
                message: "New best score saved".to_string(),
                id: r.id,
                rank,
                years_saved,
                improved: true,
                status,
                best_score: None,
                created: false,
            }
        }
        UpsertOutcome::Unchanged(r) => EndGameSummary {
            message: "Score did not beat the stored best".to_string(),
            id: r.id,
            rank,
            years_saved,
            improved: false,
            status,
            best_score: Some(r.total_score),
            created: false,
        },
    };
    Ok(summary)
}

/// One row of the public leaderboard. Never carries the session token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub id: i64,
    pub nickname: String,
    pub initial_years: i64,
    pub final_years: f64,
    pub total_score: f64,
    pub actions_count: i64,
    pub status: String,
    pub played_at: String,
    pub years_saved: f64,
}

impl From<GameResult> for LeaderboardEntry {
    fn from(r: GameResult) -> Self {
        let years_saved = r.years_saved();
        Self {
            id: r.id,
            nickname: r.nickname,
            initial_years: r.initial_years,
            final_years: r.final_years,
            total_score: r.total_score,
            actions_count: r.actions_count,
            status: r.status,
            played_at: r.played_at,
            years_saved,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub total_players: i64,
    pub limit: i64,
    pub sort_by: LeaderboardSort,
}

/// Top results, `limit` clamped to `1..=100`, ties broken by id.
pub async fn leaderboard(
    store: &dyn LeaderboardStore,
    limit: Option<i64>,
    sort_by: Option<&str>,
) -> Result<LeaderboardPage, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let sort = match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => LeaderboardSort::from_str_name(name)
            .ok_or_else(|| AppError::validation("sort_by must be 'score' or 'years_saved'"))?,
        None => LeaderboardSort::Score,
    };

    let rows = store.list(sort, limit).await?;
    let total_players = store.count().await?;

    Ok(LeaderboardPage {
        leaderboard: rows.into_iter().map(LeaderboardEntry::from).collect(),
        total_players,
        limit,
        sort_by: sort,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn req(nickname: &str, score: f64) -> EndGameRequest {
        EndGameRequest {
            nickname: Some(nickname.to_string()),
            player_id: None,
            initial_years: Some(50),
            final_years: Some(50.0 + score / 10.0),
            total_score: Some(score),
            actions_count: Some(4),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_first_game_creates_record_with_rank_one() {
        let store = MemoryStore::new();
        let summary = end_game(&store, req("Ava", 250.0)).await.unwrap();
        assert!(summary.created);
        assert!(summary.improved);
        assert_eq!(summary.rank, 1);
        assert_eq!(summary.status, GameStatus::Won);
        assert_eq!(summary.years_saved, 25.0);
        assert!(summary.best_score.is_none());
    }

    #[tokio::test]
    async fn test_non_improving_resubmission_is_read_only() {
        let store = MemoryStore::new();
        end_game(&store, req("Ava", 120.0)).await.unwrap();
        let stored = store.find_by_nickname("Ava").await.unwrap().unwrap();

        for score in [120.0, 60.0] {
            let summary = end_game(&store, req("Ava", score)).await.unwrap();
            assert!(!summary.improved);
            assert_eq!(summary.best_score, Some(120.0));
            assert_eq!(summary.rank, 1);
        }
        assert_eq!(store.find_by_nickname("Ava").await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_stored_scores_never_decrease() {
        let store = MemoryStore::new();
        let mut best = f64::MIN;
        for score in [10.0, 80.0, 40.0, 80.0, 150.0, -20.0, 149.0] {
            end_game(&store, req("Ava", score)).await.unwrap();
            let stored = store.find_by_nickname("Ava").await.unwrap().unwrap().total_score;
            assert!(stored >= best);
            best = stored;
        }
        assert_eq!(best, 150.0);
    }

    #[tokio::test]
    async fn test_rank_shares_ties() {
        let store = MemoryStore::new();
        for (name, score) in [("a", 300.0), ("b", 200.0), ("c", 200.0), ("d", 100.0)] {
            end_game(&store, req(name, score)).await.unwrap();
        }
        let summary = end_game(&store, req("c", 150.0)).await.unwrap();
        assert_eq!(summary.rank, 2);
        assert!(!summary.improved);
    }

    #[tokio::test]
    async fn test_missing_required_fields() {
        let store = MemoryStore::new();
        for broken in [
            EndGameRequest {
                nickname: None,
                ..req("x", 1.0)
            },
            EndGameRequest {
                initial_years: None,
                ..req("x", 1.0)
            },
            EndGameRequest {
                final_years: None,
                ..req("x", 1.0)
            },
            EndGameRequest {
                total_score: None,
                ..req("x", 1.0)
            },
            EndGameRequest {
                status: Some("draw".into()),
                ..req("x", 1.0)
            },
        ] {
            let err = end_game(&store, broken).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_explicit_status_wins_over_derived() {
        let store = MemoryStore::new();
        let summary = end_game(
            &store,
            EndGameRequest {
                status: Some("won".into()),
                ..req("Ava", 20.0)
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.status, GameStatus::Won);
    }

    #[tokio::test]
    async fn test_leaderboard_defaults_and_clamping() {
        let store = MemoryStore::new();
        for i in 0..15 {
            end_game(&store, req(&format!("p{i}"), i as f64 * 10.0)).await.unwrap();
        }

        let page = leaderboard(&store, None, None).await.unwrap();
        assert_eq!(page.limit, 10);
        assert_eq!(page.leaderboard.len(), 10);
        assert_eq!(page.total_players, 15);
        assert_eq!(page.sort_by, LeaderboardSort::Score);
        assert_eq!(page.leaderboard[0].nickname, "p14");

        let page = leaderboard(&store, Some(1000), Some("years_saved")).await.unwrap();
        assert_eq!(page.limit, 100);
        assert_eq!(page.leaderboard.len(), 15);

        let page = leaderboard(&store, Some(0), None).await.unwrap();
        assert_eq!(page.limit, 1);

        assert!(leaderboard(&store, None, Some("elo")).await.is_err());
    }

    #[test]
    fn test_entry_serialization() {
        let entry = LeaderboardEntry::from(GameResult {
            id: 7,
            player_id: Some("secret".into()),
            nickname: "Ava".into(),
            initial_years: 50,
            final_years: 72.5,
            total_score: 210.0,
            actions_count: 9,
            status: "won".into(),
            played_at: "2026-10-19T00:00:00+00:00".into(),
        });
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["years_saved"], 22.5);
        assert!(!v.to_string().contains("secret"));
    }
}
