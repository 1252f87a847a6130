// Leaderboard persistence: repository trait plus the SQLite implementation (sqlx).

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("this player id is already bound to another nickname")]
    PlayerIdTaken,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Map unique violations on `player_id` to their own variant.
fn classify(e: sqlx::Error) -> StoreError {
    let taken = e
        .as_database_error()
        .map(|d| d.is_unique_violation() && d.message().contains("player_id"))
        .unwrap_or(false);
    if taken {
        StoreError::PlayerIdTaken
    } else {
        StoreError::Database(e)
    }
}

/// Best result of one nickname. `player_id` holds the session token and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameResult {
    pub id: i64,
    #[serde(skip_serializing)]
    pub player_id: Option<String>,
    pub nickname: String,
    pub initial_years: i64,
    pub final_years: f64,
    pub total_score: f64,
    pub actions_count: i64,
    pub status: String,
    pub played_at: String,
}

impl GameResult {
    pub fn years_saved(&self) -> f64 {
        self.final_years - self.initial_years as f64
    }
}

/// A finished run, as submitted at the end of a game.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGameResult {
    pub player_id: Option<String>,
    pub nickname: String,
    pub initial_years: i64,
    pub final_years: f64,
    pub total_score: f64,
    pub actions_count: i64,
    pub status: String,
    pub played_at: String,
}

/// What `upsert_if_better` did with a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(GameResult),
    Updated(GameResult),
    /// Not strictly better: the stored row, untouched.
    Unchanged(GameResult),
}

impl UpsertOutcome {
    pub fn record(&self) -> &GameResult {
        match self {
            UpsertOutcome::Created(r) | UpsertOutcome::Updated(r) | UpsertOutcome::Unchanged(r) => r,
        }
    }

    pub fn improved(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            UpsertOutcome::Created(_) => "created",
            UpsertOutcome::Updated(_) => "updated",
            UpsertOutcome::Unchanged(_) => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaderboardSort {
    Score,
    YearsSaved,
}

impl LeaderboardSort {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "score" => Some(LeaderboardSort::Score),
            "years_saved" | "yearsSaved" => Some(LeaderboardSort::YearsSaved),
            _ => None,
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            LeaderboardSort::Score => "total_score DESC, id ASC",
            LeaderboardSort::YearsSaved => "(final_years - initial_years) DESC, id ASC",
        }
    }
}

/// Storage seam for players and their best results.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<GameResult>, StoreError>;

    async fn find_by_player_id(&self, player_id: &str) -> Result<Option<GameResult>, StoreError>;

    /// Insert, or overwrite only when `total_score` strictly beats the stored one.
    /// Atomic with respect to concurrent calls for the same nickname.
    async fn upsert_if_better(&self, result: NewGameResult) -> Result<UpsertOutcome, StoreError>;

    /// 1 + number of results with a strictly greater score.
    async fn rank_of(&self, total_score: f64) -> Result<i64, StoreError>;

    async fn list(&self, sort: LeaderboardSort, limit: i64) -> Result<Vec<GameResult>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

const COLUMNS: &str = "id, player_id, nickname, initial_years, final_years, total_score, actions_count, status, played_at";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` is its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id TEXT UNIQUE,
                nickname TEXT NOT NULL UNIQUE,
                initial_years INTEGER NOT NULL,
                final_years REAL NOT NULL,
                total_score REAL NOT NULL,
                actions_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                played_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_game_results_total_score ON game_results(total_score)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LeaderboardStore for Database {
    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<GameResult>, StoreError> {
        let row = sqlx::query_as::<_, GameResult>(&format!(
            "SELECT {COLUMNS} FROM game_results WHERE nickname = ?"
        ))
        .bind(nickname)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_player_id(&self, player_id: &str) -> Result<Option<GameResult>, StoreError> {
        let row = sqlx::query_as::<_, GameResult>(&format!(
            "SELECT {COLUMNS} FROM game_results WHERE player_id = ?"
        ))
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_if_better(&self, result: NewGameResult) -> Result<UpsertOutcome, StoreError> {
        // Writes come first so the transaction holds the write lock from its
        // first statement; the score comparison lives inside the UPDATE itself.
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, GameResult>(&format!(
            r#"
            UPDATE game_results SET
                player_id = COALESCE(?, player_id),
                initial_years = ?,
                final_years = ?,
                total_score = ?,
                actions_count = ?,
                status = ?,
                played_at = ?
            WHERE nickname = ? AND total_score < ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&result.player_id)
        .bind(result.initial_years)
        .bind(result.final_years)
        .bind(result.total_score)
        .bind(result.actions_count)
        .bind(&result.status)
        .bind(&result.played_at)
        .bind(&result.nickname)
        .bind(result.total_score)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;

        let outcome = if let Some(row) = updated {
            UpsertOutcome::Updated(row)
        } else {
            let current = sqlx::query_as::<_, GameResult>(&format!(
                "SELECT {COLUMNS} FROM game_results WHERE nickname = ?"
            ))
            .bind(&result.nickname)
            .fetch_optional(&mut *tx)
            .await?;

            match current {
                Some(row) => UpsertOutcome::Unchanged(row),
                None => {
                    let row = sqlx::query_as::<_, GameResult>(&format!(
                        r#"
                        INSERT INTO game_results
                            (player_id, nickname, initial_years, final_years, total_score, actions_count, status, played_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        RETURNING {COLUMNS}
                        "#
                    ))
                    .bind(&result.player_id)
                    .bind(&result.nickname)
                    .bind(result.initial_years)
                    .bind(result.final_years)
                    .bind(result.total_score)
                    .bind(result.actions_count)
                    .bind(&result.status)
                    .bind(&result.played_at)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(classify)?;
                    UpsertOutcome::Created(row)
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn rank_of(&self, total_score: f64) -> Result<i64, StoreError> {
        let higher: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM game_results WHERE total_score > ?")
                .bind(total_score)
                .fetch_one(&self.pool)
                .await?;
        Ok(higher + 1)
    }

    async fn list(&self, sort: LeaderboardSort, limit: i64) -> Result<Vec<GameResult>, StoreError> {
        let rows = sqlx::query_as::<_, GameResult>(&format!(
            "SELECT {COLUMNS} FROM game_results ORDER BY {} LIMIT ?",
            sort.order_by()
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn run(nickname: &str, score: f64) -> NewGameResult {
        NewGameResult {
            player_id: None,
            nickname: nickname.to_string(),
            initial_years: 50,
            final_years: 60.0,
            total_score: score,
            actions_count: 3,
            status: "lost".to_string(),
            played_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_find() {
        let db = test_db().await;

        let outcome = db.upsert_if_better(run("Ava", 120.0)).await.unwrap();
        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(outcome.record().nickname, "Ava");
        assert_eq!(outcome.record().years_saved(), 10.0);

        let found = db.find_by_nickname("Ava").await.unwrap().unwrap();
        assert_eq!(found.total_score, 120.0);
        assert!(db.find_by_nickname("Bob").await.unwrap().is_none());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lower_score_leaves_row_untouched() {
        let db = test_db().await;

        let mut first = run("Ava", 150.0);
        first.played_at = "2026-01-01T00:00:00+00:00".to_string();
        let created = db.upsert_if_better(first).await.unwrap().record().clone();

        for score in [150.0, 90.0] {
            let outcome = db.upsert_if_better(run("Ava", score)).await.unwrap();
            assert!(!outcome.improved());
            assert_eq!(outcome.record(), &created);
        }
        assert_eq!(db.find_by_nickname("Ava").await.unwrap().unwrap(), created);
    }

    #[tokio::test]
    async fn test_higher_score_overwrites_in_place() {
        let db = test_db().await;

        let created = db.upsert_if_better(run("Ava", 10.0)).await.unwrap();
        let mut better = run("Ava", 220.0);
        better.status = "won".to_string();
        better.final_years = 95.5;
        let updated = db.upsert_if_better(better).await.unwrap();

        assert!(matches!(updated, UpsertOutcome::Updated(_)));
        let row = updated.record();
        assert_eq!(row.id, created.record().id);
        assert_eq!(row.total_score, 220.0);
        assert_eq!(row.status, "won");
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_player_id_is_kept_when_omitted() {
        let db = test_db().await;

        let mut first = run("Ava", 10.0);
        first.player_id = Some("token-a".to_string());
        db.upsert_if_better(first).await.unwrap();
        db.upsert_if_better(run("Ava", 20.0)).await.unwrap();

        let row = db.find_by_player_id("token-a").await.unwrap().unwrap();
        assert_eq!(row.nickname, "Ava");
        assert_eq!(row.total_score, 20.0);
    }

    #[tokio::test]
    async fn test_player_id_bound_to_other_nickname() {
        let db = test_db().await;

        let mut a = run("Ava", 10.0);
        a.player_id = Some("shared".to_string());
        db.upsert_if_better(a).await.unwrap();

        let mut b = run("Bob", 30.0);
        b.player_id = Some("shared".to_string());
        let err = db.upsert_if_better(b).await.unwrap_err();
        assert!(matches!(err, StoreError::PlayerIdTaken));
        assert!(db.find_by_nickname("Bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rank_counts_strictly_greater_scores() {
        let db = test_db().await;

        for (name, score) in [("a", 300.0), ("b", 200.0), ("c", 200.0), ("d", 100.0)] {
            db.upsert_if_better(run(name, score)).await.unwrap();
        }
        assert_eq!(db.rank_of(300.0).await.unwrap(), 1);
        assert_eq!(db.rank_of(200.0).await.unwrap(), 2);
        assert_eq!(db.rank_of(100.0).await.unwrap(), 4);
        assert_eq!(db.rank_of(1000.0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_orders_and_limits() {
        let db = test_db().await;

        let mut a = run("a", 100.0);
        a.final_years = 200.0;
        db.upsert_if_better(a).await.unwrap();
        db.upsert_if_better(run("b", 300.0)).await.unwrap();
        db.upsert_if_better(run("c", 100.0)).await.unwrap();

        let by_score = db.list(LeaderboardSort::Score, 10).await.unwrap();
        let names: Vec<&str> = by_score.iter().map(|r| r.nickname.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);

        let by_years = db.list(LeaderboardSort::YearsSaved, 10).await.unwrap();
        assert_eq!(by_years[0].nickname, "a");

        let limited = db.list(LeaderboardSort::Score, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_the_best_score() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("terra.db").display());
        let db = std::sync::Arc::new(Database::new(&url).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..40 {
            let db = db.clone();
            let score = ((i * 17) % 40) as f64 * 5.0;
            handles.push(tokio::spawn(async move {
                db.upsert_if_better(run("Ava", score)).await
            }));
        }
        let mut created = 0;
        for h in handles {
            if let UpsertOutcome::Created(_) = h.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(db.count().await.unwrap(), 1);
        let best = db.find_by_nickname("Ava").await.unwrap().unwrap();
        assert_eq!(best.total_score, 195.0);
    }

    #[test]
    fn test_sort_names() {
        assert_eq!(LeaderboardSort::from_str_name("score"), Some(LeaderboardSort::Score));
        assert_eq!(
            LeaderboardSort::from_str_name("years_saved"),
            Some(LeaderboardSort::YearsSaved)
        );
        assert_eq!(
            LeaderboardSort::from_str_name("yearsSaved"),
            Some(LeaderboardSort::YearsSaved)
        );
        assert_eq!(LeaderboardSort::from_str_name("elo"), None);
    }

    #[test]
    fn test_player_id_is_not_serialized() {
        let row = GameResult {
            id: 1,
            player_id: Some("secret".into()),
            nickname: "Ava".into(),
            initial_years: 1,
            final_years: 2.0,
            total_score: 3.0,
            actions_count: 4,
            status: "won".into(),
            played_at: "now".into(),
        };
        let v = serde_json::to_value(&row).unwrap();
        assert!(v.get("player_id").is_none());
    }
}
