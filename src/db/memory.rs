// In-process leaderboard store with the same contract as the SQLite one.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{GameResult, LeaderboardSort, LeaderboardStore, NewGameResult, StoreError, UpsertOutcome};

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<GameResult>,
    next_id: i64,
}

/// Rows kept in insertion (id) order behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

fn overwrite(row: &mut GameResult, result: NewGameResult) {
    if result.player_id.is_some() {
        row.player_id = result.player_id;
    }
    row.initial_years = result.initial_years;
    row.final_years = result.final_years;
    row.total_score = result.total_score;
    row.actions_count = result.actions_count;
    row.status = result.status;
    row.played_at = result.played_at;
}

#[async_trait]
impl LeaderboardStore for MemoryStore {
    async fn find_by_nickname(&self, nickname: &str) -> Result<Option<GameResult>, StoreError> {
        Ok(self.with_inner(|inner| inner.rows.iter().find(|r| r.nickname == nickname).cloned()))
    }

    async fn find_by_player_id(&self, player_id: &str) -> Result<Option<GameResult>, StoreError> {
        Ok(self.with_inner(|inner| {
            inner
                .rows
                .iter()
                .find(|r| r.player_id.as_deref() == Some(player_id))
                .cloned()
        }))
    }

    async fn upsert_if_better(&self, result: NewGameResult) -> Result<UpsertOutcome, StoreError> {
        self.with_inner(|inner| {
            let existing = inner.rows.iter().position(|r| r.nickname == result.nickname);
            if let Some(i) = existing {
                if result.total_score <= inner.rows[i].total_score {
                    return Ok(UpsertOutcome::Unchanged(inner.rows[i].clone()));
                }
            }

            // Only writes can collide on player_id.
            if let Some(player_id) = result.player_id.as_deref() {
                let taken = inner
                    .rows
                    .iter()
                    .any(|r| r.player_id.as_deref() == Some(player_id) && r.nickname != result.nickname);
                if taken {
                    return Err(StoreError::PlayerIdTaken);
                }
            }

            match existing {
                Some(i) => {
                    let row = &mut inner.rows[i];
                    overwrite(row, result);
                    Ok(UpsertOutcome::Updated(row.clone()))
                }
                None => {
                    inner.next_id += 1;
                    let row = GameResult {
                        id: inner.next_id,
                        player_id: result.player_id,
                        nickname: result.nickname,
                        initial_years: result.initial_years,
                        final_years: result.final_years,
                        total_score: result.total_score,
                        actions_count: result.actions_count,
                        status: result.status,
                        played_at: result.played_at,
                    };
                    inner.rows.push(row.clone());
                    Ok(UpsertOutcome::Created(row))
                }
            }
        })
    }

    async fn rank_of(&self, total_score: f64) -> Result<i64, StoreError> {
        let higher = self.with_inner(|inner| {
            inner.rows.iter().filter(|r| r.total_score > total_score).count()
        });
        Ok(higher as i64 + 1)
    }

    async fn list(&self, sort: LeaderboardSort, limit: i64) -> Result<Vec<GameResult>, StoreError> {
        let mut rows = self.with_inner(|inner| inner.rows.clone());
        let key = |r: &GameResult| match sort {
            LeaderboardSort::Score => r.total_score,
            LeaderboardSort::YearsSaved => r.years_saved(),
        };
        // Stable sort over id order keeps `id ASC` as the tie-break.
        rows.sort_by(|a, b| key(b).total_cmp(&key(a)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.with_inner(|inner| inner.rows.len() as i64))
    }
}
