// HTTP API routes (sessions, oracle-backed story turns, leaderboard).

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Query, State,
    },
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::LeaderboardStore;
use crate::error::AppError;
use crate::leaderboard::{self, EndGameRequest};
use crate::metrics;
use crate::oracle::Oracle;
use crate::outcome::Outcome;
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::session::{self, PlayerToken};
use crate::turn::{self, ActionEvaluation, ConversationTurn, TurnRequest};

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub nickname: Option<String>,
}

#[derive(Deserialize)]
pub struct FirstMessageRequest {
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitActionRequest {
    pub username: Option<String>,
    pub action: Option<String>,
    #[serde(default, alias = "previous_context")]
    pub previouscontext: Option<Vec<ConversationTurn>>,
    #[serde(alias = "totalScore")]
    pub total_score: Option<f64>,
}

#[derive(Deserialize)]
pub struct ClosingRequest {
    pub username: Option<String>,
    pub action: Option<String>,
    #[serde(default, alias = "previouscontext")]
    pub previous_context: Option<Vec<ConversationTurn>>,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<i64>,
    #[serde(alias = "sortBy")]
    pub sort_by: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitActionResponse {
    #[serde(flatten)]
    pub evaluation: ActionEvaluation,
    pub username: String,
    pub action: String,
    pub previouscontext: Vec<ConversationTurn>,
    pub outcome: Outcome,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeaderboardStore>,
    pub oracle: Arc<dyn Oracle>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(store: Arc<dyn LeaderboardStore>, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            store,
            oracle,
            rate_limiter: RateLimiter::new(),
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Count one oracle call against the nickname. Blank nicknames are left to
    /// field validation.
    fn check_oracle_limit(&self, nickname: Option<&str>) -> Result<(), AppError> {
        self.check(nickname, RateLimitType::OracleCalls)
    }

    fn check(&self, nickname: Option<&str>, limit: RateLimitType) -> Result<(), AppError> {
        match nickname.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => self.rate_limiter.check_limit(n, limit).map_err(|e| {
                tracing::warn!(nickname = n, "{e}");
                AppError::from(e)
            }),
            None => Ok(()),
        }
    }
}

// ── Extractor helpers ────────────────────────────────────────────────

/// Malformed bodies are reported like any other validation failure.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::validation(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(v)| v)
        .map_err(|e| AppError::validation(e.body_text()))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        // Sessions
        .route("/api/player/register", post(register_player))
        .route("/api/player/verify", get(verify_player))
        // Story turns
        .route("/api/first-message", post(first_message))
        .route("/api/submit-action", post(submit_action))
        .route("/api/generate-win-description", post(generate_win_description))
        .route("/api/generate-lose-description", post(generate_lose_description))
        // Leaderboard
        .route("/api/game/end", post(end_game))
        .route("/api/leaderboard", get(get_leaderboard))
        .layer(middleware::from_fn(metrics::track_metrics))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "terra-backend" }))
}

// ── Session handlers ─────────────────────────────────────────────────

async fn register_player(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    let nickname = session::normalize_nickname(req.nickname.as_deref())?;
    let registration = session::register(state.store.as_ref(), &nickname).await?;

    let kind = if registration.returning_player {
        "returning"
    } else {
        "new"
    };
    metrics::PLAYERS_REGISTERED_TOTAL
        .with_label_values(&[kind])
        .inc();
    tracing::info!(nickname = %registration.nickname, kind, "Player registered");

    Ok((StatusCode::CREATED, Json(registration)))
}

async fn verify_player(
    State(state): State<AppState>,
    PlayerToken(token): PlayerToken,
) -> Result<impl IntoResponse, AppError> {
    let verification = session::verify(state.store.as_ref(), &token).await?;
    Ok(Json(verification))
}

// ── Story handlers ───────────────────────────────────────────────────

async fn first_message(
    State(state): State<AppState>,
    payload: Result<Json<FirstMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    let username = req.username.unwrap_or_default();
    state.check_oracle_limit(Some(&username))?;

    let story = turn::opening_story(state.oracle.as_ref(), &username).await?;
    Ok(Json(json!({ "story": story })))
}

async fn submit_action(
    State(state): State<AppState>,
    payload: Result<Json<SubmitActionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    let username = req.username.unwrap_or_default();
    let action = req.action.unwrap_or_default();
    let history = req.previouscontext.unwrap_or_default();
    if username.trim().is_empty() || action.trim().is_empty() {
        return Err(AppError::validation("username and action are required"));
    }
    state.check_oracle_limit(Some(&username))?;

    let result = turn::play_turn(
        state.oracle.as_ref(),
        TurnRequest {
            nickname: &username,
            action: &action,
            history: &history,
            total_score: req.total_score,
        },
    )
    .await?;

    Ok(Json(SubmitActionResponse {
        evaluation: result.evaluation,
        username: username.trim().to_string(),
        action: action.trim().to_string(),
        previouscontext: result.history,
        outcome: result.outcome,
    }))
}

async fn generate_win_description(
    state: State<AppState>,
    payload: Result<Json<ClosingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    closing(state, payload, Outcome::Won).await
}

async fn generate_lose_description(
    state: State<AppState>,
    payload: Result<Json<ClosingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    closing(state, payload, Outcome::Lost).await
}

async fn closing(
    State(state): State<AppState>,
    payload: Result<Json<ClosingRequest>, JsonRejection>,
    outcome: Outcome,
) -> Result<Json<Value>, AppError> {
    let req = body(payload)?;
    let username = req.username.unwrap_or_default();
    let action = req.action.unwrap_or_default();
    let history = req.previous_context.unwrap_or_default();
    if username.trim().is_empty() || action.trim().is_empty() {
        return Err(AppError::validation("username and action are required"));
    }
    state.check_oracle_limit(Some(&username))?;

    let story =
        turn::closing_story(state.oracle.as_ref(), &username, &action, &history, outcome).await?;
    Ok(Json(json!({ "story": story })))
}

// ── Leaderboard handlers ─────────────────────────────────────────────

async fn end_game(
    State(state): State<AppState>,
    payload: Result<Json<EndGameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = body(payload)?;
    state.check(req.nickname.as_deref(), RateLimitType::GameEnds)?;

    let summary = leaderboard::end_game(state.store.as_ref(), req).await?;
    let status = if summary.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

async fn get_leaderboard(
    State(state): State<AppState>,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let params = query(params)?;
    let page =
        leaderboard::leaderboard(state.store.as_ref(), params.limit, params.sort_by.as_deref())
            .await?;
    Ok(Json(page))
}
