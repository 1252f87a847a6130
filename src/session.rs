// Player sessions: opaque bearer tokens bound to nicknames, and the header extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use crate::db::LeaderboardStore;
use crate::error::AppError;

pub const TOKEN_HEADER: &str = "X-Player-Token";
pub const MAX_NICKNAME_LEN: usize = 50;

// ── Token minting ────────────────────────────────────────────────────

fn generate_random_bytes() -> [u8; 32] {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// 32 random bytes, hex-encoded: URL-safe and unguessable.
pub fn mint_token() -> String {
    hex::encode(generate_random_bytes())
}

/// Trim and check a nickname.
pub fn normalize_nickname(raw: Option<&str>) -> Result<String, AppError> {
    let nickname = raw.map(str::trim).unwrap_or_default();
    if nickname.is_empty() {
        return Err(AppError::validation("nickname is required"));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(AppError::validation(format!(
            "nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(nickname.to_string())
}

// ── Operations ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub session_token: String,
    pub nickname: String,
    pub returning_player: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
}

/// Hand out the nickname's existing token, or mint a fresh one.
///
/// Nothing is written here: the record appears on the first finished game.
pub async fn register(store: &dyn LeaderboardStore, nickname: &str) -> Result<Registration, AppError> {
    let nickname = normalize_nickname(Some(nickname))?;

    if let Some(existing) = store.find_by_nickname(&nickname).await? {
        if let Some(token) = existing.player_id {
            return Ok(Registration {
                session_token: token,
                nickname,
                returning_player: true,
                best_score: Some(existing.total_score),
            });
        }
    }

    Ok(Registration {
        session_token: mint_token(),
        nickname,
        returning_player: false,
        best_score: None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Verification {
    #[serde(rename_all = "camelCase")]
    Known {
        valid: bool,
        nickname: String,
        best_score: f64,
        player_id: i64,
    },
    /// No stored result carries the token yet; tokens are trusted bearer values.
    #[serde(rename_all = "camelCase")]
    NewPlayer { valid: bool, new_player: bool },
}

pub async fn verify(store: &dyn LeaderboardStore, token: &str) -> Result<Verification, AppError> {
    Ok(match store.find_by_player_id(token).await? {
        Some(record) => Verification::Known {
            valid: true,
            nickname: record.nickname,
            best_score: record.total_score,
            player_id: record.id,
        },
        None => Verification::NewPlayer {
            valid: true,
            new_player: true,
        },
    })
}

// ── Axum extractor: PlayerToken ──────────────────────────────────────

/// The raw `X-Player-Token` header value. Rejects with 401 when absent.
#[derive(Debug, Clone)]
pub struct PlayerToken(pub String);

impl<S> FromRequestParts<S> for PlayerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| PlayerToken(t.to_string()))
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {TOKEN_HEADER} header")))
    }
}
