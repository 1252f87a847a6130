// Turn protocol: threads the client-held conversation into each oracle call,
// parses the verdict, and hands back a new history.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::metrics;
use crate::oracle::{Oracle, OracleError};
use crate::outcome::Outcome;
use crate::prompts;
use crate::sanitize;

pub const MAX_SCORE_DELTA: f64 = 50.0;
pub const FALLBACK_STORY: &str = "Error parsing AI response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model", alias = "bot")]
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One line of the conversation, as the client sends it back and forth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The oracle's judgement of a single action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvaluation {
    pub score_delta: f64,
    pub sentiment: f64,
    pub story: String,
}

impl ActionEvaluation {
    /// Neutral result used whenever the oracle's answer cannot be understood.
    pub fn fallback() -> Self {
        Self {
            score_delta: 0.0,
            sentiment: 0.0,
            story: FALLBACK_STORY.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.story == FALLBACK_STORY && self.score_delta == 0.0 && self.sentiment == 0.0
    }
}

/// Shape the oracle is asked to answer with.
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default, alias = "scoreDelta", alias = "delta", alias = "Score")]
    score: Option<f64>,
    #[serde(alias = "Sentiment")]
    sentiment: f64,
    #[serde(alias = "Story", alias = "response", alias = "Response")]
    story: String,
}

/// Parse raw oracle output into an evaluation, or `None` on a content fault.
///
/// Numbers outside their ranges are clamped; a continuing game without a
/// score, or an empty story, is rejected.
pub fn parse_evaluation(raw: &str, outcome: Outcome) -> Option<ActionEvaluation> {
    let value = sanitize::parse_oracle_json(raw).ok()?;
    let verdict: Verdict = serde_json::from_value(value).ok()?;

    let story = verdict.story.trim();
    if story.is_empty() || !verdict.sentiment.is_finite() {
        return None;
    }

    let score_delta = if outcome.requests_delta() {
        let score = verdict.score.filter(|s| s.is_finite())?;
        score.round().clamp(-MAX_SCORE_DELTA, MAX_SCORE_DELTA)
    } else {
        0.0
    };

    Some(ActionEvaluation {
        score_delta,
        sentiment: verdict.sentiment.clamp(-1.0, 1.0),
        story: story.to_string(),
    })
}

/// Render prior turns as `role: content` lines.
pub fn render_history(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}\n", t.role.as_str(), t.content))
        .collect()
}

pub fn build_prompt(
    outcome: Outcome,
    nickname: &str,
    action: &str,
    history: &[ConversationTurn],
) -> String {
    format!(
        "{}\n{}Player \"{}\" action: \"{}\"",
        outcome.system_instruction(),
        render_history(history),
        nickname,
        action
    )
}

/// Input to one turn. The history is borrowed; the caller keeps its copy.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub nickname: &'a str,
    pub action: &'a str,
    pub history: &'a [ConversationTurn],
    pub total_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub evaluation: ActionEvaluation,
    pub history: Vec<ConversationTurn>,
    pub outcome: Outcome,
}

/// Evaluate one player action.
pub async fn play_turn(oracle: &dyn Oracle, req: TurnRequest<'_>) -> Result<TurnOutcome, AppError> {
    let nickname = required(req.nickname, "username")?;
    let action = required(req.action, "action")?;
    let outcome = req
        .total_score
        .map(Outcome::from_total_score)
        .unwrap_or(Outcome::Continuing);

    let prompt = build_prompt(outcome, nickname, action, req.history);
    let raw = call_oracle(oracle, "turn", &prompt).await?;
    let evaluation = evaluate(&raw, outcome, nickname);

    let mut history = Vec::with_capacity(req.history.len() + 2);
    history.extend_from_slice(req.history);
    history.push(ConversationTurn::user(action));
    history.push(ConversationTurn::assistant(evaluation.story.clone()));

    Ok(TurnOutcome {
        evaluation,
        history,
        outcome,
    })
}

/// The grim opening vignette shown before the first action.
pub async fn opening_story(oracle: &dyn Oracle, nickname: &str) -> Result<String, AppError> {
    let nickname = required(nickname, "username")?;
    let prompt = format!(
        "{}\nThe reader is a player called \"{}\".",
        prompts::OPENING_PROMPT,
        nickname
    );
    let raw = call_oracle(oracle, "opening", &prompt).await?;
    let story = sanitize::strip_code_fence(&raw).trim();
    if story.is_empty() {
        tracing::warn!(nickname, "Empty opening from oracle, using fallback");
        metrics::ORACLE_FALLBACKS_TOTAL.inc();
        return Ok(FALLBACK_STORY.to_string());
    }
    Ok(story.to_string())
}

/// Epilogue for a finished game. `outcome` picks the utopia or extinction template.
pub async fn closing_story(
    oracle: &dyn Oracle,
    nickname: &str,
    action: &str,
    history: &[ConversationTurn],
    outcome: Outcome,
) -> Result<String, AppError> {
    let nickname = required(nickname, "username")?;
    let action = required(action, "action")?;
    let prompt = build_prompt(outcome, nickname, action, history);
    let raw = call_oracle(oracle, outcome_label(outcome), &prompt).await?;
    Ok(evaluate(&raw, outcome, nickname).story)
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed)
    }
}

fn evaluate(raw: &str, outcome: Outcome, nickname: &str) -> ActionEvaluation {
    match parse_evaluation(raw, outcome) {
        Some(evaluation) => evaluation,
        None => {
            if raw.trim() == prompts::CANNED_RESPONSE {
                tracing::info!(nickname, "Oracle refused an off-game action");
            } else {
                tracing::warn!(nickname, "Unparseable oracle response, using fallback");
            }
            metrics::ORACLE_FALLBACKS_TOTAL.inc();
            ActionEvaluation::fallback()
        }
    }
}

async fn call_oracle(oracle: &dyn Oracle, kind: &str, prompt: &str) -> Result<String, OracleError> {
    let start = Instant::now();
    let result = oracle.complete(prompt).await;
    metrics::ORACLE_LATENCY_SECONDS
        .with_label_values(&[kind])
        .observe(start.elapsed().as_secs_f64());
    let label = if result.is_ok() { "ok" } else { "error" };
    metrics::ORACLE_CALLS_TOTAL
        .with_label_values(&[kind, label])
        .inc();
    result
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Continuing => "turn",
        Outcome::Won => "win",
        Outcome::Lost => "lose",
    }
}
