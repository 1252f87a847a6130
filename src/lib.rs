pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod oracle;
pub mod outcome;
pub mod prompts;
pub mod rate_limit;
pub mod sanitize;
pub mod session;
pub mod turn;
