// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use crate::oracle::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE, GEMINI_API_KEY_ENV};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Interface to bind the HTTP server to.
    pub host: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Whether to run in local mode (no rate limiting).
    pub local_mode: bool,
    /// Directory containing pre-built frontend files to serve.
    /// When set, the backend serves static files from this path.
    pub static_dir: Option<PathBuf>,
    pub oracle: OracleConfig,
}

/// Settings for the Gemini oracle.
#[derive(Clone)]
pub struct OracleConfig {
    /// `None` keeps the server up; oracle endpoints then answer 500.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:terra.db?mode=rwc`)
    /// - `HOST` - bind address (default: `0.0.0.0`)
    /// - `PORT` - HTTP server port (default: 5000)
    /// - `TERRA_LOCAL_MODE` - Set to `true` to enable local mode
    /// - `STATIC_DIR` - Path to frontend dist directory for static file serving
    /// - `GEMINI_API_KEY` - oracle credential
    /// - `GEMINI_MODEL`, `GEMINI_TEMPERATURE`, `GEMINI_BASE_URL` - oracle overrides
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `TERRA_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from an argument list and an environment lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:terra.db?mode=rwc".to_string());

        let host = env("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(5000);

        let local_mode = args.iter().any(|a| a == "--local")
            || env("TERRA_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        let static_dir = env("STATIC_DIR").map(PathBuf::from);

        let oracle = OracleConfig {
            api_key: env(GEMINI_API_KEY_ENV).filter(|k| !k.trim().is_empty()),
            model: env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: env("GEMINI_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TEMPERATURE),
            base_url: env("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        Config {
            database_url,
            host,
            port,
            local_mode,
            static_dir,
            oracle,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the rate limiter.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}
