use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub injection: InjectionConfig,
    pub scoring: ScoringConfig,
    pub logging: LoggingConfig,
}

/// Event store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Context injection configuration
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    /// Max insights ("learnings") rendered at session start.
    pub learnings_count: usize,
    /// Max raw annotations rendered at session start.
    pub annotations_count: usize,
    /// Short-circuit session start to no output.
    pub disabled: bool,
    /// Soft budget for the whole session-start path; on expiry the hook
    /// fails open and injects nothing.
    pub startup_timeout_ms: u64,
}

/// Projection scoring configuration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Weekly exponential decay base (< 1.0).
    pub decay_rate: f64,
    /// Annotation selection floor on effective score.
    pub min_effective_score: f64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store = StoreConfig {
            path: match env::var("HINDSIGHT_STORE_PATH") {
                Ok(p) => PathBuf::from(p),
                Err(_) => default_store_path()?,
            },
        };

        let injection = InjectionConfig {
            learnings_count: env::var("HINDSIGHT_INJECT_LEARNINGS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            annotations_count: env::var("HINDSIGHT_INJECT_ANNOTATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            disabled: env::var("HINDSIGHT_INJECTION_DISABLED")
                .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            startup_timeout_ms: env::var("HINDSIGHT_STARTUP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000),
        };

        let scoring = ScoringConfig {
            decay_rate: env::var("HINDSIGHT_DECAY_RATE")
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|r| *r > 0.0 && *r <= 1.0)
                .unwrap_or(0.95),
            min_effective_score: env::var("HINDSIGHT_MIN_SCORE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60.0),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            store,
            injection,
            scoring,
            logging,
        })
    }
}

fn default_store_path() -> Result<PathBuf, AppError> {
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map_err(|_| AppError::Config {
            message: "HINDSIGHT_STORE_PATH not set and no home directory found".to_string(),
        })?;
    Ok(PathBuf::from(home).join(".hindsight").join("events.jsonl"))
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            learnings_count: 3,
            annotations_count: 5,
            disabled: false,
            startup_timeout_ms: 2000,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.95,
            min_effective_score: 60.0,
        }
    }
}
