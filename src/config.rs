//! Runtime configuration
//!
//! Environment-driven settings with sensible defaults, read once at startup
//! by the binaries. Call `dotenvy::dotenv()` before [`Settings::from_env`]
//! to pick up a local `.env` file.

use std::time::Duration;

use crate::database::pool::PoolConfig;
use crate::database::schema::DEFAULT_CURATED_SCHEMA;

/// Where schema grounding text comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// Introspect the store catalog, optionally narrowed to named tables.
    Introspected { allow_list: Option<Vec<String>> },
    /// Hand-authored schema text.
    Curated { text: String },
}

/// Process-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub pool: PoolConfig,
    pub ollama_base_url: String,
    pub llm_model: String,
    pub schema_source: SchemaSource,
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let pool = PoolConfig {
            min_size: env_parse("POOL_MIN_SIZE", 2),
            max_size: env_parse("POOL_MAX_SIZE", 10),
            increment: env_parse("POOL_INCREMENT", 1),
            acquire_timeout: Some(Duration::from_secs(env_parse(
                "POOL_ACQUIRE_TIMEOUT_SECS",
                30,
            ))),
        };

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/askdb".to_string()),
            pool,
            ollama_base_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "mistral".to_string()),
            schema_source: schema_source_from_env(),
        }
    }
}

fn schema_source_from_env() -> SchemaSource {
    match std::env::var("SCHEMA_SOURCE").as_deref() {
        Ok("curated") => SchemaSource::Curated {
            text: std::env::var("SCHEMA_TEXT")
                .unwrap_or_else(|_| DEFAULT_CURATED_SCHEMA.to_string()),
        },
        _ => SchemaSource::Introspected {
            allow_list: std::env::var("SCHEMA_TABLES").ok().map(|csv| {
                csv.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        },
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Mask sensitive information in a database URL for logging.
pub fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else {
        // Char-based slicing; the unparseable text may be multibyte.
        let chars: Vec<char> = url.chars().collect();
        if chars.len() > 20 {
            let head: String = chars[..10].iter().collect();
            let tail: String = chars[chars.len() - 10..].iter().collect();
            format!("{head}***{tail}")
        } else {
            "***".to_string()
        }
    }
}
