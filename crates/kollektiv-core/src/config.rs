//! Application configuration, loaded once at process startup.
//!
//! Every setting is a plain environment variable, optionally seeded from a
//! `.env` file in development, validated eagerly so a misconfigured
//! deployment fails at boot rather than on the first request.

use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{KollektivError, Result};

/// Process exit code for a configuration failure, matching BSD sysexits.h's
/// `EX_CONFIG`. `kollektiv-cli` exits with this code when [`AppConfig::load`]
/// fails.
pub const EX_CONFIG: i32 = 78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = KollektivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(KollektivError::Config(format!(
                "unrecognised KOLLEKTIV_ENVIRONMENT: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = KollektivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "pretty" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(KollektivError::Config(format!(
                "unrecognised KOLLEKTIV_LOG_FORMAT: {other}"
            ))),
        }
    }
}

/// Fully validated process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub log_format: LogFormat,
    pub log_level: String,

    pub bind_addr: SocketAddr,
    pub public_url: String,

    pub database_url: String,
    pub redis_url: String,
    pub qdrant_url: String,

    pub anthropic_api_key: String,
    pub firecrawl_api_key: String,
    pub cohere_api_key: String,

    pub cors_allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,

    pub max_conversation_tokens: u32,
    pub embedding_model: String,
    pub chat_model: String,
}

fn required(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| KollektivError::Config(format!("missing required environment variable {key}")))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_required<T: FromStr>(key: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = required(key)?;
    raw.parse()
        .map_err(|e| KollektivError::Config(format!("invalid {key} ({raw}): {e}")))
}

fn parse_optional<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| KollektivError::Config(format!("invalid {key} ({raw}): {e}"))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from the process environment, seeding it from a
    /// `.env` file first if one exists (a no-op in production containers
    /// that set real environment variables).
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let environment: Environment =
            parse_optional("KOLLEKTIV_ENVIRONMENT", Environment::Local)?;
        let log_format: LogFormat = parse_optional(
            "KOLLEKTIV_LOG_FORMAT",
            match environment {
                Environment::Local => LogFormat::Compact,
                _ => LogFormat::Json,
            },
        )?;
        let log_level = optional("KOLLEKTIV_LOG_LEVEL", "info");

        let bind_addr: SocketAddr = parse_optional(
            "KOLLEKTIV_BIND_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 8000)),
        )?;
        let public_url = required("KOLLEKTIV_PUBLIC_URL")?;

        let database_url = required("DATABASE_URL")?;
        let redis_url = required("REDIS_URL")?;
        let qdrant_url = optional("QDRANT_URL", "http://localhost:6334");

        let anthropic_api_key = required("ANTHROPIC_API_KEY")?;
        let firecrawl_api_key = required("FIRECRAWL_API_KEY")?;
        let cohere_api_key = required("COHERE_API_KEY")?;

        let cors_allowed_origins = optional("KOLLEKTIV_CORS_ORIGINS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let rate_limit_per_minute: u32 = parse_optional("KOLLEKTIV_RATE_LIMIT_PER_MINUTE", 60)?;
        let max_conversation_tokens: u32 =
            parse_optional("KOLLEKTIV_MAX_CONVERSATION_TOKENS", 200_000)?;

        let embedding_model = optional("KOLLEKTIV_EMBEDDING_MODEL", "embed-english-v3.0");
        let chat_model = optional("KOLLEKTIV_CHAT_MODEL", "claude-sonnet-4-5");

        if public_url.trim().is_empty() {
            return Err(KollektivError::Config(
                "KOLLEKTIV_PUBLIC_URL must not be empty".into(),
            ));
        }

        Ok(Self {
            environment,
            log_format,
            log_level,
            bind_addr,
            public_url,
            database_url,
            redis_url,
            qdrant_url,
            anthropic_api_key,
            firecrawl_api_key,
            cohere_api_key,
            cors_allowed_origins,
            rate_limit_per_minute,
            max_conversation_tokens,
            embedding_model,
            chat_model,
        })
    }

    /// The absolute URL the crawler should call back once a crawl
    /// completes, built from `public_url` so the same config works behind
    /// any reverse proxy.
    pub fn webhook_base_url(&self) -> String {
        format!(
            "{}/webhooks/firecrawl",
            self.public_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "KOLLEKTIV_ENVIRONMENT",
            "KOLLEKTIV_LOG_FORMAT",
            "KOLLEKTIV_LOG_LEVEL",
            "KOLLEKTIV_BIND_ADDR",
            "KOLLEKTIV_PUBLIC_URL",
            "DATABASE_URL",
            "REDIS_URL",
            "QDRANT_URL",
            "ANTHROPIC_API_KEY",
            "FIRECRAWL_API_KEY",
            "COHERE_API_KEY",
            "KOLLEKTIV_CORS_ORIGINS",
            "KOLLEKTIV_RATE_LIMIT_PER_MINUTE",
            "KOLLEKTIV_MAX_CONVERSATION_TOKENS",
        ] {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn missing_required_var_fails_with_config_error() {
        clear_env();
        let result = AppConfig::load();
        assert!(matches!(result, Err(KollektivError::Config(_))));
    }

    #[test]
    fn webhook_base_url_strips_trailing_slash() {
        clear_env();
        unsafe {
            std::env::set_var("KOLLEKTIV_PUBLIC_URL", "https://kollektiv.example.com/");
            std::env::set_var("DATABASE_URL", "postgres://localhost/kollektiv");
            std::env::set_var("REDIS_URL", "redis://localhost");
            std::env::set_var("ANTHROPIC_API_KEY", "x");
            std::env::set_var("FIRECRAWL_API_KEY", "x");
            std::env::set_var("COHERE_API_KEY", "x");
        }
        let config = AppConfig::load().expect("config should load");
        assert_eq!(
            config.webhook_base_url(),
            "https://kollektiv.example.com/webhooks/firecrawl"
        );
        clear_env();
    }
}
