//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | `postgres://localhost/lorekeep` |
//! | `HOST` / `PORT` | `0.0.0.0` / `3000` |
//! | `DB_MAX_CONNECTIONS` | 10 |
//! | `RATE_LIMIT_ENABLED` | `true` |
//! | `RATE_LIMIT_REQUESTS` / `RATE_LIMIT_PERIOD_SECS` | 100 / 60 |
//! | `ALLOWED_ORIGINS` | `http://localhost:3000` |
//! | `LOG_FORMAT` | `text` (or `json`) |
//! | `LOG_FILE` | unset (stdout only) |
//! | `LOG_ANSI` | auto |
//!
//! Tagger variables are read by `lore_tagger::TaggerConfig`.

use std::str::FromStr;

use lore_core::{defaults, Error, Result};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/lorekeep";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub file: Option<String>,
    pub ansi: Option<bool>,
}

/// Global request budget enforced by `governor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub period_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// `None` when rate limiting is disabled.
    pub rate_limit: Option<RateLimitConfig>,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub log: LogConfig,
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, raw))),
        None => Ok(default),
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rate_limit_enabled = get("RATE_LIMIT_ENABLED")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);
        let rate_limit = if rate_limit_enabled {
            let requests = parse_or(&get, "RATE_LIMIT_REQUESTS", defaults::RATE_LIMIT_REQUESTS)?;
            let period_secs =
                parse_or(&get, "RATE_LIMIT_PERIOD_SECS", defaults::RATE_LIMIT_PERIOD_SECS)?;
            if requests == 0 || period_secs == 0 {
                return Err(Error::Config(
                    "RATE_LIMIT_REQUESTS and RATE_LIMIT_PERIOD_SECS must be positive".to_string(),
                ));
            }
            Some(RateLimitConfig {
                requests,
                period_secs,
            })
        } else {
            None
        };

        let mut allowed_origins = parse_origins(
            &get("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
        );
        if allowed_origins.is_empty() {
            allowed_origins = parse_origins(DEFAULT_ALLOWED_ORIGINS);
        }

        let format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host: get("HOST").unwrap_or_else(|| defaults::SERVER_HOST.to_string()),
            port: parse_or(&get, "PORT", defaults::SERVER_PORT)?,
            db_max_connections: parse_or(
                &get,
                "DB_MAX_CONNECTIONS",
                defaults::DB_MAX_CONNECTIONS,
            )?,
            rate_limit,
            allowed_origins,
            max_body_bytes: defaults::MAX_BODY_BYTES,
            log: LogConfig {
                format,
                file: get("LOG_FILE").filter(|f| !f.trim().is_empty()),
                ansi: get("LOG_ANSI").map(|v| parse_bool(&v)),
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.database_url, "postgres://localhost/lorekeep");
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(
            config.rate_limit,
            Some(RateLimitConfig {
                requests: 100,
                period_secs: 60
            })
        );
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.log.format, LogFormat::Text);
        assert_eq!(config.log.file, None);
        assert_eq!(config.log.ansi, None);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_vars(vars(&[
            ("DATABASE_URL", "postgres://db/lore"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("RATE_LIMIT_REQUESTS", "5"),
            ("RATE_LIMIT_PERIOD_SECS", "1"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("LOG_FORMAT", "json"),
            ("LOG_FILE", "/var/log/lore/api.log"),
            ("LOG_ANSI", "false"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "postgres://db/lore");
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.rate_limit.unwrap().requests, 5);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.file.as_deref(), Some("/var/log/lore/api.log"));
        assert_eq!(config.log.ansi, Some(false));
    }

    #[test]
    fn test_rate_limit_disabled() {
        let config = ServerConfig::from_vars(vars(&[("RATE_LIMIT_ENABLED", "false")])).unwrap();
        assert!(config.rate_limit.is_none());
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        let err = ServerConfig::from_vars(vars(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = ServerConfig::from_vars(vars(&[("RATE_LIMIT_REQUESTS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_blank_origins_fall_back() {
        let config = ServerConfig::from_vars(vars(&[("ALLOWED_ORIGINS", " , ")])).unwrap();
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
    }
}
