//! Runtime settings read from the environment (and `.env`, see `main`).

use std::{env, path::PathBuf, str::FromStr};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub media_root: PathBuf,
    /// Always starts and ends with `/`.
    pub media_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub page_size: u32,
    pub session_ttl_hours: i64,
    pub session_cookie_secure: bool,
    pub max_upload_bytes: usize,
    pub log_level: tracing::Level,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

const DEFAULT_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:8080",
    "http://127.0.0.1:8080",
];

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => {
            tracing::debug!("{key} not set, using {default:?}");
            Ok(default)
        }
    }
}

fn flag(key: &str, default: bool) -> anyhow::Result<bool> {
    match var(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("invalid value for {key}: {raw:?}"),
        },
        None => Ok(default),
    }
}

fn normalize_media_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let cors_allowed_origins = match var("CORS_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        let page_size: u32 = parsed("PAGE_SIZE", 20)?;
        anyhow::ensure!(page_size > 0, "PAGE_SIZE must be positive");
        let session_ttl_hours: i64 = parsed("SESSION_TTL_HOURS", 24 * 14)?;
        anyhow::ensure!(session_ttl_hours > 0, "SESSION_TTL_HOURS must be positive");

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed("PORT", 8080)?,
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite:restaurant.db".to_string()),
            db_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 5)?,
            media_root: var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("media")),
            media_url: normalize_media_url(&var("MEDIA_URL").unwrap_or_else(|| "/media/".to_string())),
            cors_allowed_origins,
            page_size,
            session_ttl_hours,
            session_cookie_secure: flag("SESSION_COOKIE_SECURE", false)?,
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            log_level: parsed("LOG_LEVEL", tracing::Level::INFO)?,
            admin_username: var("ADMIN_USERNAME"),
            admin_password: var("ADMIN_PASSWORD"),
        })
    }

    /// Settings for tests: an in-memory database and the given media root.
    pub fn for_tests(media_root: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            media_root: media_root.into(),
            media_url: "/media/".to_string(),
            cors_allowed_origins: Vec::new(),
            page_size: 20,
            session_ttl_hours: 24,
            session_cookie_secure: false,
            max_upload_bytes: 1024 * 1024,
            log_level: tracing::Level::DEBUG,
            admin_username: None,
            admin_password: None,
        }
    }
}
