use anyhow::{Context, Result};

use crate::rate_limit::RateLimits;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./linkshort.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL short links are served from, e.g. "https://go.example.com".
    /// Never has a trailing slash. Used as the payload of generated QR codes.
    pub base_url: String,

    /// Where visitors hitting the bare root path ("/") are sent. Without it
    /// the root answers 404.
    pub root_redirect_url: Option<String>,

    /// Resolve visitor IPs through ip-api.com when the proxy supplies no geo
    /// headers. Off unless GEO_LOOKUP is "1" or "true".
    pub geo_lookup: bool,

    /// Per-endpoint request budgets (RATE_LIMIT_* variables).
    pub rate_limits: RateLimits,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let root_redirect_url = std::env::var("ROOT_REDIRECT_URL")
            .ok()
            .map(|url| url.trim().trim_end_matches('/').to_owned())
            .filter(|url| !url.is_empty());

        let geo_lookup = std::env::var("GEO_LOOKUP")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./linkshort.db".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            base_url,
            root_redirect_url,
            geo_lookup,
            rate_limits: RateLimits::from_lookup(|key| std::env::var(key).ok()),
        })
    }

    /// Configuration for tests and embedding: in-memory database, default
    /// budgets, no outbound lookups.
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            base_url: "http://localhost:3000".into(),
            root_redirect_url: None,
            geo_lookup: false,
            rate_limits: RateLimits::default(),
        }
    }
}
