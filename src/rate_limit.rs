//! Fixed-window request throttling persisted in the `rate_limits` table.
//!
//! Each (identifier, endpoint) pair owns at most one row. A request inside the
//! row's window bumps its counter; the first request after the window elapses
//! restarts the row at 1. The whole decision is a single upsert statement, so
//! concurrent requests against the same row cannot overshoot the budget.

use axum::http::HeaderName;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::SqlitePool;

use crate::db;

/// Rows whose window started longer ago than this are swept on every check.
const STALE_AFTER_SECS: i64 = 5 * 60;

/// `Retry-After` used when the window's reset time is unknown.
pub const DEFAULT_RETRY_AFTER_SECS: i64 = 60;

/// Throttled operations. Each maps onto the key stored in `rate_limits.endpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CreateLink,
    DeleteLink,
    Search,
    Import,
    Redirect,
    Default,
}

impl Endpoint {
    pub fn key(&self) -> &'static str {
        match self {
            Endpoint::CreateLink => "api/links:POST",
            Endpoint::DeleteLink => "api/links:DELETE",
            Endpoint::Search => "api/search",
            Endpoint::Import => "api/import",
            Endpoint::Redirect => "redirect",
            Endpoint::Default => "default",
        }
    }
}

/// Request budget for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub limit: i64,
    pub window_seconds: i64,
}

/// Budgets for every throttled endpoint, sharing one window length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    pub create: i64,
    pub delete: i64,
    pub search: i64,
    pub import: i64,
    pub redirect: i64,
    pub default: i64,
    pub window_seconds: i64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            create: 30,
            delete: 30,
            search: 60,
            import: 5,
            redirect: 300,
            default: 100,
            window_seconds: 60,
        }
    }
}

impl RateLimits {
    /// Build the table from `RATE_LIMIT_*` variables resolved through `lookup`.
    /// Missing, non-numeric and zero values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: i64| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(fallback)
        };

        Self {
            create: read("RATE_LIMIT_CREATE", defaults.create),
            delete: read("RATE_LIMIT_DELETE", defaults.delete),
            search: read("RATE_LIMIT_SEARCH", defaults.search),
            import: read("RATE_LIMIT_IMPORT", defaults.import),
            redirect: read("RATE_LIMIT_REDIRECT", defaults.redirect),
            default: read("RATE_LIMIT_DEFAULT", defaults.default),
            window_seconds: read("RATE_LIMIT_WINDOW", defaults.window_seconds),
        }
    }

    pub fn budget(&self, endpoint: Endpoint) -> Budget {
        let limit = match endpoint {
            Endpoint::CreateLink => self.create,
            Endpoint::DeleteLink => self.delete,
            Endpoint::Search => self.search,
            Endpoint::Import => self.import,
            Endpoint::Redirect => self.redirect,
            Endpoint::Default => self.default,
        };
        Budget {
            limit,
            window_seconds: self.window_seconds,
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: i64,
    /// When the exhausted window ends. Only known on denial.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after(&self, now: DateTime<Utc>) -> i64 {
        match self.reset_at {
            Some(reset_at) => {
                let millis = (reset_at - now).num_milliseconds();
                ((millis + 999) / 1000).max(1)
            }
            None => DEFAULT_RETRY_AFTER_SECS,
        }
    }

    /// `X-RateLimit-*` headers describing this result against `budget`.
    pub fn headers(&self, budget: Budget) -> [(HeaderName, String); 3] {
        [
            (
                HeaderName::from_static("x-ratelimit-limit"),
                budget.limit.to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-remaining"),
                self.remaining.max(0).to_string(),
            ),
            (
                HeaderName::from_static("x-ratelimit-reset"),
                self.reset_at
                    .map(|at| at.timestamp().to_string())
                    .unwrap_or_default(),
            ),
        ]
    }
}

/// Count one request from `identifier` against `endpoint` and decide whether
/// it may proceed.
pub async fn check_rate_limit(
    pool: &SqlitePool,
    limits: &RateLimits,
    identifier: &str,
    endpoint: Endpoint,
) -> Result<RateLimitResult, sqlx::Error> {
    check_rate_limit_at(pool, limits, identifier, endpoint, Utc::now()).await
}

/// [`check_rate_limit`] against an explicit clock.
pub async fn check_rate_limit_at(
    pool: &SqlitePool,
    limits: &RateLimits,
    identifier: &str,
    endpoint: Endpoint,
    now: DateTime<Utc>,
) -> Result<RateLimitResult, sqlx::Error> {
    let budget = limits.budget(endpoint);
    let now = now.trunc_subsecs(0);
    let window = Duration::seconds(budget.window_seconds);
    let window_floor = now - window;

    // A sweep shorter than the window would silently reset live counters.
    let retention = Duration::seconds(STALE_AFTER_SECS.max(budget.window_seconds));
    if let Err(e) = db::rate_limits::delete_stale(pool, now - retention).await {
        tracing::warn!("Rate limit sweep failed: {:?}", e);
    }

    let counted = db::rate_limits::hit(
        pool,
        identifier,
        endpoint.key(),
        budget.limit,
        window_floor,
        now,
    )
    .await?;

    if let Some(row) = counted {
        return Ok(RateLimitResult {
            allowed: true,
            remaining: budget.limit - row.request_count,
            reset_at: None,
        });
    }

    let current = db::rate_limits::current_window(pool, identifier, endpoint.key(), window_floor)
        .await?;
    tracing::debug!(
        identifier,
        endpoint = endpoint.key(),
        "Rate limit exceeded"
    );

    Ok(RateLimitResult {
        allowed: false,
        remaining: 0,
        reset_at: current.map(|row| row.window_start + window),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limits(limit: i64) -> RateLimits {
        RateLimits {
            default: limit,
            window_seconds: 60,
            ..RateLimits::default()
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn lookup_overrides_and_falls_back() {
        let limits = RateLimits::from_lookup(|key| match key {
            "RATE_LIMIT_CREATE" => Some("12".into()),
            "RATE_LIMIT_SEARCH" => Some("lots".into()),
            "RATE_LIMIT_IMPORT" => Some("0".into()),
            "RATE_LIMIT_WINDOW" => Some(" 120 ".into()),
            _ => None,
        });

        assert_eq!(limits.create, 12);
        assert_eq!(limits.search, 60);
        assert_eq!(limits.import, 5);
        assert_eq!(limits.redirect, 300);
        assert_eq!(limits.budget(Endpoint::Redirect).window_seconds, 120);
    }

    #[tokio::test]
    async fn fixed_window_allows_limit_then_denies() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let limits = limits(3);

        let mut remaining = Vec::new();
        for i in 0..3 {
            let result = check_rate_limit_at(&pool, &limits, "1.2.3.4", Endpoint::Default, t(i))
                .await
                .unwrap();
            assert!(result.allowed);
            remaining.push(result.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = check_rate_limit_at(&pool, &limits, "1.2.3.4", Endpoint::Default, t(3))
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, Some(t(60)));
        assert_eq!(denied.retry_after(t(3)), 57);
    }

    #[tokio::test]
    async fn window_restarts_after_it_elapses() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let limits = limits(3);

        for i in 0..4 {
            check_rate_limit_at(&pool, &limits, "1.2.3.4", Endpoint::Default, t(i))
                .await
                .unwrap();
        }

        let fresh = check_rate_limit_at(&pool, &limits, "1.2.3.4", Endpoint::Default, t(61))
            .await
            .unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
    }

    #[tokio::test]
    async fn identifiers_and_endpoints_are_counted_separately() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let limits = RateLimits {
            search: 1,
            import: 1,
            ..RateLimits::default()
        };

        let a = check_rate_limit_at(&pool, &limits, "a", Endpoint::Search, t(0)).await.unwrap();
        let b = check_rate_limit_at(&pool, &limits, "b", Endpoint::Search, t(0)).await.unwrap();
        let a_import = check_rate_limit_at(&pool, &limits, "a", Endpoint::Import, t(0))
            .await
            .unwrap();
        let a_again = check_rate_limit_at(&pool, &limits, "a", Endpoint::Search, t(1))
            .await
            .unwrap();

        assert!(a.allowed && b.allowed && a_import.allowed);
        assert!(!a_again.allowed);
    }

    async fn rows_for(pool: &SqlitePool, identifier: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM rate_limits WHERE identifier = ?1")
            .bind(identifier)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stale_windows_are_swept_on_later_checks() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let limits = limits(3);

        check_rate_limit_at(&pool, &limits, "a", Endpoint::Default, t(0)).await.unwrap();
        check_rate_limit_at(&pool, &limits, "b", Endpoint::Default, t(299)).await.unwrap();
        assert_eq!(rows_for(&pool, "a").await, 1);
        assert_eq!(rows_for(&pool, "b").await, 1);

        check_rate_limit_at(&pool, &limits, "c", Endpoint::Default, t(301)).await.unwrap();
        assert_eq!(rows_for(&pool, "a").await, 0);
        assert_eq!(rows_for(&pool, "b").await, 1);
        assert_eq!(rows_for(&pool, "c").await, 1);
    }

    #[tokio::test]
    async fn sweep_keeps_windows_longer_than_five_minutes() {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        let limits = RateLimits {
            default: 1,
            window_seconds: 600,
            ..RateLimits::default()
        };

        check_rate_limit_at(&pool, &limits, "a", Endpoint::Default, t(0)).await.unwrap();
        check_rate_limit_at(&pool, &limits, "b", Endpoint::Default, t(301)).await.unwrap();
        assert_eq!(rows_for(&pool, "a").await, 1);

        let still_limited = check_rate_limit_at(&pool, &limits, "a", Endpoint::Default, t(302))
            .await
            .unwrap();
        assert!(!still_limited.allowed);

        check_rate_limit_at(&pool, &limits, "b", Endpoint::Default, t(601)).await.unwrap();
        assert_eq!(rows_for(&pool, "a").await, 0);
    }

    #[test]
    fn headers_report_budget_and_reset() {
        let result = RateLimitResult {
            allowed: false,
            remaining: -2,
            reset_at: Some(t(60)),
        };
        let headers = result.headers(Budget {
            limit: 30,
            window_seconds: 60,
        });

        assert_eq!(headers[0].1, "30");
        assert_eq!(headers[1].1, "0");
        assert_eq!(headers[2].1, t(60).timestamp().to_string());
    }
}
