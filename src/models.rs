use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shortened link record from the `links` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    pub code: String,
    pub destination: String,
    pub clicks: i64,
    pub user_email: String,
    pub category_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub description: Option<String>,
}

impl Link {
    /// A link whose expiry lies strictly before `now` no longer redirects.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// Coarse device class derived from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Bot,
    Desktop,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Bot => "bot",
            DeviceType::Desktop => "desktop",
        }
    }
}

/// Browser family derived from the User-Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Browser {
    Edge,
    Chrome,
    Safari,
    Firefox,
    Opera,
    #[serde(rename = "IE")]
    #[sqlx(rename = "IE")]
    Ie,
    Other,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Edge => "Edge",
            Browser::Chrome => "Chrome",
            Browser::Safari => "Safari",
            Browser::Firefox => "Firefox",
            Browser::Opera => "Opera",
            Browser::Ie => "IE",
            Browser::Other => "Other",
        }
    }
}

/// A single click event from the `click_events` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClickEvent {
    pub id: i64,
    pub link_id: i64,
    pub clicked_at: NaiveDateTime,
    pub referrer: String,
    pub user_agent: String,
    pub country: String,
    pub city: String,
    pub device_type: DeviceType,
    pub browser: Browser,
}

/// Request metadata recorded alongside a successful redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickData {
    pub user_agent: String,
    pub referrer: String,
    pub country: String,
    pub city: String,
    pub device_type: DeviceType,
    pub browser: Browser,
}

/// The current fixed window for one (identifier, endpoint) pair.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RateLimitWindow {
    pub identifier: String,
    pub endpoint: String,
    pub request_count: i64,
    pub window_start: DateTime<Utc>,
}

/// A link as listed on the owner's API, joined with its category and tags.
#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub id: i64,
    pub code: String,
    pub destination: String,
    pub clicks: i64,
    pub user_email: String,
    pub category_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub expires_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub is_protected: bool,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub category_color: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub user_email: String,
    pub created_at: NaiveDateTime,
    pub link_count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub user_email: String,
    pub link_count: i64,
}

/// Per-owner totals shown on the dashboard header.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub links: i64,
    pub clicks: i64,
    pub categories: i64,
    pub tags: i64,
}

/// One `(label, clicks)` bucket of an analytics breakdown.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bucket {
    pub label: String,
    pub clicks: i64,
}

/// Click analytics for a single link over the last `days` days.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAnalytics {
    pub code: String,
    pub destination: String,
    /// Lifetime counter from `links.clicks`; the breakdowns below are
    /// computed from `click_events` within the period only.
    pub total_clicks: i64,
    pub days: i64,
    pub clicks_by_day: Vec<Bucket>,
    pub clicks_by_country: Vec<Bucket>,
    pub clicks_by_device: Vec<Bucket>,
    pub clicks_by_browser: Vec<Bucket>,
    pub top_referrers: Vec<Bucket>,
    pub recent_clicks: Vec<ClickEvent>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopLink {
    pub code: String,
    pub destination: String,
    pub recent_clicks: i64,
    pub total_clicks: i64,
}

/// Click analytics across all of an owner's links.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub days: i64,
    pub total_clicks: i64,
    pub clicks_by_day: Vec<Bucket>,
    pub top_links: Vec<TopLink>,
    pub clicks_by_country: Vec<Bucket>,
    pub clicks_by_device: Vec<Bucket>,
}
