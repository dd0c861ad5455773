use sqlx::SqlitePool;

use crate::models::{
    AnalyticsOverview, Bucket, ClickData, ClickEvent, Link, LinkAnalytics, Stats, TopLink,
};

/// Record one click event for `link_id`.
pub async fn log_click(pool: &SqlitePool, link_id: i64, click: &ClickData) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO click_events
             (link_id, referrer, user_agent, country, city, device_type, browser)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(link_id)
    .bind(&click.referrer)
    .bind(&click.user_agent)
    .bind(&click.country)
    .bind(&click.city)
    .bind(click.device_type)
    .bind(click.browser)
    .execute(pool)
    .await?;

    Ok(())
}

/// Number of stored click events for one link.
pub async fn count_clicks(pool: &SqlitePool, link_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM click_events WHERE link_id = ?1")
        .bind(link_id)
        .fetch_one(pool)
        .await
}

/// Bucket the link's events from the last `days` days by the `label` expression.
async fn breakdown(
    pool: &SqlitePool,
    link_id: i64,
    days: i64,
    label: &str,
    filter: &str,
    limit: Option<i64>,
) -> Result<Vec<Bucket>, sqlx::Error> {
    let sql = format!(
        "SELECT {label} AS label, COUNT(*) AS clicks
         FROM click_events
         WHERE link_id = ?1 AND clicked_at >= datetime('now', '-' || ?2 || ' days') {filter}
         GROUP BY 1
         ORDER BY clicks DESC, label ASC
         LIMIT ?3"
    );

    sqlx::query_as(&sql)
        .bind(link_id)
        .bind(days)
        .bind(limit.unwrap_or(-1))
        .fetch_all(pool)
        .await
}

/// Per-link analytics for the last `days` days.
pub async fn link_analytics(
    pool: &SqlitePool,
    link: &Link,
    days: i64,
) -> Result<LinkAnalytics, sqlx::Error> {
    let clicks_by_day: Vec<Bucket> = sqlx::query_as(
        "SELECT DATE(clicked_at) AS label, COUNT(*) AS clicks
         FROM click_events
         WHERE link_id = ?1 AND clicked_at >= datetime('now', '-' || ?2 || ' days')
         GROUP BY DATE(clicked_at)
         ORDER BY label ASC",
    )
    .bind(link.id)
    .bind(days)
    .fetch_all(pool)
    .await?;

    let clicks_by_country =
        breakdown(pool, link.id, days, "country", "AND country != ''", Some(10)).await?;
    let clicks_by_device = breakdown(pool, link.id, days, "device_type", "", None).await?;
    let clicks_by_browser = breakdown(pool, link.id, days, "browser", "", None).await?;
    let top_referrers = breakdown(
        pool,
        link.id,
        days,
        "CASE WHEN referrer = '' THEN 'Direct' ELSE referrer END",
        "",
        Some(10),
    )
    .await?;

    let recent_clicks: Vec<ClickEvent> = sqlx::query_as(
        "SELECT id, link_id, clicked_at, referrer, user_agent, country, city,
                device_type, browser
         FROM click_events
         WHERE link_id = ?1 AND clicked_at >= datetime('now', '-' || ?2 || ' days')
         ORDER BY clicked_at DESC, id DESC
         LIMIT 50",
    )
    .bind(link.id)
    .bind(days)
    .fetch_all(pool)
    .await?;

    Ok(LinkAnalytics {
        code: link.code.clone(),
        destination: link.destination.clone(),
        total_clicks: link.clicks,
        days,
        clicks_by_day,
        clicks_by_country,
        clicks_by_device,
        clicks_by_browser,
        top_referrers,
        recent_clicks,
    })
}

/// Analytics across every link `user_email` owns.
pub async fn overview(
    pool: &SqlitePool,
    user_email: &str,
    days: i64,
) -> Result<AnalyticsOverview, sqlx::Error> {
    let total_clicks: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM click_events ce
         JOIN links l ON ce.link_id = l.id
         WHERE l.user_email = ?1 AND ce.clicked_at >= datetime('now', '-' || ?2 || ' days')",
    )
    .bind(user_email)
    .bind(days)
    .fetch_one(pool)
    .await?;

    let clicks_by_day: Vec<Bucket> = sqlx::query_as(
        "SELECT DATE(ce.clicked_at) AS label, COUNT(*) AS clicks
         FROM click_events ce
         JOIN links l ON ce.link_id = l.id
         WHERE l.user_email = ?1 AND ce.clicked_at >= datetime('now', '-' || ?2 || ' days')
         GROUP BY DATE(ce.clicked_at)
         ORDER BY label ASC",
    )
    .bind(user_email)
    .bind(days)
    .fetch_all(pool)
    .await?;

    let top_links: Vec<TopLink> = sqlx::query_as(
        "SELECT l.code, l.destination, COUNT(ce.id) AS recent_clicks, l.clicks AS total_clicks
         FROM links l
         LEFT JOIN click_events ce
                ON l.id = ce.link_id
               AND ce.clicked_at >= datetime('now', '-' || ?2 || ' days')
         WHERE l.user_email = ?1
         GROUP BY l.id
         ORDER BY recent_clicks DESC
         LIMIT 10",
    )
    .bind(user_email)
    .bind(days)
    .fetch_all(pool)
    .await?;

    let clicks_by_country: Vec<Bucket> = sqlx::query_as(
        "SELECT ce.country AS label, COUNT(*) AS clicks
         FROM click_events ce
         JOIN links l ON ce.link_id = l.id
         WHERE l.user_email = ?1 AND ce.clicked_at >= datetime('now', '-' || ?2 || ' days')
               AND ce.country != ''
         GROUP BY ce.country
         ORDER BY clicks DESC
         LIMIT 10",
    )
    .bind(user_email)
    .bind(days)
    .fetch_all(pool)
    .await?;

    let clicks_by_device: Vec<Bucket> = sqlx::query_as(
        "SELECT ce.device_type AS label, COUNT(*) AS clicks
         FROM click_events ce
         JOIN links l ON ce.link_id = l.id
         WHERE l.user_email = ?1 AND ce.clicked_at >= datetime('now', '-' || ?2 || ' days')
         GROUP BY ce.device_type
         ORDER BY clicks DESC",
    )
    .bind(user_email)
    .bind(days)
    .fetch_all(pool)
    .await?;

    Ok(AnalyticsOverview {
        days,
        total_clicks,
        clicks_by_day,
        top_links,
        clicks_by_country,
        clicks_by_device,
    })
}

/// Dashboard totals for one owner. `clicks` sums the lifetime counters.
pub async fn stats(pool: &SqlitePool, user_email: &str) -> Result<Stats, sqlx::Error> {
    let (links, clicks): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(clicks), 0) FROM links WHERE user_email = ?1",
    )
    .bind(user_email)
    .fetch_one(pool)
    .await?;

    let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE user_email = ?1")
        .bind(user_email)
        .fetch_one(pool)
        .await?;

    let tags: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT t.id)
         FROM tags t
         JOIN link_tags lt ON t.id = lt.tag_id
         JOIN links l ON lt.link_id = l.id
         WHERE l.user_email = ?1",
    )
    .bind(user_email)
    .fetch_one(pool)
    .await?;

    Ok(Stats {
        links,
        clicks,
        categories,
        tags,
    })
}
