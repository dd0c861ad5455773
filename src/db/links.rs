use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{Link, LinkSummary};

const LINK_COLUMNS: &str = "id, code, destination, clicks, user_email, category_id, created_at,
     expires_at, password_hash, description";

/// Joined listing used by the owner API and search.
const SUMMARY_SELECT: &str = "SELECT l.id, l.code, l.destination, l.clicks, l.user_email,
            l.category_id, l.created_at, l.expires_at, l.description,
            l.password_hash IS NOT NULL AS is_protected,
            c.name AS category_name, c.slug AS category_slug, c.color AS category_color,
            GROUP_CONCAT(t.name) AS tags
     FROM links l
     LEFT JOIN categories c ON l.category_id = c.id
     LEFT JOIN link_tags lt ON l.id = lt.link_id
     LEFT JOIN tags t ON lt.tag_id = t.id
     WHERE l.user_email = ";

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    code: String,
    destination: String,
    clicks: i64,
    user_email: String,
    category_id: Option<i64>,
    created_at: NaiveDateTime,
    expires_at: Option<DateTime<Utc>>,
    description: Option<String>,
    is_protected: bool,
    category_name: Option<String>,
    category_slug: Option<String>,
    category_color: Option<String>,
    tags: Option<String>,
}

impl From<SummaryRow> for LinkSummary {
    fn from(row: SummaryRow) -> Self {
        LinkSummary {
            id: row.id,
            code: row.code,
            destination: row.destination,
            clicks: row.clicks,
            user_email: row.user_email,
            category_id: row.category_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            description: row.description,
            is_protected: row.is_protected,
            category_name: row.category_name,
            category_slug: row.category_slug,
            category_color: row.category_color,
            tags: split_tags(row.tags.as_deref()),
        }
    }
}

pub(crate) fn split_tags(joined: Option<&str>) -> Vec<String> {
    joined
        .map(|s| s.split(',').filter(|t| !t.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Listing order for [`list_links`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkSort {
    #[default]
    Newest,
    Oldest,
    Clicks,
    Alpha,
}

impl LinkSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("oldest") => LinkSort::Oldest,
            Some("clicks") => LinkSort::Clicks,
            Some("alpha") => LinkSort::Alpha,
            _ => LinkSort::Newest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            LinkSort::Newest => " ORDER BY l.created_at DESC, l.id DESC",
            LinkSort::Oldest => " ORDER BY l.created_at ASC, l.id ASC",
            LinkSort::Clicks => " ORDER BY l.clicks DESC",
            LinkSort::Alpha => " ORDER BY l.code ASC",
        }
    }
}

/// Column values for a new link. `code` and `destination` are already validated.
#[derive(Debug, Clone, Default)]
pub struct NewLink<'a> {
    pub code: &'a str,
    pub destination: &'a str,
    pub user_email: &'a str,
    pub clicks: i64,
    pub category_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub password_hash: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Editable columns of an existing link.
#[derive(Debug, Clone)]
pub struct LinkUpdate<'a> {
    pub user_email: &'a str,
    pub destination: &'a str,
    pub category_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub description: Option<&'a str>,
    /// `None` keeps the stored hash; `Some(None)` clears it.
    pub password_hash: Option<Option<&'a str>>,
}

// ── Lookups ────────────────────────────────────────────────────────────────

/// Fetch a link by its short code, regardless of owner (public redirect path).
pub async fn get_link_by_code(pool: &SqlitePool, code: &str) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM links WHERE code = ?1"))
        .bind(code)
        .fetch_optional(pool)
        .await
}

/// Fetch a link by code only if `user_email` owns it.
pub async fn get_owned_link(
    pool: &SqlitePool,
    code: &str,
    user_email: &str,
) -> Result<Option<Link>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {LINK_COLUMNS} FROM links WHERE code = ?1 AND user_email = ?2"
    ))
    .bind(code)
    .bind(user_email)
    .fetch_optional(pool)
    .await
}

/// Whether any owner already uses `code`.
pub async fn code_exists(pool: &SqlitePool, code: &str) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM links WHERE code = ?1")
        .bind(code)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// All of an owner's links, optionally filtered by category slug and tag name.
pub async fn list_links(
    pool: &SqlitePool,
    user_email: &str,
    category: Option<&str>,
    tag: Option<&str>,
    sort: LinkSort,
) -> Result<Vec<LinkSummary>, sqlx::Error> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SUMMARY_SELECT);
    query.push_bind(user_email);

    if let Some(slug) = category {
        query.push(" AND c.slug = ").push_bind(slug);
    }
    if let Some(tag) = tag {
        query
            .push(
                " AND l.id IN (SELECT lt2.link_id FROM link_tags lt2
                   JOIN tags t2 ON lt2.tag_id = t2.id
                   WHERE t2.name = ",
            )
            .push_bind(tag.to_lowercase())
            .push(" AND t2.user_email = ")
            .push_bind(user_email)
            .push(")");
    }

    query.push(" GROUP BY l.id").push(sort.order_by());

    let rows: Vec<SummaryRow> = query.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(LinkSummary::from).collect())
}

/// Substring search over code, destination and description; best ten by clicks.
pub async fn search_links(
    pool: &SqlitePool,
    user_email: &str,
    term: &str,
) -> Result<Vec<LinkSummary>, sqlx::Error> {
    let pattern = format!("%{term}%");

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SUMMARY_SELECT);
    query
        .push_bind(user_email)
        .push(" AND (l.code LIKE ")
        .push_bind(pattern.clone())
        .push(" OR l.destination LIKE ")
        .push_bind(pattern.clone())
        .push(" OR l.description LIKE ")
        .push_bind(pattern)
        .push(") GROUP BY l.id ORDER BY l.clicks DESC LIMIT 10");

    let rows: Vec<SummaryRow> = query.build_query_as().fetch_all(pool).await?;
    Ok(rows.into_iter().map(LinkSummary::from).collect())
}

// ── Writes ─────────────────────────────────────────────────────────────────

/// Insert a new link and return its id. A duplicate code surfaces as a
/// UNIQUE violation (see [`super::is_unique_violation`]).
pub async fn create_link(pool: &SqlitePool, link: &NewLink<'_>) -> Result<i64, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO links
             (code, destination, user_email, clicks, category_id, expires_at,
              password_hash, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(link.code)
    .bind(link.destination)
    .bind(link.user_email)
    .bind(link.clicks)
    .bind(link.category_id)
    .bind(link.expires_at)
    .bind(link.password_hash)
    .bind(link.description)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

/// Apply an owner edit to link `id`. Returns `false` if the link is not
/// owned by `update.user_email`.
pub async fn update_link(
    pool: &SqlitePool,
    id: i64,
    update: &LinkUpdate<'_>,
) -> Result<bool, sqlx::Error> {
    let result = match update.password_hash {
        Some(hash) => {
            sqlx::query(
                "UPDATE links SET destination = ?1, category_id = ?2, expires_at = ?3,
                     description = ?4, password_hash = ?5
                 WHERE id = ?6 AND user_email = ?7",
            )
            .bind(update.destination)
            .bind(update.category_id)
            .bind(update.expires_at)
            .bind(update.description)
            .bind(hash)
            .bind(id)
            .bind(update.user_email)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE links SET destination = ?1, category_id = ?2, expires_at = ?3,
                     description = ?4
                 WHERE id = ?5 AND user_email = ?6",
            )
            .bind(update.destination)
            .bind(update.category_id)
            .bind(update.expires_at)
            .bind(update.description)
            .bind(id)
            .bind(update.user_email)
            .execute(pool)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}

/// Delete one of the owner's links. Returns `false` if nothing matched.
pub async fn delete_link(pool: &SqlitePool, code: &str, user_email: &str) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM links WHERE code = ?1 AND user_email = ?2")
        .bind(code)
        .bind(user_email)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

/// Set (or clear) the category of one of the owner's links.
pub async fn move_link(
    pool: &SqlitePool,
    code: &str,
    user_email: &str,
    category_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("UPDATE links SET category_id = ?1 WHERE code = ?2 AND user_email = ?3")
        .bind(category_id)
        .bind(code)
        .bind(user_email)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

/// Bump the lifetime click counter. A single statement, so concurrent
/// redirects never lose an increment.
pub async fn increment_clicks(pool: &SqlitePool, link_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE links SET clicks = clicks + 1 WHERE id = ?1")
        .bind(link_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ── Tags ───────────────────────────────────────────────────────────────────

/// Replace the tag set of `link_id`. Tag names are lower-cased and created on
/// first use for the owner. Returns `false`, touching nothing, if the link is
/// not owned by `user_email`.
pub async fn set_link_tags(
    pool: &SqlitePool,
    link_id: i64,
    user_email: &str,
    tags: &[String],
) -> Result<bool, sqlx::Error> {
    let owner: Option<i64> =
        sqlx::query_scalar("SELECT id FROM links WHERE id = ?1 AND user_email = ?2")
            .bind(link_id)
            .bind(user_email)
            .fetch_optional(pool)
            .await?;
    if owner.is_none() {
        return Ok(false);
    }

    sqlx::query(
        "DELETE FROM link_tags
         WHERE link_id = ?1
           AND link_id IN (SELECT id FROM links WHERE id = ?1 AND user_email = ?2)",
    )
    .bind(link_id)
    .bind(user_email)
    .execute(pool)
    .await?;

    for name in tags {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }

        sqlx::query("INSERT OR IGNORE INTO tags (name, user_email) VALUES (?1, ?2)")
            .bind(&name)
            .bind(user_email)
            .execute(pool)
            .await?;

        let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?1 AND user_email = ?2")
            .bind(&name)
            .bind(user_email)
            .fetch_one(pool)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO link_tags (link_id, tag_id) VALUES (?1, ?2)")
            .bind(link_id)
            .bind(tag_id)
            .execute(pool)
            .await?;
    }

    Ok(true)
}

// ── Export ─────────────────────────────────────────────────────────────────

/// A link as written to an export document.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRow {
    pub code: String,
    pub destination: String,
    pub clicks: i64,
    pub created_at: NaiveDateTime,
    pub category: Option<String>,
    pub tags: Option<String>,
}

pub async fn export_links(pool: &SqlitePool, user_email: &str) -> Result<Vec<ExportRow>, sqlx::Error> {
    sqlx::query_as(
        "SELECT l.code, l.destination, l.clicks, l.created_at, c.slug AS category,
                GROUP_CONCAT(t.name) AS tags
         FROM links l
         LEFT JOIN categories c ON l.category_id = c.id
         LEFT JOIN link_tags lt ON l.id = lt.link_id
         LEFT JOIN tags t ON lt.tag_id = t.id
         WHERE l.user_email = ?1
         GROUP BY l.id
         ORDER BY l.created_at DESC, l.id DESC",
    )
    .bind(user_email)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn seeded() -> SqlitePool {
        let pool = db::connect("sqlite::memory:").await.unwrap();
        for (code, owner, clicks) in [("alpha", "a@x.io", 5), ("beta", "a@x.io", 9), ("gamma", "b@x.io", 1)] {
            create_link(
                &pool,
                &NewLink {
                    code,
                    destination: "https://example.com/",
                    user_email: owner,
                    clicks,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn listing_is_scoped_to_owner_and_sorted() {
        let pool = seeded().await;

        let by_clicks = list_links(&pool, "a@x.io", None, None, LinkSort::Clicks).await.unwrap();
        let codes: Vec<_> = by_clicks.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["beta", "alpha"]);

        let alpha = list_links(&pool, "a@x.io", None, None, LinkSort::Alpha).await.unwrap();
        assert_eq!(alpha[0].code, "alpha");
        assert!(!alpha[0].is_protected);
    }

    #[tokio::test]
    async fn tags_are_lowercased_and_filterable() {
        let pool = seeded().await;
        let link = get_link_by_code(&pool, "alpha").await.unwrap().unwrap();

        set_link_tags(&pool, link.id, "a@x.io", &["Docs".into(), "rust".into()]).await.unwrap();

        let tagged = list_links(&pool, "a@x.io", None, Some("docs"), LinkSort::Newest)
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        let mut tags = tagged[0].tags.clone();
        tags.sort();
        assert_eq!(tags, vec!["docs", "rust"]);
    }

    #[tokio::test]
    async fn delete_requires_ownership() {
        let pool = seeded().await;

        assert!(!delete_link(&pool, "gamma", "a@x.io").await.unwrap());
        assert!(delete_link(&pool, "gamma", "b@x.io").await.unwrap());
        assert!(!code_exists(&pool, "gamma").await.unwrap());
    }

    #[tokio::test]
    async fn edits_are_filtered_by_owner() {
        let pool = seeded().await;
        let gamma = get_link_by_code(&pool, "gamma").await.unwrap().unwrap();
        set_link_tags(&pool, gamma.id, "b@x.io", &["keep".into()]).await.unwrap();

        let hijack = LinkUpdate {
            user_email: "a@x.io",
            destination: "https://evil.example/",
            category_id: None,
            expires_at: None,
            description: None,
            password_hash: Some(None),
        };
        assert!(!update_link(&pool, gamma.id, &hijack).await.unwrap());
        assert!(!set_link_tags(&pool, gamma.id, "a@x.io", &[]).await.unwrap());

        let gamma = get_link_by_code(&pool, "gamma").await.unwrap().unwrap();
        assert_eq!(gamma.destination, "https://example.com/");
        let tagged = list_links(&pool, "b@x.io", None, Some("keep"), LinkSort::Newest)
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let owner = LinkUpdate {
            user_email: "b@x.io",
            destination: "https://example.org/",
            ..hijack
        };
        assert!(update_link(&pool, gamma.id, &owner).await.unwrap());
        let gamma = get_link_by_code(&pool, "gamma").await.unwrap().unwrap();
        assert_eq!(gamma.destination, "https://example.org/");
    }

    #[tokio::test]
    async fn duplicate_code_is_a_unique_violation() {
        let pool = seeded().await;

        let err = create_link(
            &pool,
            &NewLink {
                code: "alpha",
                destination: "https://example.org/",
                user_email: "b@x.io",
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn search_matches_code_and_destination() {
        let pool = seeded().await;

        let hits = search_links(&pool, "a@x.io", "bet").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "beta");

        let all = search_links(&pool, "a@x.io", "example").await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
