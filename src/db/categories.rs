use sqlx::SqlitePool;

use crate::models::{Category, Tag};

/// Categories every new owner can seed with one call.
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Work", "work", "violet"),
    ("Personal", "personal", "pink"),
    ("Social Media", "social", "cyan"),
    ("Marketing", "marketing", "orange"),
    ("Documentation", "docs", "green"),
];

/// Lower-case `name` and collapse every run of non-alphanumerics into one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_owned()
}

/// The owner's categories with the number of links in each, by name.
pub async fn list_categories(pool: &SqlitePool, user_email: &str) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as(
        "SELECT c.id, c.name, c.slug, c.color, c.user_email, c.created_at,
                COUNT(l.id) AS link_count
         FROM categories c
         LEFT JOIN links l ON c.id = l.category_id
         WHERE c.user_email = ?1
         GROUP BY c.id
         ORDER BY c.name ASC",
    )
    .bind(user_email)
    .fetch_all(pool)
    .await
}

/// Insert a category. Returns `false` if the owner already has one with that slug.
pub async fn create_category(
    pool: &SqlitePool,
    user_email: &str,
    name: &str,
    slug: &str,
    color: &str,
) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query(
        "INSERT OR IGNORE INTO categories (name, slug, color, user_email) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(name)
    .bind(slug)
    .bind(color)
    .bind(user_email)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected > 0)
}

/// Delete by slug; links in it fall back to no category.
pub async fn delete_category(pool: &SqlitePool, user_email: &str, slug: &str) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM categories WHERE slug = ?1 AND user_email = ?2")
        .bind(slug)
        .bind(user_email)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

/// Id of the owner's category `id`, if it belongs to them.
pub async fn owned_category_id(
    pool: &SqlitePool,
    user_email: &str,
    id: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM categories WHERE id = ?1 AND user_email = ?2")
        .bind(id)
        .bind(user_email)
        .fetch_optional(pool)
        .await
}

/// Id of the owner's category with `slug`.
pub async fn category_id_by_slug(
    pool: &SqlitePool,
    user_email: &str,
    slug: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM categories WHERE slug = ?1 AND user_email = ?2")
        .bind(slug)
        .bind(user_email)
        .fetch_optional(pool)
        .await
}

/// The owner's tags, most used first.
pub async fn list_tags(pool: &SqlitePool, user_email: &str) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as(
        "SELECT t.id, t.name, t.user_email, COUNT(lt.link_id) AS link_count
         FROM tags t
         LEFT JOIN link_tags lt ON t.id = lt.tag_id
         WHERE t.user_email = ?1
         GROUP BY t.id
         ORDER BY link_count DESC, t.name ASC",
    )
    .bind(user_email)
    .fetch_all(pool)
    .await
}
