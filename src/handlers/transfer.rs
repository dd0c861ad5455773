use crate::{
    auth::AuthUser,
    db::{self, categories, links::NewLink},
    error::{ApiError, ApiResult},
    rate_limit::Endpoint,
    validate, AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const EXPORT_VERSION: i64 = 2;

// ── Document shapes ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportCategory {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportLink {
    pub code: String,
    pub destination: String,
    pub clicks: i64,
    pub created_at: NaiveDateTime,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportDocument {
    pub version: i64,
    pub exported_at: DateTime<Utc>,
    pub categories: Vec<ExportCategory>,
    pub links: Vec<ExportLink>,
}

#[derive(Debug, Deserialize)]
struct ImportLink {
    #[serde(default)]
    code: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    clicks: i64,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Version 1 is a bare array of links; version 2 wraps them together with the
/// owner's categories.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Versioned {
        version: Option<i64>,
        #[serde(default)]
        categories: Vec<ExportCategory>,
        links: Vec<ImportLink>,
    },
    Bare(Vec<ImportLink>),
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /api/export
pub async fn export(auth: AuthUser, State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let now = Utc::now();

    let categories = categories::list_categories(&state.db, &auth.email)
        .await?
        .into_iter()
        .map(|c| ExportCategory {
            name: c.name,
            slug: c.slug,
            color: Some(c.color),
        })
        .collect();

    let links = db::links::export_links(&state.db, &auth.email)
        .await?
        .into_iter()
        .map(|row| ExportLink {
            tags: db::links::split_tags(row.tags.as_deref()),
            code: row.code,
            destination: row.destination,
            clicks: row.clicks,
            created_at: row.created_at,
            category: row.category,
        })
        .collect();

    let document = ExportDocument {
        version: EXPORT_VERSION,
        exported_at: now,
        categories,
        links,
    };
    let body = serde_json::to_string_pretty(&document)
        .map_err(|e| ApiError::Internal(format!("export serialisation failed: {e}")))?;

    let disposition = format!(
        "attachment; filename=\"links-export-{}.json\"",
        now.format("%Y-%m-%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// POST /api/import
///
/// Links whose code is already taken (by anyone) or that fail validation are
/// skipped; entries without a code or destination are ignored outright.
pub async fn import(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<Response> {
    let limit_headers = super::throttle(&state, &auth.email, Endpoint::Import).await?;

    let document: ImportDocument = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON format".into()))?;

    let links = match document {
        ImportDocument::Versioned {
            version,
            categories: imported_categories,
            links,
        } => {
            if version == Some(EXPORT_VERSION) {
                for category in &imported_categories {
                    import_category(&state, &auth.email, category).await?;
                }
            }
            links
        }
        ImportDocument::Bare(links) => links,
    };

    let mut imported = 0;
    let mut skipped = 0;

    for link in &links {
        if link.code.trim().is_empty() || link.destination.trim().is_empty() {
            continue;
        }
        if import_link(&state, &auth.email, link).await? {
            imported += 1;
        } else {
            skipped += 1;
        }
    }

    tracing::info!(
        "Import for {}: {} imported, {} skipped",
        auth.email,
        imported,
        skipped
    );

    Ok((
        limit_headers,
        Json(json!({ "success": true, "imported": imported, "skipped": skipped })),
    )
        .into_response())
}

// ── Private helpers ────────────────────────────────────────────────────────

async fn import_category(
    state: &AppState,
    user_email: &str,
    category: &ExportCategory,
) -> ApiResult<()> {
    let name = category.name.trim();
    let slug = match category.slug.trim() {
        "" => categories::slugify(name),
        slug => slug.to_owned(),
    };
    if name.is_empty() || slug.is_empty() {
        return Ok(());
    }

    let color = category
        .color
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or("gray");
    categories::create_category(&state.db, user_email, name, &slug, color).await?;
    Ok(())
}

/// Insert one imported link. Returns `false` when it was skipped.
async fn import_link(state: &AppState, user_email: &str, link: &ImportLink) -> ApiResult<bool> {
    let (Ok(code), Ok(destination)) = (
        validate::validate_code(&link.code),
        validate::validate_url(&link.destination),
    ) else {
        tracing::debug!("Skipping invalid import entry '{}'", link.code);
        return Ok(false);
    };

    if db::links::code_exists(&state.db, &code).await? {
        return Ok(false);
    }

    let category_id = match link.category.as_deref().filter(|c| !c.is_empty()) {
        Some(slug) => categories::category_id_by_slug(&state.db, user_email, slug).await?,
        None => None,
    };

    let created = db::links::create_link(
        &state.db,
        &NewLink {
            code: &code,
            destination: &destination,
            user_email,
            clicks: link.clicks.max(0),
            category_id,
            ..NewLink::default()
        },
    )
    .await;

    let id = match created {
        Ok(id) => id,
        Err(e) if db::is_unique_violation(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    if !link.tags.is_empty() {
        db::links::set_link_tags(&state.db, id, user_email, &link.tags).await?;
    }

    Ok(true)
}
