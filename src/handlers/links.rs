use crate::{
    auth::AuthUser,
    db::{
        self, categories,
        links::{LinkSort, LinkUpdate, NewLink},
    },
    error::{ApiError, ApiResult},
    models::LinkSummary,
    password, qr,
    rate_limit::Endpoint,
    validate, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Most codes one bulk delete may name.
const MAX_BULK: usize = 100;

const DEFAULT_QR_SIZE: u32 = 200;

// ── Request types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListParams {
    category: Option<String>,
    tag: Option<String>,
    sort: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
pub struct CreateLinkRequest {
    code: Option<String>,
    destination: Option<String>,
    category_id: Option<i64>,
    tags: Option<Vec<String>>,
    expires_at: Option<String>,
    password: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateLinkRequest {
    #[serde(default)]
    destination: String,
    category_id: Option<i64>,
    tags: Option<Vec<String>>,
    expires_at: Option<String>,
    password: Option<String>,
    #[serde(default)]
    remove_password: bool,
    description: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    codes: Vec<String>,
    category_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct QrParams {
    size: Option<u32>,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /api/links?category=&tag=&sort=
pub async fn list(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<LinkSummary>>> {
    let links = db::links::list_links(
        &state.db,
        &auth.email,
        non_empty(params.category.as_deref()),
        non_empty(params.tag.as_deref()),
        LinkSort::parse(params.sort.as_deref()),
    )
    .await?;

    Ok(Json(links))
}

/// GET /api/search?q=
pub async fn search(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Response> {
    let limit_headers = super::throttle(&state, &auth.email, Endpoint::Search).await?;

    let term = params.q.trim();
    let results = if term.chars().count() < 2 {
        Vec::new()
    } else {
        db::links::search_links(&state.db, &auth.email, term).await?
    };

    Ok((limit_headers, Json(results)).into_response())
}

/// POST /api/links
pub async fn create(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLinkRequest>,
) -> ApiResult<Response> {
    let limit_headers = super::throttle(&state, &auth.email, Endpoint::CreateLink).await?;

    let (Some(code), Some(destination)) = (
        non_empty(req.code.as_deref()),
        non_empty(req.destination.as_deref()),
    ) else {
        return Err(ApiError::BadRequest("Missing code or destination".into()));
    };

    let code = validate::validate_code(code)?;
    let destination = validate::validate_url(destination)?;
    let expires_at = parse_expiry(req.expires_at.as_deref())?;
    let category_id = owned_category(&state, &auth.email, req.category_id).await?;

    if db::links::code_exists(&state.db, &code).await? {
        return Err(ApiError::Conflict("Code already taken"));
    }

    let password_hash = non_empty(req.password.as_deref()).map(password::hash_password);
    let description = non_empty(req.description.as_deref());

    let id = db::links::create_link(
        &state.db,
        &NewLink {
            code: &code,
            destination: &destination,
            user_email: &auth.email,
            category_id,
            expires_at,
            password_hash: password_hash.as_deref(),
            description,
            ..NewLink::default()
        },
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            ApiError::Conflict("Code already taken")
        } else {
            ApiError::Database(e)
        }
    })?;

    if let Some(tags) = &req.tags {
        db::links::set_link_tags(&state.db, id, &auth.email, tags).await?;
    }

    tracing::info!("Created short link '{}' for {}", code, auth.email);

    Ok((
        limit_headers,
        Json(json!({
            "success": true,
            "id": id,
            "code": code,
            "destination": destination,
        })),
    )
        .into_response())
}

/// PUT /api/links/:code
pub async fn update(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<UpdateLinkRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let destination = validate::validate_url(&req.destination)?;
    let expires_at = parse_expiry(req.expires_at.as_deref())?;

    let link = db::links::get_owned_link(&state.db, &code, &auth.email)
        .await?
        .ok_or(ApiError::NotFound("Link not found"))?;

    let category_id = owned_category(&state, &auth.email, req.category_id).await?;

    let new_hash = non_empty(req.password.as_deref()).map(password::hash_password);
    let password_hash = if req.remove_password {
        Some(None)
    } else {
        new_hash.as_deref().map(Some)
    };

    let updated = db::links::update_link(
        &state.db,
        link.id,
        &LinkUpdate {
            user_email: &auth.email,
            destination: &destination,
            category_id,
            expires_at,
            description: non_empty(req.description.as_deref()),
            password_hash,
        },
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound("Link not found"));
    }

    if let Some(tags) = &req.tags {
        db::links::set_link_tags(&state.db, link.id, &auth.email, tags).await?;
    }

    Ok(Json(json!({ "success": true })))
}

/// DELETE /api/links/:code
pub async fn delete(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Response> {
    let limit_headers = super::throttle(&state, &auth.email, Endpoint::DeleteLink).await?;

    if !db::links::delete_link(&state.db, &code, &auth.email).await? {
        return Err(ApiError::NotFound("Link not found"));
    }

    tracing::info!("Deleted short link '{}' for {}", code, auth.email);
    Ok((limit_headers, Json(json!({ "success": true }))).into_response())
}

/// POST /api/links/bulk-delete
pub async fn bulk_delete(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<Response> {
    let limit_headers = super::throttle(&state, &auth.email, Endpoint::DeleteLink).await?;

    if req.codes.is_empty() {
        return Err(ApiError::BadRequest("No links specified".into()));
    }
    if req.codes.len() > MAX_BULK {
        return Err(ApiError::BadRequest(format!(
            "Maximum {MAX_BULK} links per bulk operation"
        )));
    }

    let mut deleted = 0;
    for code in &req.codes {
        if db::links::delete_link(&state.db, code, &auth.email).await? {
            deleted += 1;
        }
    }

    Ok((
        limit_headers,
        Json(json!({ "success": true, "deleted": deleted })),
    )
        .into_response())
}

/// POST /api/links/bulk-move
/// A missing or zero `category_id` clears the category.
pub async fn bulk_move(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.codes.is_empty() {
        return Err(ApiError::BadRequest("No links specified".into()));
    }

    let category_id = owned_category(&state, &auth.email, req.category_id).await?;

    let mut updated = 0;
    for code in &req.codes {
        if db::links::move_link(&state.db, code, &auth.email, category_id).await? {
            updated += 1;
        }
    }

    Ok(Json(json!({ "success": true, "updated": updated })))
}

/// GET /api/links/:code/qr?size=
/// SVG QR code of the link's public short URL.
pub async fn qr_code(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(params): Query<QrParams>,
) -> ApiResult<Response> {
    let link = db::links::get_owned_link(&state.db, &code, &auth.email)
        .await?
        .ok_or(ApiError::NotFound("Link not found"))?;

    let size = params.size.unwrap_or(DEFAULT_QR_SIZE).clamp(64, 2048);
    let short_url = format!("{}/{}", state.config.base_url, link.code);
    let matrix = qr::generate_qr(&short_url)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        qr::qr_to_svg(&matrix, size),
    )
        .into_response())
}

// ── Private helpers ────────────────────────────────────────────────────────

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accept RFC 3339 timestamps, or the `YYYY-MM-DDTHH:MM[:SS]` form sent by
/// datetime-local inputs (read as UTC). Blank means no expiry.
fn parse_expiry(raw: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| ApiError::BadRequest("Invalid expiration date".into()))
}

/// Resolve an optional category id the caller must own. Zero counts as none.
async fn owned_category(
    state: &AppState,
    user_email: &str,
    category_id: Option<i64>,
) -> ApiResult<Option<i64>> {
    match category_id.filter(|id| *id != 0) {
        None => Ok(None),
        Some(id) => categories::owned_category_id(&state.db, user_email, id)
            .await?
            .map(Some)
            .ok_or(ApiError::NotFound("Category not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expiry_formats() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 0).unwrap();

        assert_eq!(parse_expiry(None).unwrap(), None);
        assert_eq!(parse_expiry(Some("  ")).unwrap(), None);
        assert_eq!(parse_expiry(Some("2030-01-02T03:04:00Z")).unwrap(), Some(at));
        assert_eq!(parse_expiry(Some("2030-01-02T05:04:00+02:00")).unwrap(), Some(at));
        assert_eq!(parse_expiry(Some("2030-01-02T03:04")).unwrap(), Some(at));
        assert!(parse_expiry(Some("next tuesday")).is_err());
    }
}
