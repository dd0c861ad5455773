use crate::{
    auth::AuthUser,
    db::categories::{self, DEFAULT_CATEGORIES},
    error::{ApiError, ApiResult},
    models::{Category, Tag},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_COLOR: &str = "gray";

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    name: Option<String>,
    color: Option<String>,
}

/// GET /api/categories
pub async fn list(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(categories::list_categories(&state.db, &auth.email).await?))
}

/// POST /api/categories
pub async fn create(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing name".into()))?;

    let slug = categories::slugify(name);
    if slug.is_empty() {
        return Err(ApiError::BadRequest(
            "Category name needs at least one letter or digit".into(),
        ));
    }

    let color = req
        .color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_COLOR);

    if !categories::create_category(&state.db, &auth.email, name, &slug, color).await? {
        return Err(ApiError::Conflict("Category already exists"));
    }

    Ok(Json(json!({ "success": true, "name": name, "slug": slug })))
}

/// DELETE /api/categories/:slug
/// Links in the category are kept and become uncategorised.
pub async fn delete(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !categories::delete_category(&state.db, &auth.email, &slug).await? {
        return Err(ApiError::NotFound("Category not found"));
    }

    Ok(Json(json!({ "success": true })))
}

/// POST /api/init-categories
/// Seed the default set; categories the owner already has are left alone.
pub async fn init_defaults(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut created = 0;
    for (name, slug, color) in DEFAULT_CATEGORIES {
        if categories::create_category(&state.db, &auth.email, name, slug, color).await? {
            created += 1;
        }
    }

    Ok(Json(json!({ "success": true, "created": created })))
}

/// GET /api/tags
pub async fn tags(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(categories::list_tags(&state.db, &auth.email).await?))
}
