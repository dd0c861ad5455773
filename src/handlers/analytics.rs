use crate::{
    auth::AuthUser,
    db,
    error::{ApiError, ApiResult},
    models::{AnalyticsOverview, LinkAnalytics, Stats},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 365;

#[derive(Deserialize)]
pub struct PeriodParams {
    days: Option<i64>,
}

impl PeriodParams {
    fn days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
    }
}

/// GET /api/stats
pub async fn stats(auth: AuthUser, State(state): State<Arc<AppState>>) -> ApiResult<Json<Stats>> {
    Ok(Json(db::clicks::stats(&state.db, &auth.email).await?))
}

/// GET /api/analytics/:code?days=
pub async fn link(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(period): Query<PeriodParams>,
) -> ApiResult<Json<LinkAnalytics>> {
    let link = db::links::get_owned_link(&state.db, &code, &auth.email)
        .await?
        .ok_or(ApiError::NotFound("Link not found"))?;

    Ok(Json(
        db::clicks::link_analytics(&state.db, &link, period.days()).await?,
    ))
}

/// GET /api/analytics/overview?days=
pub async fn overview(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(period): Query<PeriodParams>,
) -> ApiResult<Json<AnalyticsOverview>> {
    Ok(Json(
        db::clicks::overview(&state.db, &auth.email, period.days()).await?,
    ))
}
