use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod click;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod password;
pub mod qr;
pub mod rate_limit;
pub mod validate;

use geo::GeoResolver;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
    /// Optional IP → location lookups, memoised for the life of the process.
    pub geo: GeoResolver,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: config::AppConfig) -> Self {
        let geo = GeoResolver::new(config.geo_lookup);
        Self { db, config, geo }
    }
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{analytics, categories, links, redirect, transfer};

    let api = Router::new()
        .route("/links", get(links::list).post(links::create))
        .route("/links/bulk-delete", post(links::bulk_delete))
        .route("/links/bulk-move", post(links::bulk_move))
        .route("/links/:code", put(links::update).delete(links::delete))
        .route("/links/:code/qr", get(links::qr_code))
        .route("/search", get(links::search))
        .route("/categories", get(categories::list).post(categories::create))
        .route("/categories/:slug", delete(categories::delete))
        .route("/init-categories", post(categories::init_defaults))
        .route("/tags", get(categories::tags))
        .route("/stats", get(analytics::stats))
        .route("/analytics/overview", get(analytics::overview))
        .route("/analytics/:code", get(analytics::link))
        .route("/export", get(transfer::export))
        .route("/import", post(transfer::import));

    Router::new()
        .route("/", get(redirect::index))
        // Health check, no auth
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/api", api)
        // Short-link redirect; static routes above take priority
        .route("/:code", get(redirect::redirect).post(redirect::unlock))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
