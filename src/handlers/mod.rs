pub mod analytics;
pub mod categories;
pub mod links;
pub mod redirect;
pub mod transfer;

use axum::http::HeaderName;
use chrono::Utc;

use crate::{
    error::{ApiError, ApiResult},
    rate_limit::{self, Endpoint},
    AppState,
};

/// Count a request against `endpoint` for `identifier`.
///
/// On success returns the `X-RateLimit-*` headers to attach to the response;
/// on denial returns the 429 error.
pub(crate) async fn throttle(
    state: &AppState,
    identifier: &str,
    endpoint: Endpoint,
) -> ApiResult<[(HeaderName, String); 3]> {
    let limits = &state.config.rate_limits;
    let result = rate_limit::check_rate_limit(&state.db, limits, identifier, endpoint).await?;

    if !result.allowed {
        tracing::info!(identifier, endpoint = endpoint.key(), "API rate limit hit");
        return Err(ApiError::RateLimited {
            retry_after: result.retry_after(Utc::now()),
        });
    }

    Ok(result.headers(limits.budget(endpoint)))
}
