use crate::{
    click, db,
    models::Link,
    password,
    rate_limit::{self, Endpoint},
    AppState,
};
use askama::Template;
use axum::{
    extract::{ConnectInfo, Form, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate {
    code: String,
}

#[derive(Template)]
#[template(path = "expired.html")]
struct ExpiredTemplate;

#[derive(Template)]
#[template(path = "password.html")]
struct PasswordTemplate {
    code: String,
    error: bool,
}

// ── Form types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UnlockForm {
    #[serde(default)]
    password: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /
/// Send visitors to ROOT_REDIRECT_URL when one is configured.
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    match state.config.root_redirect_url.as_deref() {
        Some(url) => Redirect::to(url).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            NotFoundTemplate {
                code: String::new(),
            },
        )
            .into_response(),
    }
}

/// GET /:code
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let ip = extract_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    resolve(&state, &code, &ip, &headers, None).await
}

/// POST /:code
/// Password form submission for protected links. A body that is not a form
/// counts as no attempt, so lookup, throttling and expiry still decide first.
pub async fn unlock(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    form: Option<Form<UnlockForm>>,
) -> Response {
    let ip = extract_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let attempt = form.as_ref().map(|Form(form)| form.password.as_str());
    resolve(&state, &code, &ip, &headers, attempt).await
}

/// Shared resolution flow for both methods:
///
/// 1. Look the code up (404 page when unknown).
/// 2. Throttle by client IP (429).
/// 3. Refuse expired links (410 page).
/// 4. Gate protected links behind the password form (401 page).
/// 5. Count the click, record the event and answer 302.
async fn resolve(
    state: &Arc<AppState>,
    code: &str,
    ip: &str,
    headers: &HeaderMap,
    attempt: Option<&str>,
) -> Response {
    // ── 1. Resolve link ────────────────────────────────────────────────────
    let link = match db::links::get_link_by_code(&state.db, code).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            tracing::debug!("Unknown short code '{}'", code);
            return (
                StatusCode::NOT_FOUND,
                NotFoundTemplate {
                    code: code.to_owned(),
                },
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("DB error looking up short code '{}': {:?}", code, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    };

    // ── 2. Rate limit ──────────────────────────────────────────────────────
    match rate_limit::check_rate_limit(&state.db, &state.config.rate_limits, ip, Endpoint::Redirect)
        .await
    {
        Ok(result) if !result.allowed => {
            tracing::info!("Redirect rate limit hit for {} on '{}'", ip, code);
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(
                    header::RETRY_AFTER,
                    rate_limit::DEFAULT_RETRY_AFTER_SECS.to_string(),
                )],
                "Too many requests. Please try again later.",
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Rate limit check failed for '{}': {:?}", code, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
        }
    }

    // ── 3. Expiry ──────────────────────────────────────────────────────────
    if link.is_expired(Utc::now()) {
        tracing::debug!("Short code '{}' has expired", code);
        return (StatusCode::GONE, ExpiredTemplate).into_response();
    }

    // ── 4. Password gate ───────────────────────────────────────────────────
    if let Some(hash) = link.password_hash.as_deref() {
        match attempt {
            Some(pw) if password::verify_password(pw, hash) => {}
            Some(_) => {
                tracing::debug!("Wrong password for '{}'", code);
                return password_prompt(code, true);
            }
            None => return password_prompt(code, false),
        }
    }

    // ── 5. Record and redirect ─────────────────────────────────────────────
    record_click(state, &link, ip, headers).await;

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, link.destination),
            (
                header::CACHE_CONTROL,
                "private, no-cache, no-store, must-revalidate".to_owned(),
            ),
        ],
    )
        .into_response()
}

fn password_prompt(code: &str, error: bool) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        PasswordTemplate {
            code: code.to_owned(),
            error,
        },
    )
        .into_response()
}

/// Bump the counter inline, then store the click event from a background
/// task. Failures are logged; the visitor is redirected either way.
async fn record_click(state: &Arc<AppState>, link: &Link, ip: &str, headers: &HeaderMap) {
    if let Err(e) = db::links::increment_clicks(&state.db, link.id).await {
        tracing::error!("Failed to count click for '{}': {:?}", link.code, e);
    }

    // The geo lookup may go over the network; keep it off the redirect.
    let state = Arc::clone(state);
    let headers = headers.clone();
    let ip = ip.to_owned();
    let (link_id, code) = (link.id, link.code.clone());

    tokio::spawn(async move {
        let geo = state.geo.lookup(&ip).await;
        let data = click::parse_click_data(&headers, geo.as_ref());

        if let Err(e) = db::clicks::log_click(&state.db, link_id, &data).await {
            tracing::error!("Failed to log click for '{}': {:?}", code, e);
        }
    });
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Determine the real client IP, preferring the proxy's headers.
pub fn extract_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header("cf-connecting-ip") {
        return ip.to_owned();
    }

    // X-Forwarded-For can be a comma-separated list; take the first entry.
    if let Some(ip) = header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_owned();
    }

    if let Some(ip) = header("x-real-ip") {
        return ip.to_owned();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(extract_ip(&headers, None), "unknown");
        assert_eq!(extract_ip(&headers, Some(peer)), "10.0.0.9");

        headers.insert("x-real-ip", HeaderValue::from_static("5.5.5.5"));
        assert_eq!(extract_ip(&headers, Some(peer)), "5.5.5.5");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("4.4.4.4, 172.16.0.1"),
        );
        assert_eq!(extract_ip(&headers, Some(peer)), "4.4.4.4");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.1.1.1"));
        assert_eq!(extract_ip(&headers, Some(peer)), "1.1.1.1");
    }
}
