#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header};
use linkshort::{build_router, config::AppConfig, db, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
}

pub async fn spawn() -> TestApp {
    spawn_with(AppConfig::for_tests()).await
}

pub async fn spawn_with(config: AppConfig) -> TestApp {
    let db = db::connect(&config.database_url).await.unwrap();
    let state = Arc::new(AppState::new(db.clone(), config));
    TestApp {
        router: build_router(state),
        db,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    /// Authenticated JSON request as `email`.
    pub async fn api(&self, method: &str, uri: &str, email: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("cf-access-jwt-assertion", access_token(email));

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.send(request).await
    }

    pub async fn clicks(&self, code: &str) -> i64 {
        sqlx::query_scalar("SELECT clicks FROM links WHERE code = ?1")
            .bind(code)
            .fetch_one(&self.db)
            .await
            .unwrap()
    }

    pub async fn click_events(&self, code: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM click_events ce JOIN links l ON ce.link_id = l.id WHERE l.code = ?1",
        )
        .bind(code)
        .fetch_one(&self.db)
        .await
        .unwrap()
    }

    /// Click events are written by a background task; poll until `expected`
    /// have landed (or give up after two seconds) and return the final count.
    pub async fn settled_click_events(&self, code: &str, expected: i64) -> i64 {
        for _ in 0..100 {
            let count = self.click_events(code).await;
            if count >= expected {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.click_events(code).await
    }
}

/// A token shaped like the access proxy's; the signature is never checked.
pub fn access_token(email: &str) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        &json!({ "email": email, "aud": ["linkshort"] }),
        &EncodingKey::from_secret(b"test"),
    )
    .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
