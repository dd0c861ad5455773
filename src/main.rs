use std::{net::SocketAddr, sync::Arc};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkshort::{build_router, config, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linkshort=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting LinkShort on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);
    if config.geo_lookup {
        tracing::info!("IP geolocation lookups enabled");
    }

    let db = db::connect(&config.database_url).await?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(db, config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
