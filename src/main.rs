use openvoice::config::AppConfig;
use openvoice::session::{JwtAuthenticator, TokenConfig};
use openvoice::store::{ChatRepository, SqliteChatRepository};
use openvoice::{build_router, AppState};
use std::error::Error;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openvoice=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OpenVoice realtime hub");

    let config = AppConfig::from_env()?;
    if config.uses_default_secret() {
        warn!("JWT_SECRET is not set, using the development secret");
    }

    let repository = SqliteChatRepository::connect(&config.database_url).await?;
    repository.init_schema().await?;
    for name in &config.default_channels {
        let channel = repository.ensure_channel(name, "text").await?;
        info!(channel_id = channel.id, name = %channel.name, "Default channel ready");
    }

    let authenticator = JwtAuthenticator::new(
        TokenConfig::new(config.jwt_secret.clone())
            .with_expiration_hours(config.session_expiration_hours),
        config.session_cookie_name.clone(),
    );
    let app_state = AppState::new(
        Arc::new(repository),
        Arc::new(authenticator),
        config.realtime.clone(),
    )
    .with_allowed_origins(config.cors_allowed_origins.clone());
    let app = build_router(app_state, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
