mod api;
mod middleware;
mod scheduler;
mod state;

use std::sync::Arc;

use chrono::Duration;
use kvitto_auth::{CredentialStore, OauthClient};
use kvitto_directory::Directory;
use kvitto_match::{Matcher, TransactionCache};
use kvitto_webhook::WebhookGateway;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state},
    middleware::AuthState,
    state::{AppState, Connections},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(kvitto_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = Arc::new(kvitto_core::load_providers(&config.providers_path)?);
    let store = Arc::new(CredentialStore::new(
        OauthClient::new(config.provider_request_timeout_secs)?,
        Arc::clone(&registry),
        Duration::seconds(config.token_refresh_margin_secs),
    ));
    let cache = Arc::new(TransactionCache::new(Duration::seconds(i64::try_from(
        config.transaction_cache_ttl_secs,
    )?)));
    let state = AppState {
        matcher: Arc::new(Matcher::new(
            Arc::clone(&cache),
            Duration::minutes(config.default_tolerance_minutes),
            std::time::Duration::from_secs(config.provider_request_timeout_secs),
        )),
        gateway: Arc::new(WebhookGateway::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Duration::hours(24),
        )),
        directory: Arc::new(Directory::new(Duration::seconds(i64::try_from(
            config.directory_ttl_secs,
        )?))),
        connections: Arc::new(Connections::new()),
        config: Arc::clone(&config),
        registry,
        store,
        cache,
    };

    let _scheduler = scheduler::build_scheduler(state.clone()).await?;

    let auth = AuthState::from_env(matches!(config.env, kvitto_core::Environment::Development))?;
    let app = build_app(state, auth, default_rate_limit_state());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "kvitto-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
