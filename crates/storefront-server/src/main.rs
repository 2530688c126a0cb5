mod api;
mod middleware;

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::{AuthState, SessionConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = storefront_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = storefront_db::PoolConfig::from_app_config(&config);
    let pool = storefront_db::connect_pool(&config.database_url, pool_config).await?;
    storefront_db::run_migrations(&pool).await?;

    let session_ttl = chrono::Duration::try_hours(config.session_ttl_hours).ok_or_else(|| {
        anyhow::anyhow!(
            "STOREFRONT_SESSION_TTL_HOURS out of range: {}",
            config.session_ttl_hours
        )
    })?;

    let auth = AuthState::from_env(matches!(
        config.env,
        storefront_core::Environment::Development
    ))?;
    let sessions = SessionConfig {
        secure_cookies: config.secure_cookies,
    };
    let app = build_app(
        AppState { pool, session_ttl },
        auth,
        default_rate_limit_state(),
        default_rate_limit_state(),
        sessions,
    );

    tracing::info!(addr = %config.bind_addr, env = ?config.env, "storefront server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
