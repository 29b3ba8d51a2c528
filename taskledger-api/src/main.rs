//! # Taskledger API Server
//!
//! Multi-user task tracking with an append-only audit trail.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=sqlite://taskledger.db JWT_SECRET=... cargo run -p taskledger-api
//! ```

use std::sync::Arc;

use anyhow::Context;
use taskledger_api::{
    app::{bootstrap_admin, build_router, AppState},
    config::Config,
};
use taskledger_shared::{
    auth::password::{Argon2Hasher, HashParams},
    db::{
        migrations::{ensure_database_exists, run_migrations},
        pool::{close_pool, create_pool, DatabaseConfig},
    },
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "taskledger_api=debug,taskledger_shared=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Taskledger API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    ensure_database_exists(&config.database.url)
        .await
        .context("failed to create database")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let state = AppState::new(
        pool.clone(),
        config,
        Arc::new(Argon2Hasher::new(HashParams::default())),
    );

    state
        .users
        .ensure_system_principal()
        .await
        .context("failed to create system principal")?;

    if let Some(admin) = &state.config.bootstrap_admin {
        bootstrap_admin(&state.users, admin)
            .await
            .context("failed to create bootstrap administrator")?;
    }

    let bind_address = state.config.bind_address();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, closing database pool...");
    close_pool(pool).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
