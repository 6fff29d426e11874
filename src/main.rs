use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::info;

use settlement_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json || cfg.is_production());
    api::handlers::health::mark_started();

    // Init DB
    let pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
    }

    // Payment provider gateway
    let gateway = api::payment::HttpPaymentGateway::new(
        cfg.payment_api_base_url.clone(),
        cfg.payment_api_key.clone(),
        Duration::from_secs(cfg.payment_api_timeout_secs),
    )
    .context("failed to build payment gateway client")?;

    let state = api::AppState::build(Arc::new(pool), cfg.clone(), Arc::new(gateway));
    let app = api::app_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port configuration")?;
    info!(
        %addr,
        environment = %cfg.environment,
        version = env!("CARGO_PKG_VERSION"),
        "settlement-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("settlement-api shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c; shutting down"),
        _ = terminate => info!("received SIGTERM; shutting down"),
    }
}
