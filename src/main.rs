use dream_quota_server::{build_state, config::Config, connect_ledger, create_app, storage};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dream_quota_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dream-quota-server v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if config.admin_token.is_none() {
        info!("ADMIN_TOKEN not set; operator routes are disabled");
    }

    let ledger = connect_ledger(&config).await?;
    info!("Connected to ledger");

    let media = storage::create_storage(&config)?;
    let port = config.port;
    let state = build_state(ledger, media, config).await?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
