use std::net::SocketAddr;
use std::sync::Arc;

use resilience::Simulator;
use resilience::config::ServiceConfig;
use resilience::diagnostics::{AppState, router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilience=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: pattern={}, network_condition={:?}, error_rate={:?}, seeded={}, listen_port={}",
        config.pattern,
        config.network_condition,
        config.error_rate,
        config.seed.is_some(),
        config.listen_port
    );

    let simulator = Arc::new(Simulator::from_service_config(&config));
    let app = router(AppState::new(simulator));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}
