use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = chat_relay::config::RelayConfig::from_env();
    let state = chat_relay::build_state(&config)?;
    let app = chat_relay::build_app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "chat relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
