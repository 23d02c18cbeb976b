use std::sync::Arc;

use scanlink::{signal, AppState};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scanlink=debug,info")),
        )
        .init();

    let app_state = AppState {
        hub: Arc::new(signal::SignalHub::new()),
    };

    let app = Router::new()
        .merge(signal::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "signaling server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
