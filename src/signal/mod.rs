mod hub;
mod identity;
mod message;
mod workflow;
mod ws;

use std::sync::Arc;

use axum::{debug_handler, extract::State, response::{IntoResponse, Response}, routing::get, Json, Router};

use crate::{AppResult, AppState};

pub use hub::SignalHub;
pub use identity::Role;
pub use message::{ClientMessage, RelayTag, ServerSignal};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::signal_ws))
        .route("/health", get(health))
}

#[debug_handler(state = AppState)]
async fn health(State(hub): State<Arc<SignalHub>>) -> AppResult<Response> {
    Ok(Json(hub.stats()).into_response())
}
