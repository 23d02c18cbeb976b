use std::sync::Arc;

use axum::{debug_handler, extract::{State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::SignalHub;

#[debug_handler(state = crate::AppState)]
pub async fn signal_ws(
    State(hub): State<Arc<SignalHub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| {
        let (mut sender, mut receiver) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn_id = hub.connect(tx);

        let push_task = tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&signal) else {
                    continue;
                };
                if sender.send(text.into()).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(frame)) = receiver.next().await {
            let Ok(msg) = serde_json::from_slice(&frame.into_data()) else {
                continue;
            };
            hub.handle_message(conn_id, msg);
        }

        // Dropping the connection's sender lets the push task drain and exit.
        hub.disconnect(conn_id);
        let _ = push_task.await;
    })
}
