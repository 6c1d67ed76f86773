use crate::proxy::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use offline_cache::{CachedArticles, Command, PageMessage, Registration};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// WebSocket upgrade handler for /sw/messages: one socket per page.
pub async fn ws_messages_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let registration = Arc::clone(&state.registration);
    ws.on_upgrade(move |socket| handle_page(socket, registration))
}

/// Pump one page: commands in, broadcasts and replies out.
///
/// Each command runs on its own task so a slow `CACHE_ARTICLE` does not hold
/// up the page's other commands or its broadcasts. The article list comes
/// back on this socket only.
async fn handle_page(socket: WebSocket, registration: Arc<Registration>) {
    let (mut sink, mut stream) = socket.split();
    let mut broadcasts = registration.subscribe();
    let (reply_tx, mut replies) = mpsc::channel::<CachedArticles>(8);

    tracing::debug!("page connected");

    loop {
        let outgoing = tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text(text.as_str(), &registration, &reply_tx);
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "page socket error");
                    break;
                }
            },
            message = broadcasts.recv() => match message {
                Ok(message) => PageMessage::Broadcast(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "page lagging, broadcasts dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(articles) = replies.recv() => PageMessage::Articles(articles),
        };

        let json = match serde_json::to_string(&outgoing) {
            Ok(j) => j,
            Err(_) => continue,
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            break; // Page disconnected
        }
    }

    tracing::debug!("page disconnected");
}

fn handle_text(text: &str, registration: &Arc<Registration>, reply_tx: &mpsc::Sender<CachedArticles>) {
    let command = match Command::parse(text) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, message = %text, "ignoring malformed page message");
            return;
        }
    };

    let registration = Arc::clone(registration);
    let reply_tx = reply_tx.clone();
    tokio::spawn(async move {
        if command != Command::GetCachedArticles {
            registration.dispatch(command, None).await;
            return;
        }

        let (tx, rx) = oneshot::channel();
        registration.dispatch(command, Some(tx)).await;
        if let Ok(articles) = rx.await {
            // Page may have gone away meanwhile.
            let _ = reply_tx.send(articles).await;
        }
    });
}
