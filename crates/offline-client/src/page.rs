use futures_util::{SinkExt, StreamExt};
use offline_cache::{Broadcast, Command, PageMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A page context connected to the proxy's message channel.
pub struct PageChannel {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PageChannel {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        tracing::debug!(url, "connected to message channel");
        Ok(Self { socket })
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(command)?;
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }

    /// Next protocol message, skipping control frames and anything that does
    /// not parse. `None` once the proxy closes the channel.
    pub async fn next(&mut self) -> Option<PageMessage> {
        while let Some(frame) = self.socket.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => tracing::warn!(error = %e, "unexpected message from proxy"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "message channel error");
                    return None;
                }
            }
        }
        None
    }

    /// Wait for the message that settles `command`. Broadcasts about other
    /// URLs (from other pages) are skipped.
    pub async fn outcome(&mut self, command: &Command) -> Option<PageMessage> {
        while let Some(message) = self.next().await {
            if settles(command, &message) {
                return Some(message);
            }
            tracing::debug!(?message, "ignoring unrelated message");
        }
        None
    }
}

/// Whether `message` is the answer to `command`.
pub fn settles(command: &Command, message: &PageMessage) -> bool {
    match (command, message) {
        (Command::CacheArticle { url }, PageMessage::Broadcast(b)) => match b {
            Broadcast::ArticleCached { url: u } | Broadcast::CacheError { url: u, .. } => u == url,
            _ => false,
        },
        (Command::UncacheArticle { url }, PageMessage::Broadcast(b)) => match b {
            Broadcast::ArticleUncached { url: u } | Broadcast::CacheError { url: u, .. } => {
                u == url
            }
            _ => false,
        },
        (Command::ClearCache, PageMessage::Broadcast(Broadcast::CacheCleared)) => true,
        (Command::GetCachedArticles, PageMessage::Articles(_)) => true,
        _ => false,
    }
}
