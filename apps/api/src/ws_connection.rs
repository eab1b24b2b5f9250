use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use lumora_application::EditConnection;
use lumora_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::debug;

/// Edit-session transport over an axum WebSocket.
///
/// The socket is split so a broadcast from another session can write while
/// this session's read loop is parked on the next frame.
pub struct WebSocketEditConnection {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WebSocketEditConnection {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl EditConnection for WebSocketEditConnection {
    async fn send(&self, message: String) -> AppResult<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(message.into()))
            .await
            .map_err(|error| AppError::Internal(format!("failed to write socket frame: {error}")))
    }

    async fn receive(&self) -> Option<String> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(text),
                    Err(_) => debug!("ignoring non utf-8 binary frame"),
                },
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(Message::Close(_)) => return None,
                Err(error) => {
                    debug!(error = %error, "socket read failed");
                    return None;
                }
            }
        }
    }

    async fn close(&self) {
        if let Err(error) = self.sink.lock().await.close().await {
            debug!(error = %error, "socket close failed");
        }
    }
}
