//! Push channel transport.

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use monitor_core::{Error, Result};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

/// Text frames of one open channel. The stream ends when the channel closes;
/// an `Err` item reports a channel error.
pub type FrameStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Opens a new channel.
    async fn connect(&self) -> Result<FrameStream>;
}

/// WebSocket push channel (`ws(s)://<host>/ws`).
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: Url,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<FrameStream> {
        let (stream, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                Error::websocket(format!(
                    "connection timeout after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|error| Error::websocket(error.to_string()))?;
        debug!("websocket handshake with {} -> {}", self.url, response.status());

        // Server -> client only; the write half stays inside the stream so
        // pings are still answered.
        let frames = stream.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                Ok(Message::Frame(_)) => None,
                Err(error) => Some(Err(Error::websocket(error.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
