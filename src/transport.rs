//! Realtime transport seam.
//!
//! The subscription engine only talks to [`Connector`] and [`Connection`];
//! [`WebSocketConnector`] is the production implementation.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{Error, Result};

/// Something the transport reported on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
  Frame(String),
  Closed { abnormal: bool, reason: String },
}

/// An open realtime connection.
#[async_trait]
pub trait Connection: Send {
  async fn send(&mut self, frame: String) -> Result<()>;

  /// Next inbound frame or the close that ended the connection.
  async fn recv(&mut self) -> TransportEvent;

  async fn close(&mut self) {}
}

/// Opens realtime connections. A successful `connect` means the
/// connection is open.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(&self, url: &Url, token: Option<String>) -> Result<Box<dyn Connection>>;
}

impl fmt::Debug for dyn Connector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Connector")
  }
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
  async fn connect(&self, url: &Url, token: Option<String>) -> Result<Box<dyn Connection>> {
    let mut request = url.as_str().into_client_request()?;
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| Error::Config(format!("invalid auth token: {}", e)))?;
      request.headers_mut().insert(AUTHORIZATION, value);
    }

    tracing::debug!("Connecting to {}", url);
    let (stream, _) = connect_async(request).await?;
    Ok(Box::new(WebSocketConnection { stream }))
  }
}

struct WebSocketConnection {
  stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
  async fn send(&mut self, frame: String) -> Result<()> {
    self.stream.send(Message::Text(frame.into())).await?;
    Ok(())
  }

  async fn recv(&mut self) -> TransportEvent {
    loop {
      match self.stream.next().await {
        Some(Ok(Message::Text(text))) => return TransportEvent::Frame(text.as_str().to_owned()),
        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
          Ok(text) => return TransportEvent::Frame(text),
          Err(_) => tracing::warn!("Dropping non UTF-8 binary frame"),
        },
        Some(Ok(Message::Close(frame))) => {
          let (abnormal, reason) = match frame {
            Some(f) => (f.code != CloseCode::Normal, format!("{}: {}", f.code, f.reason)),
            None => (false, "closed without status".to_string()),
          };
          return TransportEvent::Closed { abnormal, reason };
        }
        Some(Ok(_)) => continue,
        Some(Err(e)) => {
          return TransportEvent::Closed {
            abnormal: true,
            reason: e.to_string(),
          }
        }
        None => {
          return TransportEvent::Closed {
            abnormal: true,
            reason: "stream ended without close frame".to_string(),
          }
        }
      }
    }
  }

  async fn close(&mut self) {
    if let Err(e) = self.stream.close(None).await {
      tracing::trace!("Close handshake failed: {}", e);
    }
  }
}
