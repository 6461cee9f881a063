//! WebSocket link (plain and TLS).
//!
//! Wraps a `tokio-tungstenite` stream behind [`Link`]. Only text frames
//! are surfaced; control frames are handled here and binary frames are
//! dropped with a debug log.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{Connector as WsTlsConnector, MaybeTlsStream, WebSocketStream};

use crate::error::Error;
use crate::tls;
use crate::transport::{Endpoint, Link, Scheme};

/// An established WebSocket link.
pub struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Open a WebSocket link. Timeouts are applied by the caller.
pub async fn connect(endpoint: &Endpoint) -> Result<WebSocketLink, Error> {
    let url = endpoint.url()?;

    let connector = if endpoint.scheme == Scheme::Wss {
        Some(WsTlsConnector::Rustls(tls::client_config(&endpoint.tls)?))
    } else {
        None
    };

    let (stream, response) =
        tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, true, connector)
            .await?;

    tracing::info!(url = %url, status = %response.status(), "WebSocket connected");
    Ok(WebSocketLink { stream })
}

impl WebSocketLink {
    /// Wrap an already-upgraded stream.
    pub fn from_stream(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Link for WebSocketLink {
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Ping(_)) => {
                    // tungstenite queues the pong reply automatically
                    tracing::trace!("WebSocket ping");
                }
                Ok(Message::Close(frame)) => {
                    return Some(Err(match frame {
                        Some(cf) => {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                            Error::Closed {
                                code: Some(u16::from(cf.code)),
                                reason: cf.reason.as_str().to_owned(),
                            }
                        }
                        None => {
                            tracing::info!("WebSocket close frame received (no payload)");
                            Error::Closed {
                                code: None,
                                reason: "close frame without payload".into(),
                            }
                        }
                    }));
                }
                Ok(Message::Binary(bytes)) => {
                    tracing::debug!(len = bytes.len(), "ignoring binary frame");
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client closing".into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            tracing::debug!(error = %e, "WebSocket close failed (non-fatal)");
        }
    }
}
