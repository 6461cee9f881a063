//! TCP + TLS link with newline-delimited JSON frames.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::Error;
use crate::tls;
use crate::transport::{Endpoint, Link};

/// Upper bound on a single frame (one line).
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A line-framed link over any byte stream. Production links use
/// [`TlsStream`]; tests can frame an in-memory duplex.
pub struct LineLink<S> {
    framed: Framed<S, LinesCodec>,
}

/// An established TCP + TLS link.
pub type TcpTlsLink = LineLink<TlsStream<TcpStream>>;

impl<S> LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN)),
        }
    }
}

/// Open a TCP + TLS link. Timeouts are applied by the caller.
pub async fn connect(endpoint: &Endpoint) -> Result<TcpTlsLink, Error> {
    let authority = endpoint.authority();
    let connector = TlsConnector::from(tls::client_config(&endpoint.tls)?);
    let server_name = tls::server_name(&endpoint.host)?;

    let tcp = TcpStream::connect(&authority)
        .await
        .map_err(|e| Error::Connect {
            endpoint: authority.clone(),
            reason: e.to_string(),
        })?;
    tcp.set_nodelay(true)?;
    tracing::debug!(endpoint = %authority, "TCP connected, starting TLS handshake");

    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Tls(format!("handshake with {authority} failed: {e}")))?;

    tracing::info!(endpoint = %authority, "TCP+TLS connected");
    Ok(LineLink::new(stream))
}

#[async_trait]
impl<S> Link for LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_text(&mut self, text: String) -> Result<(), Error> {
        if text.contains('\n') {
            return Err(Error::Codec("frame contains a newline".into()));
        }
        self.framed.send(text).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, Error>> {
        loop {
            match self.framed.next().await? {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => return Some(Ok(line)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = SinkExt::<String>::close(&mut self.framed).await {
            tracing::debug!(error = %e, "TCP link close failed (non-fatal)");
        }
    }
}
