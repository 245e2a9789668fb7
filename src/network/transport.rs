use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::core::{Error, Result};
use crate::protocol::Inbound;

/// An open, message-oriented link to the station
pub trait Link: Send + 'static {
    /// Writes one binary message
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Waits for the next message; `None` once the peer has closed the link
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no message.
    fn next_message(&mut self) -> BoxFuture<'_, Option<Result<Inbound>>>;
}

/// Opens links to the station
pub trait Connector: Send + 'static {
    /// Link type produced by a successful handshake
    type Link: Link;

    /// Starts a handshake; the returned future resolves once the link is usable
    fn connect(&self) -> BoxFuture<'static, Result<Self::Link>>;
}

/// Websocket connector for the station broadcast endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    subprotocol: Option<String>,
}

impl WsConnector {
    /// Creates a connector for `url`, requesting `subprotocol` when given
    pub fn new(url: impl Into<String>, subprotocol: Option<String>) -> Self {
        WsConnector {
            url: url.into(),
            subprotocol,
        }
    }
}

impl Connector for WsConnector {
    type Link = WsLink;

    fn connect(&self) -> BoxFuture<'static, Result<WsLink>> {
        let url = self.url.clone();
        let subprotocol = self.subprotocol.clone();
        async move {
            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| Error::socket(format!("Invalid station url {}: {}", url, e)))?;
            if let Some(protocol) = subprotocol {
                let value = HeaderValue::from_str(&protocol)
                    .map_err(|e| Error::socket(format!("Invalid subprotocol {}: {}", protocol, e)))?;
                request.headers_mut().insert("Sec-WebSocket-Protocol", value);
            }

            let (stream, response) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| Error::socket(format!("Handshake with {} failed: {}", url, e)))?;
            debug!(url = %url, status = %response.status(), "websocket handshake complete");

            Ok(WsLink { stream })
        }
        .boxed()
    }
}

/// Websocket link produced by [`WsConnector`]
pub struct WsLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Link for WsLink {
    fn send(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        async move {
            self.stream
                .send(Message::Binary(frame.to_vec()))
                .await
                .map_err(Error::socket)
        }
        .boxed()
    }

    fn next_message(&mut self) -> BoxFuture<'_, Option<Result<Inbound>>> {
        async move {
            loop {
                let message = match self.stream.next().await? {
                    Ok(message) => message,
                    Err(e) => return Some(Err(Error::socket(e))),
                };
                match message {
                    Message::Binary(data) => return Some(Ok(Inbound::Binary(Bytes::from(data)))),
                    Message::Text(text) => return Some(Ok(Inbound::Text(text))),
                    Message::Close(frame) => {
                        debug!(?frame, "station closed the websocket");
                        return None;
                    }
                    // Pongs are queued by tungstenite and flushed on the next write
                    other => trace!(?other, "ignoring control message"),
                }
            }
        }
        .boxed()
    }
}
