//! WebSocket transport for the command channel.
//!
//! Each [`connect`](Transport::connect) performs one handshake and spawns a
//! pump task bridging the socket to a [`Connection`]'s channel pair. The
//! pump exits when either side goes away; reconnecting is the
//! [`CommandChannel`](crate::CommandChannel)'s job, not this module's.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use url::Url;

use crate::channel::{Connection, Frame, Transport};
use crate::error::Error;

/// Production [`Transport`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Connection, Error> {
        tracing::info!(url = %self.url, "connecting command channel");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Frame>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(text) = outgoing else {
                            // Connection handle dropped: close politely.
                            let _ = write.send(tungstenite::Message::Close(None)).await;
                            break;
                        };
                        if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                            let _ = in_tx.send(Frame::Failed(e.to_string()));
                            break;
                        }
                    }
                    incoming = read.next() => {
                        let frame = match incoming {
                            Some(Ok(tungstenite::Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
                            Some(Ok(tungstenite::Message::Close(close))) => {
                                if let Some(ref cf) = close {
                                    tracing::info!(code = %cf.code, reason = %cf.reason, "close frame received");
                                }
                                Frame::Closed
                            }
                            Some(Ok(_)) => continue, // ping/pong/binary: tungstenite answers pings itself
                            Some(Err(e)) => Frame::Failed(e.to_string()),
                            None => Frame::Closed,
                        };
                        let done = !matches!(frame, Frame::Text(_));
                        if in_tx.send(frame).is_err() || done {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("websocket pump exiting");
        });

        Ok(Connection {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
