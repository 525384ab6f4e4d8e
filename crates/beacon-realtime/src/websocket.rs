//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use beacon_core::errors::{RealtimeError, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, instrument};

use crate::transport::{CloseKind, Transport, TransportLink, TransportSignal};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` / `wss://` links, sending the token as a bearer header.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    #[instrument(skip(self, token), fields(has_token = token.is_some()))]
    async fn open(&self, url: &str, token: Option<&str>) -> Result<TransportLink> {
        let mut request = url.into_client_request().map_err(|e| RealtimeError::Transport {
            message: format!("invalid endpoint {url}: {e}"),
            retryable: false,
        })?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                RealtimeError::Transport {
                    message: format!("invalid bearer token: {e}"),
                    retryable: false,
                }
            })?;
            let _ = request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, response) = connect_async(request)
            .await
            .map_err(|e| RealtimeError::transport(format!("WebSocket connect: {e}")))?;
        debug!(status = %response.status(), "websocket upgraded");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(pump(ws, out_rx, in_tx)));

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Shuttle frames between the socket and the link channels until either
/// side goes away.
async fn pump(
    ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    in_tx: mpsc::UnboundedSender<TransportSignal>,
) {
    let (mut sink, mut stream) = ws.split();

    let close = loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(text) = frame else {
                    // Client hung up; nobody is listening for the close.
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    break CloseKind::Abnormal { reason: e.to_string() };
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if in_tx.send(TransportSignal::Frame(text.to_string())).is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => break close_kind(frame),
                Some(Ok(_)) => {}
                Some(Err(e)) => break CloseKind::Abnormal { reason: e.to_string() },
                None => break CloseKind::Abnormal { reason: "stream ended".into() },
            }
        }
    };

    debug!(?close, "websocket closed");
    let _ = in_tx.send(TransportSignal::Closed(close));
}

fn close_kind(frame: Option<CloseFrame>) -> CloseKind {
    match frame {
        Some(frame) => CloseKind::from_code(u16::from(frame.code), frame.reason.to_string()),
        None => CloseKind::Abnormal {
            reason: "closed without status".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn close_without_frame_is_abnormal() {
        assert_matches!(close_kind(None), CloseKind::Abnormal { .. });
    }

    #[test]
    fn policy_close_frame() {
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: "token expired".into(),
        };
        assert_matches!(
            close_kind(Some(frame)),
            CloseKind::Policy { code: 1008, reason } if reason == "token expired"
        );
    }

    #[tokio::test]
    async fn invalid_url_is_not_retryable() {
        let err = WebSocketTransport::new().open("not a url", None).await.unwrap_err();
        assert_matches!(err, RealtimeError::Transport { retryable: false, .. });
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        // Port 9 (discard) is closed on loopback in CI.
        let err = WebSocketTransport::new()
            .open("ws://127.0.0.1:9/ws", Some("t"))
            .await
            .unwrap_err();
        assert_matches!(err, RealtimeError::Transport { retryable: true, .. });
    }
}
