use std::time::Duration;

use futures::{Sink, SinkExt as _, Stream, StreamExt as _};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use super::{AbortHandle, PUSH_CHANNEL, TransportHandle, TransportMessage};
use crate::errors::{TransportError, TransportFailure};
use crate::event::{InboundMessage, OutboundMessage};

const OUTBOUND_CAPACITY: usize = 16;

/// Maps the backend base URL to its WebSocket endpoint.
pub(crate) fn websocket_url(backend_url: &str) -> Result<String, TransportError> {
    let trimmed = backend_url.trim().trim_end_matches('/');
    let (scheme, rest) = if let Some(rest) = trimmed.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = trimmed.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = trimmed.strip_prefix("ws://") {
        ("ws", rest)
    } else {
        ("ws", trimmed)
    };
    if rest.is_empty() {
        return Err(TransportError::protocol(
            PUSH_CHANNEL,
            "backend url must not be empty",
        ));
    }
    Ok(format!("{scheme}://{rest}/ws"))
}

pub(crate) async fn open(
    url: &str,
    start: OutboundMessage,
    capacity: usize,
    connect_timeout: Duration,
) -> Result<TransportHandle, TransportError> {
    let connect = tokio_tungstenite::connect_async(url);
    let (mut ws, _) = tokio::time::timeout(connect_timeout, connect)
        .await
        .map_err(|_| {
            TransportError::connect(
                PUSH_CHANNEL,
                format!("timed out after {}s connecting to {url}", connect_timeout.as_secs()),
            )
        })?
        .map_err(|e| TransportError::connect(PUSH_CHANNEL, format!("{url}: {e}")))?;

    let frame = start
        .to_wire()
        .map_err(|e| TransportError::protocol(PUSH_CHANNEL, format!("invalid start command: {e}")))?;
    ws.send(Message::Text(frame))
        .await
        .map_err(|e| TransportError::connect(PUSH_CHANNEL, format!("failed to send start: {e}")))?;

    let (tx, rx) = mpsc::channel(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (abort, abort_rx) = AbortHandle::new();
    tokio::spawn(pump(ws, tx, outbound_rx, abort_rx));

    Ok(TransportHandle {
        rx,
        outbound: Some(outbound_tx),
        abort,
        monitor_link: None,
    })
}

/// Relays socket frames to the session and client messages to the socket
/// until the socket ends, fails, or the session aborts.
async fn pump<S>(
    ws: S,
    tx: mpsc::Sender<TransportMessage>,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
    mut abort_rx: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut sink, mut source) = ws.split();
    let mut outbound_open = true;
    loop {
        tokio::select! {
            changed = abort_rx.changed() => {
                if changed.is_err() || *abort_rx.borrow() {
                    debug!("push channel aborted");
                    let _ = sink.close().await;
                    return;
                }
            }
            outbound = outbound_rx.recv(), if outbound_open => {
                let Some(message) = outbound else {
                    outbound_open = false;
                    continue;
                };
                let frame = match message.to_wire() {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, kind = message.describe(), "dropping unserializable outbound message");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(frame)).await {
                    let _ = tx.send(TransportMessage::Failed(TransportFailure::new(PUSH_CHANNEL, err.to_string()))).await;
                    return;
                }
            }
            frame = source.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match InboundMessage::decode(&text) {
                        Ok(message) => {
                            if tx.send(TransportMessage::Push(message)).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => warn!(error = %err, "dropping undecodable push message"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = tx.send(TransportMessage::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = tx.send(TransportMessage::Failed(TransportFailure::new(PUSH_CHANNEL, err.to_string()))).await;
                        return;
                    }
                }
            }
        }
    }
}
