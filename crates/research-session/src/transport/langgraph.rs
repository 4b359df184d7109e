use std::collections::VecDeque;
use std::pin::{Pin, pin};

use futures::StreamExt as _;
use futures::stream;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::sse::{SseDecoder, SseFrame};
use super::{AbortHandle, CHUNKED_STREAM, StreamRequest, TransportHandle, TransportMessage};
use crate::errors::{TransportError, TransportFailure};
use crate::event::StreamChunk;
use crate::settings::ReportSource;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Builds the studio link used to watch a thread on the orchestration host.
pub(crate) fn monitor_link(host: &str, thread_id: &str) -> String {
    format!("https://smith.langchain.com/studio/thread/{thread_id}?baseUrl={host}")
}

pub(crate) fn run_input(question: &str, report_source: ReportSource) -> Value {
    json!({
        "task": {
            "query": question,
            "source": report_source,
            "max_sections": 3,
            "publish_formats": { "markdown": true, "pdf": false, "docx": false },
            "include_human_feedback": false,
            "follow_guidelines": false,
            "guidelines": [],
            "verbose": true,
        },
        "from": "browser",
    })
}

pub(crate) async fn open(
    client: &reqwest::Client,
    req: StreamRequest,
    capacity: usize,
) -> Result<TransportHandle, TransportError> {
    let host = req.host.trim_end_matches('/');

    let assistants = post_json(
        client,
        &format!("{host}/assistants/search"),
        &json!({ "limit": 10, "offset": 0 }),
    )
    .await?;
    let assistant_id = first_assistant_id(&assistants).ok_or_else(|| {
        TransportError::protocol(CHUNKED_STREAM, "orchestration host has no assistants")
    })?;

    let thread = post_json(client, &format!("{host}/threads"), &json!({})).await?;
    let thread_id = thread
        .get("thread_id")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::protocol(CHUNKED_STREAM, "thread response without thread_id"))?
        .to_string();
    debug!(session_id = %req.session_id, %assistant_id, %thread_id, "created orchestration thread");

    let response = client
        .post(format!("{host}/threads/{thread_id}/runs/stream"))
        .json(&json!({
            "assistant_id": assistant_id,
            "input": run_input(&req.question, req.report_source),
            "stream_mode": "values",
        }))
        .send()
        .await
        .map_err(|e| TransportError::connect(CHUNKED_STREAM, format!("run stream request failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(TransportError::http(CHUNKED_STREAM, status.as_u16(), body));
    }

    let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
    let (tx, rx) = mpsc::channel(capacity);
    let (abort, abort_rx) = AbortHandle::new();
    tokio::spawn(forward_chunks(chunk_stream(bytes_stream), tx, abort_rx));

    Ok(TransportHandle {
        rx,
        outbound: None,
        abort,
        monitor_link: Some(monitor_link(host, &thread_id)),
    })
}

async fn post_json(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value, TransportError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| TransportError::connect(CHUNKED_STREAM, format!("{url}: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(TransportError::http(CHUNKED_STREAM, status.as_u16(), body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| TransportError::protocol(CHUNKED_STREAM, format!("{url}: invalid JSON: {e}")))
}

fn first_assistant_id(assistants: &Value) -> Option<String> {
    assistants
        .as_array()?
        .first()?
        .get("assistant_id")?
        .as_str()
        .map(ToOwned::to_owned)
}

/// Maps one SSE frame of a `values` run stream to a chunk.
///
/// `Ok(None)` means the frame carries no chunk (metadata, keep-alives).
pub(crate) fn frame_to_chunk(frame: &SseFrame) -> Result<Option<StreamChunk>, TransportFailure> {
    match frame.event.as_deref() {
        Some("error") => Err(TransportFailure::new(
            CHUNKED_STREAM,
            error_message(&frame.data),
        )),
        Some("metadata") | Some("end") => Ok(None),
        event => {
            if frame.data.trim().is_empty() {
                return Ok(None);
            }
            let data: Value = serde_json::from_str(&frame.data).map_err(|e| {
                TransportFailure::new(CHUNKED_STREAM, format!("invalid chunk JSON: {e}"))
            })?;
            Ok(Some(StreamChunk {
                event: event.map(ToOwned::to_owned),
                data,
            }))
        }
    }
}

fn error_message(data: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| data.to_string())
}

fn chunk_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<StreamChunk, TransportFailure>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<StreamChunk>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Ok(Some((chunk, state)));
                }
                if state.done {
                    return Ok(None);
                }
                match state.bytes_stream.next().await {
                    Some(Ok(bytes)) => {
                        for frame in state.decoder.push_chunk(&bytes) {
                            if let Some(chunk) = frame_to_chunk(&frame)? {
                                state.pending.push_back(chunk);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(TransportFailure::new(
                            CHUNKED_STREAM,
                            format!("stream read failed: {e}"),
                        ));
                    }
                    None => state.done = true,
                }
            }
        },
    )
}

/// Forwards chunks to the session until the stream ends, fails, or the
/// session aborts. Exactly one terminal message is sent unless aborted.
pub(crate) async fn forward_chunks<S>(
    chunks: S,
    tx: mpsc::Sender<TransportMessage>,
    mut abort_rx: watch::Receiver<bool>,
) where
    S: futures::Stream<Item = Result<StreamChunk, TransportFailure>>,
{
    let mut chunks = pin!(chunks);
    loop {
        tokio::select! {
            changed = abort_rx.changed() => {
                if changed.is_err() || *abort_rx.borrow() {
                    debug!("chunked stream aborted");
                    return;
                }
            }
            next = chunks.next() => {
                let message = match next {
                    Some(Ok(chunk)) => TransportMessage::Chunk(chunk),
                    Some(Err(failure)) => TransportMessage::Failed(failure),
                    None => TransportMessage::Closed,
                };
                let terminal = !matches!(message, TransportMessage::Chunk(_));
                if tx.send(message).await.is_err() || terminal {
                    return;
                }
            }
        }
    }
}
