//! Transport adapters feeding a research session.
//!
//! A live transport is a background task that delivers [`TransportMessage`]s
//! over a bounded channel. The session controller owns the returned
//! [`TransportHandle`] and closes it on stop, reset or a new start; once closed
//! the receiver is gone, so late deliveries fail at the sender.

mod langgraph;
pub(crate) mod sse;
mod websocket;

use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;
use crate::errors::{ConfigError, TransportError, TransportFailure};
use crate::event::{InboundMessage, OutboundMessage, StartCommand, StreamChunk};
use crate::settings::{ReportSource, ResearchSettings};

/// Name used for the push channel in logs and errors.
pub const PUSH_CHANNEL: &str = "websocket";
/// Name used for the chunked stream in logs and errors.
pub const CHUNKED_STREAM: &str = "langgraph";

/// One delivery from a live transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportMessage {
    Push(InboundMessage),
    Chunk(StreamChunk),
    /// The transport failed; nothing follows.
    Failed(TransportFailure),
    /// The transport ended normally; nothing follows.
    Closed,
}

/// Handle used to cancel a transport's background task.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Creates a handle and the receiver the background task watches.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// Requests cancellation. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A live transport owned by the session controller.
#[derive(Debug)]
pub struct TransportHandle {
    pub rx: mpsc::Receiver<TransportMessage>,
    /// Present for transports that accept client messages (the push channel).
    pub outbound: Option<mpsc::Sender<OutboundMessage>>,
    pub abort: AbortHandle,
    /// Human-facing monitoring link, when the transport has one.
    pub monitor_link: Option<String>,
}

impl TransportHandle {
    /// Stops the background task and refuses any further delivery.
    pub fn close(mut self) {
        self.abort.abort();
        self.rx.close();
    }
}

/// Request to open the push channel.
#[derive(Clone, Debug, PartialEq)]
pub struct PushRequest {
    pub session_id: uuid::Uuid,
    pub question: String,
    pub settings: ResearchSettings,
}

impl PushRequest {
    pub fn start_command(&self) -> OutboundMessage {
        OutboundMessage::Start(StartCommand::new(self.question.clone(), &self.settings))
    }
}

/// Request to open a chunked stream on an orchestration host.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub session_id: uuid::Uuid,
    pub question: String,
    pub report_source: ReportSource,
    pub host: String,
}

/// Opens transports for the session controller.
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    async fn open_push(&self, req: PushRequest) -> Result<TransportHandle, TransportError>;

    async fn open_stream(&self, req: StreamRequest) -> Result<TransportHandle, TransportError>;
}

/// Production connector: WebSocket push channel and LangGraph chunked stream.
pub struct ResearchConnector {
    http: reqwest::Client,
    backend_url: String,
    connect_timeout: std::time::Duration,
    buffer_capacity: usize,
}

impl ResearchConnector {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;
        Ok(Self {
            http,
            backend_url: config.backend_url.clone(),
            connect_timeout: config.connect_timeout,
            buffer_capacity: config.stream_buffer_capacity,
        })
    }
}

#[async_trait::async_trait]
impl TransportConnector for ResearchConnector {
    async fn open_push(&self, req: PushRequest) -> Result<TransportHandle, TransportError> {
        let url = websocket::websocket_url(&self.backend_url)?;
        tracing::debug!(session_id = %req.session_id, %url, "opening push channel");
        websocket::open(
            &url,
            req.start_command(),
            self.buffer_capacity,
            self.connect_timeout,
        )
        .await
    }

    async fn open_stream(&self, req: StreamRequest) -> Result<TransportHandle, TransportError> {
        tracing::debug!(session_id = %req.session_id, host = %req.host, "opening chunked stream");
        langgraph::open(&self.http, req, self.buffer_capacity).await
    }
}
