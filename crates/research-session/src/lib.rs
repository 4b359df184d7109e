//! Client-side core of a streaming research assistant.
//!
//! A [`ResearchSession`] sends a question to a research backend over one of
//! two transports, normalizes everything that comes back into an ordered
//! timeline of [`EventRecord`]s and saves finished sessions to a
//! [`HistoryStore`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use research_session::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let connector = Arc::new(ResearchConnector::new(&config)?);
//! let history = Arc::new(JsonFileHistoryStore::new("research_history.json"));
//!
//! let mut session = ResearchSession::new(config, connector, history)
//!     .with_settings(ResearchSettings::default().report_type(ReportType::DetailedReport));
//! session.start("How do async runtimes schedule tasks?").await?;
//! session.run_until_idle().await;
//!
//! for entry in session.log_entries() {
//!     eprintln!("[{}] {}", entry.header, entry.text);
//! }
//! println!("{}", session.state().answer());
//! # Ok(())
//! # }
//! ```

/// Client configuration and persisted API variables.
pub mod config;
/// Structural JSON diff used between stream chunks.
pub mod diff;
/// Public error types.
pub mod errors;
/// Timeline records and wire messages.
pub mod event;
/// Display grouping over the timeline.
pub mod grouping;
/// History entries and stores.
pub mod history;
/// Log entry projection for display.
pub mod logs;
/// Delivery-to-record normalization.
pub mod normalizer;
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Session controller.
pub mod session;
/// Research settings and transport routing.
pub mod settings;
/// Push channel and chunked stream adapters.
pub mod transport;

pub use config::{ApiVariables, ClientConfig};
pub use errors::{ConfigError, HistoryError, SessionError, TransportError, TransportFailure};
pub use event::{EventRecord, InboundMessage, OutboundMessage, StreamChunk};
pub use grouping::{DisplayBlock, group_events};
pub use history::{HistoryEntry, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
pub use logs::{LogEntry, log_entries};
pub use normalizer::Normalizer;
pub use observability::init_observability;
pub use session::{ResearchSession, SessionState, SessionUpdate};
pub use settings::{ReportSource, ReportType, ResearchSettings, TransportKind, select_transport};
pub use transport::{
    AbortHandle, PushRequest, ResearchConnector, StreamRequest, TransportConnector,
    TransportHandle, TransportMessage,
};
