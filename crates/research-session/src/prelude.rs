//! Common imports for running research sessions.
pub use crate::{
    ClientConfig, EventRecord, HistoryEntry, HistoryStore, JsonFileHistoryStore, LogEntry,
    MemoryHistoryStore, ReportSource, ReportType, ResearchConnector, ResearchSession,
    ResearchSettings, SessionError, SessionState, SessionUpdate, TransportConnector,
};
