use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::errors::SessionError;
use crate::event::{ERROR_LABEL, EventRecord, OutboundMessage};
use crate::history::{HistoryEntry, HistoryStore};
use crate::logs::{LogEntry, log_entries};
use crate::normalizer::{AnswerUpdate, Normalized, Normalizer};
use crate::settings::{ResearchSettings, TransportKind, select_transport};
use crate::transport::{
    PushRequest, StreamRequest, TransportConnector, TransportHandle, TransportMessage,
};

/// Live state of a research session.
///
/// Only the controller mutates it; the event timeline is append-only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    question: String,
    answer: String,
    ordered_events: Vec<EventRecord>,
    loading: bool,
    stopped: bool,
    awaiting_feedback: bool,
    transport: Option<TransportKind>,
}

impl SessionState {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn ordered_events(&self) -> &[EventRecord] {
        &self.ordered_events
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }

    /// The backend asked for human feedback that has not been sent yet.
    pub fn awaiting_feedback(&self) -> bool {
        self.awaiting_feedback
    }

    /// Transport chosen by the last `start`, if any.
    pub fn transport(&self) -> Option<&TransportKind> {
        self.transport.as_ref()
    }

    fn append(&mut self, records: impl IntoIterator<Item = EventRecord>) {
        self.ordered_events.extend(records);
    }
}

/// What a single delivery changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUpdate {
    /// Number of records appended to the timeline.
    pub appended: usize,
    /// The transport ended (normally or by failure).
    pub transport_closed: bool,
    /// History entry created by auto-save, if any.
    pub saved: Option<Uuid>,
}

/// Question/answer pair already persisted for the current session.
#[derive(Clone, Debug)]
struct SavedPair {
    question: String,
    answer: String,
}

/// Drives research sessions end to end.
///
/// Owns the session state, the normalizer and the live transport handle.
/// Deliveries are applied one at a time through [`ResearchSession::next_update`].
pub struct ResearchSession {
    config: ClientConfig,
    settings: ResearchSettings,
    connector: Arc<dyn TransportConnector>,
    history: Arc<dyn HistoryStore>,
    session_id: Uuid,
    state: SessionState,
    normalizer: Normalizer,
    active: Option<TransportHandle>,
    saved: Option<SavedPair>,
}

impl ResearchSession {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn TransportConnector>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            settings: ResearchSettings::default(),
            connector,
            history,
            session_id: Uuid::new_v4(),
            state: SessionState::default(),
            normalizer: Normalizer::new(),
            active: None,
            saved: None,
        }
    }

    pub fn with_settings(mut self, settings: ResearchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Settings used by the next `start`.
    pub fn set_settings(&mut self, settings: ResearchSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Identifier of the current session, used in logs and transport requests.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Display log entries derived from the current timeline.
    pub fn log_entries(&self) -> Vec<LogEntry> {
        log_entries(&self.state.ordered_events)
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    /// Starts researching `question`.
    ///
    /// Any transport left over from a previous session is closed first. The
    /// timeline keeps earlier records; call [`ResearchSession::reset`] (or use
    /// [`ResearchSession::new_research`]) for a clean slate. Failing to open
    /// the transport is recorded as an `error` event, not returned.
    pub async fn start(&mut self, question: &str) -> Result<(), SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        self.close_transport();
        self.normalizer.reset();
        self.session_id = Uuid::new_v4();
        self.saved = None;
        self.state.question = question.to_string();
        self.state.answer.clear();
        self.state.stopped = false;
        self.state.awaiting_feedback = false;
        self.state.loading = true;
        self.state.append([EventRecord::question(question)]);

        let host = self.config.resolve_langgraph_host();
        let kind = select_transport(&self.settings, host.as_deref());
        info!(
            session_id = %self.session_id,
            transport = kind.name(),
            report_type = %self.settings.report_type,
            "starting research session"
        );
        self.state.transport = Some(kind.clone());

        let opened = match kind {
            TransportKind::PushChannel => {
                self.connector
                    .open_push(PushRequest {
                        session_id: self.session_id,
                        question: question.to_string(),
                        settings: self.settings.clone(),
                    })
                    .await
            }
            TransportKind::ChunkedStream { host } => {
                self.connector
                    .open_stream(StreamRequest {
                        session_id: self.session_id,
                        question: question.to_string(),
                        report_source: self.settings.report_source,
                        host,
                    })
                    .await
            }
        };

        match opened {
            Ok(handle) => {
                if let Some(link) = &handle.monitor_link {
                    self.state.append([EventRecord::MonitorLink { link: link.clone() }]);
                }
                self.active = Some(handle);
            }
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "failed to open transport");
                self.state
                    .append([EventRecord::error(ERROR_LABEL, err.to_string())]);
                self.state.loading = false;
                self.autosave();
            }
        }
        Ok(())
    }

    /// Resets and starts a fresh session.
    pub async fn new_research(&mut self, question: &str) -> Result<(), SessionError> {
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        self.reset();
        self.start(question).await
    }

    /// Waits for the next delivery from the live transport and applies it.
    ///
    /// Returns `None` when no transport is live.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let handle = self.active.as_mut()?;
        let message = handle.rx.recv().await;
        Some(self.apply(message))
    }

    /// Applies deliveries until the session stops loading or the transport ends.
    pub async fn run_until_idle(&mut self) {
        while self.state.loading {
            if self.next_update().await.is_none() {
                break;
            }
        }
    }

    /// Cancels the live transport. Partial results stay visible.
    pub fn stop(&mut self) {
        info!(session_id = %self.session_id, events = self.state.ordered_events.len(), "stopping research session");
        self.close_transport();
        self.state.loading = false;
        self.state.stopped = true;
        self.state.awaiting_feedback = false;
        self.autosave();
    }

    /// Closes the live transport without marking the session as stopped.
    ///
    /// Meant for a session that already settled; anything still in flight is
    /// dropped and loading ends.
    pub fn disconnect(&mut self) {
        debug!(session_id = %self.session_id, "disconnecting research session");
        self.close_transport();
        self.state.loading = false;
        self.state.awaiting_feedback = false;
        self.autosave();
    }

    /// Clears the session and closes any transport.
    pub fn reset(&mut self) {
        debug!(session_id = %self.session_id, "resetting research session");
        self.close_transport();
        self.normalizer.reset();
        self.state = SessionState::default();
        self.saved = None;
    }

    /// Replaces the session with a history snapshot. No transport is opened.
    ///
    /// Returns `false` and leaves the session untouched when `id` is unknown.
    pub fn resume_from_history(&mut self, id: Uuid) -> Result<bool, SessionError> {
        let Some(entry) = self.history.get(id)? else {
            debug!(%id, "history entry not found");
            return Ok(false);
        };
        self.close_transport();
        self.normalizer.reset();
        self.saved = Some(SavedPair {
            question: entry.question.clone(),
            answer: entry.answer.clone(),
        });
        let HistoryEntry {
            question,
            answer,
            ordered_events,
            ..
        } = entry;
        self.state = SessionState {
            question,
            answer,
            ordered_events,
            ..SessionState::default()
        };
        info!(%id, "resumed session from history");
        Ok(true)
    }

    /// Asks a follow-up question over the live push channel.
    pub async fn send_chat(&mut self, message: &str) -> Result<(), SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let outbound = self.outbound()?;
        outbound
            .send(OutboundMessage::Chat {
                message: message.to_string(),
            })
            .await
            .map_err(|_| SessionError::ChannelClosed { what: "chat" })?;
        self.state.append([EventRecord::question(message)]);
        self.state.loading = true;
        self.state.stopped = false;
        Ok(())
    }

    /// Answers a human-feedback request. `None` accepts the backend's plan.
    pub async fn send_human_feedback(&mut self, content: Option<String>) -> Result<(), SessionError> {
        let outbound = self.outbound()?;
        outbound
            .send(OutboundMessage::HumanFeedback { content })
            .await
            .map_err(|_| SessionError::ChannelClosed {
                what: "human_feedback",
            })?;
        self.state.awaiting_feedback = false;
        Ok(())
    }

    fn outbound(&self) -> Result<tokio::sync::mpsc::Sender<OutboundMessage>, SessionError> {
        self.active
            .as_ref()
            .and_then(|handle| handle.outbound.clone())
            .ok_or_else(|| SessionError::NotConnected {
                active: self.state.transport.clone(),
            })
    }

    fn apply(&mut self, message: Option<TransportMessage>) -> SessionUpdate {
        let before = self.state.ordered_events.len();
        let mut transport_closed = false;
        let normalized = match message {
            Some(TransportMessage::Push(message)) => self.normalizer.on_push(message),
            Some(TransportMessage::Chunk(chunk)) => self.normalizer.on_chunk(chunk),
            Some(TransportMessage::Failed(failure)) => {
                warn!(session_id = %self.session_id, error = %failure, "transport failed");
                transport_closed = true;
                self.normalizer.on_failure(&failure)
            }
            Some(TransportMessage::Closed) | None => {
                debug!(session_id = %self.session_id, "transport closed");
                transport_closed = true;
                Normalized {
                    loading_ended: true,
                    ..Normalized::default()
                }
            }
        };
        self.absorb(normalized);
        if transport_closed {
            self.close_transport();
        }
        let saved = self.autosave();
        SessionUpdate {
            appended: self.state.ordered_events.len() - before,
            transport_closed,
            saved,
        }
    }

    fn absorb(&mut self, normalized: Normalized) {
        let Normalized {
            records,
            answer,
            loading_ended,
            feedback_requested,
        } = normalized;
        self.state.append(records);
        match answer {
            AnswerUpdate::Unchanged => {}
            AnswerUpdate::Append(token) => self.state.answer.push_str(&token),
            AnswerUpdate::Replace(report) => self.state.answer = report,
        }
        if loading_ended {
            self.state.loading = false;
        }
        if feedback_requested {
            self.state.awaiting_feedback = true;
        }
    }

    fn close_transport(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(session_id = %self.session_id, "closing transport");
            handle.close();
        }
    }

    /// Persists the session once it settles with a question, an answer and
    /// at least one event, unless that question/answer pair is already stored.
    fn autosave(&mut self) -> Option<Uuid> {
        let state = &self.state;
        if state.loading
            || state.question.trim().is_empty()
            || state.answer.trim().is_empty()
            || state.ordered_events.is_empty()
        {
            return None;
        }
        if let Some(saved) = &self.saved
            && saved.question == state.question
            && saved.answer == state.answer
        {
            return None;
        }
        match self.history.contains(&state.question, &state.answer) {
            Ok(true) => return None,
            Ok(false) => {}
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "history lookup failed, skipping auto-save");
                return None;
            }
        }
        match self
            .history
            .save(&state.question, &state.answer, &state.ordered_events)
        {
            Ok(entry) => {
                info!(session_id = %self.session_id, id = %entry.id, events = entry.ordered_events.len(), "saved session to history");
                let id = entry.id;
                self.saved = Some(SavedPair {
                    question: entry.question,
                    answer: entry.answer,
                });
                Some(id)
            }
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "auto-save failed");
                None
            }
        }
    }
}
