use tracing::{debug, warn};

use crate::diff::diff_json;
use crate::errors::TransportFailure;
use crate::event::{ERROR_LABEL, EventRecord, InboundMessage, StreamChunk};

/// Placeholder the orchestration host puts in `data.report` before the real
/// report exists.
pub const REPORT_PLACEHOLDER: &str = "Full report content here";

/// How a delivery changes the session answer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AnswerUpdate {
    #[default]
    Unchanged,
    /// Append a streamed report token.
    Append(String),
    /// Replace the answer with a complete report.
    Replace(String),
}

/// Result of normalizing one delivery.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Normalized {
    /// Records to append, in order.
    pub records: Vec<EventRecord>,
    pub answer: AnswerUpdate,
    /// The delivery ends the loading state.
    pub loading_ended: bool,
    /// The backend asked for human feedback.
    pub feedback_requested: bool,
}

/// Turns transport deliveries into event records.
///
/// Holds the per-session "previous chunk" used to diff consecutive stream
/// chunks; call [`Normalizer::reset`] when a new session starts.
#[derive(Debug, Default)]
pub struct Normalizer {
    previous_chunk: Option<StreamChunk>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.previous_chunk = None;
    }

    pub fn previous_chunk(&self) -> Option<&StreamChunk> {
        self.previous_chunk.as_ref()
    }

    /// Normalizes one chunk of the chunked stream.
    ///
    /// A real report ends loading. Any other chunk is diffed against its
    /// predecessor; the first chunk has none and yields nothing.
    pub fn on_chunk(&mut self, chunk: StreamChunk) -> Normalized {
        let mut out = Normalized::default();
        match chunk.report().filter(|report| *report != REPORT_PLACEHOLDER) {
            Some(report) => {
                out.records.push(EventRecord::Report {
                    output: report.to_string(),
                });
                out.answer = AnswerUpdate::Replace(report.to_string());
                out.loading_ended = true;
            }
            None => {
                if let Some(previous) = &self.previous_chunk {
                    match diff_json(&previous.data, &chunk.data) {
                        Ok(serialized) => out.records.push(EventRecord::differences(serialized)),
                        Err(err) => {
                            warn!(error = %err, "failed to serialize chunk differences");
                            out.records.push(EventRecord::error(
                                ERROR_LABEL,
                                format!("failed to serialize chunk differences: {err}"),
                            ));
                        }
                    }
                }
            }
        }
        self.previous_chunk = Some(chunk);
        out
    }

    /// Normalizes one push-channel message. One message, at most one record.
    pub fn on_push(&mut self, message: InboundMessage) -> Normalized {
        let mut out = Normalized::default();
        let record = match message {
            InboundMessage::Logs {
                content,
                output,
                metadata,
            } => EventRecord::Logs {
                content,
                output,
                metadata,
            },
            InboundMessage::Report { output } => {
                out.answer = AnswerUpdate::Append(output.clone());
                EventRecord::Report { output }
            }
            InboundMessage::Path { output } => {
                out.loading_ended = true;
                EventRecord::Path { output }
            }
            InboundMessage::Chat { content } => {
                out.answer = AnswerUpdate::Replace(content.clone());
                out.loading_ended = true;
                EventRecord::Chat { content }
            }
            InboundMessage::HumanFeedback { content, output } => {
                out.feedback_requested = content == "request";
                EventRecord::HumanFeedback { content, output }
            }
            InboundMessage::Images { content, metadata } => {
                EventRecord::Images { content, metadata }
            }
            InboundMessage::Error { output } => {
                out.loading_ended = true;
                EventRecord::error(ERROR_LABEL, output)
            }
            InboundMessage::Unknown => {
                debug!("dropping push message of unknown type");
                return out;
            }
        };
        out.records.push(record);
        out
    }

    /// Normalizes an in-band transport failure into a single `error` record.
    pub fn on_failure(&self, failure: &TransportFailure) -> Normalized {
        Normalized {
            records: vec![EventRecord::error(ERROR_LABEL, failure.message.clone())],
            answer: AnswerUpdate::Unchanged,
            loading_ended: true,
            feedback_requested: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(data: serde_json::Value) -> StreamChunk {
        StreamChunk::new(data)
    }

    #[test]
    fn first_chunk_never_produces_differences() {
        let mut normalizer = Normalizer::new();
        let out = normalizer.on_chunk(chunk(json!({"task": {"query": "q"}})));
        assert!(out.records.is_empty());
        assert!(!out.loading_ended);
        assert!(normalizer.previous_chunk().is_some());
    }

    #[test]
    fn diff_then_report_sequence() {
        let mut normalizer = Normalizer::new();
        let a = chunk(json!({"report": REPORT_PLACEHOLDER, "sections": []}));
        let b = chunk(json!({"report": REPORT_PLACEHOLDER, "sections": ["intro"]}));
        let c = chunk(json!({"report": "# Final", "sections": ["intro"]}));

        let out_a = normalizer.on_chunk(a);
        assert!(out_a.records.is_empty());
        assert!(!out_a.loading_ended);

        let out_b = normalizer.on_chunk(b);
        assert_eq!(out_b.records.len(), 1);
        let EventRecord::Differences { output, .. } = &out_b.records[0] else {
            panic!("expected differences, got {:?}", out_b.records[0]);
        };
        let parsed: serde_json::Value = serde_json::from_str(output).expect("diff json");
        assert_eq!(
            parsed,
            json!([{"kind": "A", "path": ["sections"], "index": 0, "item": {"kind": "N", "rhs": "intro"}}])
        );
        assert!(!out_b.loading_ended);

        let out_c = normalizer.on_chunk(c);
        assert_eq!(
            out_c.records,
            vec![EventRecord::Report {
                output: "# Final".into()
            }]
        );
        assert!(out_c.loading_ended);
        assert_eq!(out_c.answer, AnswerUpdate::Replace("# Final".into()));
    }

    #[test]
    fn previous_chunk_advances_even_on_report() {
        let mut normalizer = Normalizer::new();
        normalizer.on_chunk(chunk(json!({"report": "early"})));
        let out = normalizer.on_chunk(chunk(json!({"step": 2})));
        assert_eq!(out.records.len(), 1);
        assert!(matches!(out.records[0], EventRecord::Differences { .. }));
    }

    #[test]
    fn reset_forgets_previous_chunk() {
        let mut normalizer = Normalizer::new();
        normalizer.on_chunk(chunk(json!({"step": 1})));
        normalizer.reset();
        assert!(normalizer.on_chunk(chunk(json!({"step": 2}))).records.is_empty());
    }

    #[test]
    fn push_messages_map_one_to_one() {
        let mut normalizer = Normalizer::new();
        let out = normalizer.on_push(InboundMessage::Logs {
            content: "planning_research".into(),
            output: "Planning".into(),
            metadata: None,
        });
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].content(), Some("planning_research"));

        let out = normalizer.on_push(InboundMessage::Report {
            output: "tok".into(),
        });
        assert_eq!(out.answer, AnswerUpdate::Append("tok".into()));
        assert!(!out.loading_ended);
    }

    #[test]
    fn path_message_ends_loading() {
        let mut normalizer = Normalizer::new();
        let out = normalizer.on_push(InboundMessage::Path {
            output: json!({"pdf": "outputs/report.pdf"}),
        });
        assert!(out.loading_ended);
        assert!(matches!(out.records[..], [EventRecord::Path { .. }]));
    }

    #[test]
    fn feedback_request_is_flagged() {
        let mut normalizer = Normalizer::new();
        let out = normalizer.on_push(InboundMessage::HumanFeedback {
            content: "request".into(),
            output: Some("Any changes to the plan?".into()),
        });
        assert!(out.feedback_requested);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn unknown_push_message_yields_nothing() {
        let mut normalizer = Normalizer::new();
        assert_eq!(
            normalizer.on_push(InboundMessage::Unknown),
            Normalized::default()
        );
    }

    #[test]
    fn chat_reply_replaces_answer_and_ends_loading() {
        let mut normalizer = Normalizer::new();
        let out = normalizer.on_push(InboundMessage::Chat {
            content: "It is memory safe.".into(),
        });
        assert_eq!(out.answer, AnswerUpdate::Replace("It is memory safe.".into()));
        assert!(out.loading_ended);
        assert_eq!(
            out.records,
            vec![EventRecord::Chat {
                content: "It is memory safe.".into()
            }]
        );
    }

    #[test]
    fn failure_becomes_single_error_record() {
        let normalizer = Normalizer::new();
        let out = normalizer.on_failure(&TransportFailure::new("langgraph", "connection reset"));
        assert_eq!(
            out.records,
            vec![EventRecord::error(ERROR_LABEL, "connection reset")]
        );
        assert!(out.loading_ended);
    }
}
