use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::settings::{ReportSource, ReportType, ResearchSettings};

/// Label used on `error` records produced by this client.
pub const ERROR_LABEL: &str = "error";

/// One entry of a session's ordered event timeline.
///
/// Records are immutable once appended; the timeline only ever grows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventRecord {
    /// A question the user asked (initial query or a follow-up chat).
    Question { content: String },
    /// Backend status event. `content` is the status kind.
    Logs {
        content: String,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    /// Rendered report output.
    Report { output: String },
    /// Serialized structural diff between two consecutive stream chunks.
    Differences { content: String, output: String },
    /// Failure surfaced on the timeline; `content` is the label.
    Error { content: String, output: String },
    /// The backend is asking for human feedback.
    HumanFeedback {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    /// Chat answer from the backend.
    Chat { content: String },
    /// Generated report files.
    Path { output: Value },
    /// Images picked by the backend.
    Images {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    /// Link to a monitoring UI for a chunked-stream session.
    MonitorLink { link: String },
}

impl EventRecord {
    pub fn question(content: impl Into<String>) -> Self {
        Self::Question {
            content: content.into(),
        }
    }

    pub fn error(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            content: label.into(),
            output: message.into(),
        }
    }

    pub fn differences(serialized: impl Into<String>) -> Self {
        Self::Differences {
            content: "differences".to_string(),
            output: serialized.into(),
        }
    }

    /// Wire name of the variant (the `type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Question { .. } => "question",
            Self::Logs { .. } => "logs",
            Self::Report { .. } => "report",
            Self::Differences { .. } => "differences",
            Self::Error { .. } => "error",
            Self::HumanFeedback { .. } => "human_feedback",
            Self::Chat { .. } => "chat",
            Self::Path { .. } => "path",
            Self::Images { .. } => "images",
            Self::MonitorLink { .. } => "monitor_link",
        }
    }

    /// The `content` discriminator, for variants that carry one.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Question { content }
            | Self::Logs { content, .. }
            | Self::Differences { content, .. }
            | Self::Error { content, .. }
            | Self::HumanFeedback { content, .. }
            | Self::Chat { content }
            | Self::Images { content, .. } => Some(content),
            Self::Report { .. } | Self::Path { .. } | Self::MonitorLink { .. } => None,
        }
    }

    /// Human-readable body text, when the variant has one.
    pub fn output_text(&self) -> Option<&str> {
        match self {
            Self::Logs { output, .. }
            | Self::Report { output }
            | Self::Differences { output, .. }
            | Self::Error { output, .. } => Some(output),
            Self::HumanFeedback { output, .. } => output.as_deref(),
            _ => None,
        }
    }

    pub fn metadata(&self) -> Option<&Value> {
        match self {
            Self::Logs { metadata, .. } | Self::Images { metadata, .. } => metadata.as_ref(),
            _ => None,
        }
    }
}

/// A message pushed by the backend over the push channel.
///
/// Decoded at the transport boundary; unknown `type` values become `Unknown`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Logs {
        #[serde(default)]
        content: String,
        #[serde(default)]
        output: String,
        #[serde(default)]
        metadata: Option<Value>,
    },
    Report {
        #[serde(default)]
        output: String,
    },
    Path {
        #[serde(default)]
        output: Value,
    },
    Chat {
        #[serde(default)]
        content: String,
    },
    HumanFeedback {
        #[serde(default)]
        content: String,
        #[serde(default)]
        output: Option<String>,
    },
    Images {
        #[serde(default)]
        content: String,
        #[serde(default)]
        metadata: Option<Value>,
    },
    Error {
        #[serde(default)]
        output: String,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Decodes one text frame from the push channel.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One chunk of the chunked stream. `data` is otherwise opaque.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub data: Value,
}

impl StreamChunk {
    pub fn new(data: Value) -> Self {
        Self { event: None, data }
    }

    /// The nested `data.report` field when it is a string.
    pub fn report(&self) -> Option<&str> {
        self.data.get("report").and_then(Value::as_str)
    }
}

/// Payload of the push-channel `start` command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StartCommand {
    pub task: String,
    pub report_type: ReportType,
    pub report_source: ReportSource,
    pub tone: String,
    pub query_domains: Vec<String>,
    pub source_urls: Vec<String>,
}

impl StartCommand {
    pub fn new(task: impl Into<String>, settings: &ResearchSettings) -> Self {
        Self {
            task: task.into(),
            report_type: settings.report_type,
            report_source: settings.report_source,
            tone: settings.tone.clone(),
            query_domains: settings.query_domains.clone(),
            source_urls: settings.source_urls.clone(),
        }
    }
}

/// Control messages sent from the client to the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Start(StartCommand),
    Chat { message: String },
    HumanFeedback { content: Option<String> },
}

impl OutboundMessage {
    /// Renders the text frame sent over the push channel.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Start(command) => Ok(format!("start {}", serde_json::to_string(command)?)),
            Self::Chat { message } => serde_json::to_string(&serde_json::json!({
                "type": "chat",
                "message": message,
            })),
            Self::HumanFeedback { content } => serde_json::to_string(&serde_json::json!({
                "type": "human_feedback",
                "content": content,
            })),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Chat { .. } => "chat",
            Self::HumanFeedback { .. } => "human_feedback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_type_tag() {
        let value = serde_json::to_value(EventRecord::error(ERROR_LABEL, "boom")).expect("json");
        assert_eq!(
            value,
            serde_json::json!({"type": "error", "content": "error", "output": "boom"})
        );
    }

    #[test]
    fn decodes_logs_message_with_metadata() {
        let msg = InboundMessage::decode(
            r#"{"type":"logs","content":"starting_research","output":"Starting","metadata":{"n":1}}"#,
        )
        .expect("decode");
        assert_eq!(
            msg,
            InboundMessage::Logs {
                content: "starting_research".into(),
                output: "Starting".into(),
                metadata: Some(serde_json::json!({"n": 1})),
            }
        );
    }

    #[test]
    fn unknown_message_type_decodes_to_unknown() {
        let msg = InboundMessage::decode(r#"{"type":"heartbeat","x":1}"#).expect("decode");
        assert_eq!(msg, InboundMessage::Unknown);
    }

    #[test]
    fn message_without_type_is_rejected() {
        assert!(InboundMessage::decode(r#"{"output":"x"}"#).is_err());
    }

    #[test]
    fn chunk_report_requires_string_field() {
        assert_eq!(
            StreamChunk::new(serde_json::json!({"report": "done"})).report(),
            Some("done")
        );
        assert_eq!(
            StreamChunk::new(serde_json::json!({"report": null})).report(),
            None
        );
        assert_eq!(StreamChunk::new(serde_json::json!({})).report(), None);
    }

    #[test]
    fn outbound_wire_shapes() {
        let chat = OutboundMessage::Chat {
            message: "why?".into(),
        };
        let value: Value = serde_json::from_str(&chat.to_wire().expect("wire")).expect("json");
        assert_eq!(value, serde_json::json!({"type": "chat", "message": "why?"}));

        let feedback = OutboundMessage::HumanFeedback {
            content: Some("looks good".into()),
        };
        let value: Value = serde_json::from_str(&feedback.to_wire().expect("wire")).expect("json");
        assert_eq!(
            value,
            serde_json::json!({"type": "human_feedback", "content": "looks good"})
        );

        let start = OutboundMessage::Start(StartCommand::new("rust", &ResearchSettings::default()));
        let wire = start.to_wire().expect("wire");
        let payload = wire.strip_prefix("start ").expect("start prefix");
        let value: Value = serde_json::from_str(payload).expect("json");
        assert_eq!(value["task"], "rust");
        assert_eq!(value["report_type"], "research_report");
        assert_eq!(value["report_source"], "web");
    }

    #[test]
    fn content_accessor_skips_contentless_variants() {
        assert_eq!(
            EventRecord::Report {
                output: "x".into()
            }
            .content(),
            None
        );
        assert_eq!(EventRecord::question("q").content(), Some("q"));
    }
}
