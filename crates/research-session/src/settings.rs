use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Kind of report the backend should produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    ResearchReport,
    DetailedReport,
    ResourceReport,
    OutlineReport,
    CustomReport,
    SubtopicReport,
    Deep,
    /// Multi-agent mode, served by an external orchestration host.
    MultiAgents,
}

impl ReportType {
    pub const ALL: [ReportType; 8] = [
        Self::ResearchReport,
        Self::DetailedReport,
        Self::ResourceReport,
        Self::OutlineReport,
        Self::CustomReport,
        Self::SubtopicReport,
        Self::Deep,
        Self::MultiAgents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResearchReport => "research_report",
            Self::DetailedReport => "detailed_report",
            Self::ResourceReport => "resource_report",
            Self::OutlineReport => "outline_report",
            Self::CustomReport => "custom_report",
            Self::SubtopicReport => "subtopic_report",
            Self::Deep => "deep",
            Self::MultiAgents => "multi_agents",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ConfigError::invalid("report_type", format!("unknown report type `{s}`")))
    }
}

/// Where the backend gathers its sources from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    #[default]
    Web,
    Local,
    Hybrid,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Local => "local",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "local" => Ok(Self::Local),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(ConfigError::invalid(
                "report_source",
                format!("unknown report source `{s}`"),
            )),
        }
    }
}

/// User-chosen research settings sent with each session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSettings {
    pub report_type: ReportType,
    pub report_source: ReportSource,
    pub tone: String,
    #[serde(default)]
    pub query_domains: Vec<String>,
    #[serde(default)]
    pub source_urls: Vec<String>,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            report_type: ReportType::default(),
            report_source: ReportSource::default(),
            tone: "Objective".to_string(),
            query_domains: Vec::new(),
            source_urls: Vec::new(),
        }
    }
}

impl ResearchSettings {
    pub fn report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = report_type;
        self
    }

    pub fn report_source(mut self, report_source: ReportSource) -> Self {
        self.report_source = report_source;
        self
    }

    pub fn tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }
}

/// Which transport a session runs over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// WebSocket push channel to the research backend.
    PushChannel,
    /// Chunked HTTP stream from an orchestration host.
    ChunkedStream { host: String },
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PushChannel => "push_channel",
            Self::ChunkedStream { .. } => "chunked_stream",
        }
    }
}

/// Picks the transport for a session.
///
/// Multi-agent mode with a configured host uses the chunked stream; everything
/// else, including multi-agent mode without a host, uses the push channel.
pub fn select_transport(settings: &ResearchSettings, host: Option<&str>) -> TransportKind {
    let host = host.map(str::trim).filter(|h| !h.is_empty());
    match (settings.report_type, host) {
        (ReportType::MultiAgents, Some(host)) => TransportKind::ChunkedStream {
            host: host.trim_end_matches('/').to_string(),
        },
        (ReportType::MultiAgents, None) => {
            tracing::warn!("multi_agents selected without an orchestration host, using push channel");
            TransportKind::PushChannel
        }
        _ => TransportKind::PushChannel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_agents_with_host_selects_chunked_stream() {
        let settings = ResearchSettings::default().report_type(ReportType::MultiAgents);
        assert_eq!(
            select_transport(&settings, Some("http://graph.local:8123/")),
            TransportKind::ChunkedStream {
                host: "http://graph.local:8123".into()
            }
        );
    }

    #[test]
    fn multi_agents_without_host_falls_back_to_push_channel() {
        let settings = ResearchSettings::default().report_type(ReportType::MultiAgents);
        assert_eq!(select_transport(&settings, None), TransportKind::PushChannel);
        assert_eq!(
            select_transport(&settings, Some("   ")),
            TransportKind::PushChannel
        );
    }

    #[test]
    fn other_report_types_use_push_channel_even_with_host() {
        for report_type in [
            ReportType::ResearchReport,
            ReportType::DetailedReport,
            ReportType::Deep,
            ReportType::OutlineReport,
        ] {
            let settings = ResearchSettings::default().report_type(report_type);
            assert_eq!(
                select_transport(&settings, Some("http://graph.local")),
                TransportKind::PushChannel,
                "{report_type}"
            );
        }
    }

    #[test]
    fn report_type_round_trips_through_wire_names() {
        let parsed: ReportType = serde_json::from_str("\"multi_agents\"").expect("parse");
        assert_eq!(parsed, ReportType::MultiAgents);
        assert_eq!(parsed.as_str(), "multi_agents");
    }

    #[test]
    fn settings_parse_from_cli_spellings() {
        assert_eq!("multi-agents".parse::<ReportType>(), Ok(ReportType::MultiAgents));
        assert_eq!(" Deep ".parse::<ReportType>(), Ok(ReportType::Deep));
        assert_eq!("hybrid".parse::<ReportSource>(), Ok(ReportSource::Hybrid));
        assert!("essay".parse::<ReportType>().is_err());
        assert!("offline".parse::<ReportSource>().is_err());
    }
}
