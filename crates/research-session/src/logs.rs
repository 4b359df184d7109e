use serde::Serialize;
use serde_json::Value;

use crate::event::EventRecord;
use crate::grouping::{DisplayBlock, group_events, is_status_kind};

/// A display-ready log line derived from the timeline. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogEntry {
    pub header: String,
    pub text: String,
    pub metadata: Option<Value>,
    pub key: String,
}

impl LogEntry {
    fn from_record(record: &EventRecord, key: String) -> Self {
        Self {
            header: record.content().unwrap_or_default().to_string(),
            text: record.output_text().unwrap_or_default().to_string(),
            metadata: record.metadata().cloned(),
            key,
        }
    }
}

/// Projects the timeline into log entries.
///
/// Accordion items yield one entry each, keyed by kind, content and position
/// in the group. Standalone records appear only for the status kinds. Input
/// order is kept.
pub fn log_entries(events: &[EventRecord]) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for block in group_events(events) {
        match block {
            DisplayBlock::Accordion { items } => {
                for (index, item) in items.into_iter().enumerate() {
                    let key = format!(
                        "{}-{}-{}",
                        item.kind(),
                        item.content().unwrap_or_default(),
                        index
                    );
                    entries.push(LogEntry::from_record(item, key));
                }
            }
            DisplayBlock::Single(record) => {
                if let Some(content) = record.content().filter(|c| is_status_kind(c)) {
                    let key = format!("{}-{}", record.kind(), content);
                    entries.push(LogEntry::from_record(record, key));
                }
            }
            DisplayBlock::Report { .. }
            | DisplayBlock::Sources { .. }
            | DisplayBlock::Subqueries { .. } => {}
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ERROR_LABEL;

    fn log(content: &str, output: &str) -> EventRecord {
        EventRecord::Logs {
            content: content.into(),
            output: output.into(),
            metadata: None,
        }
    }

    #[test]
    fn identical_sub_events_in_one_group_get_distinct_keys() {
        let events = vec![
            log("researching", "Searching the web"),
            log("researching", "Searching the web"),
        ];
        let entries = log_entries(&events);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "logs-researching-0");
        assert_eq!(entries[1].key, "logs-researching-1");
        assert_eq!(entries[0].header, entries[1].header);
        assert_eq!(entries[0].text, "Searching the web");
    }

    #[test]
    fn only_status_kinds_survive_outside_groups() {
        let events = vec![
            EventRecord::question("q"),
            log("starting_research", "Starting research"),
            EventRecord::differences("[]"),
            EventRecord::Report {
                output: "body".into(),
            },
            log("generated_answer", "Done"),
            EventRecord::error(ERROR_LABEL, "socket closed"),
            EventRecord::MonitorLink {
                link: "https://example.com".into(),
            },
        ];
        let entries = log_entries(&events);
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "logs-starting_research",
                "logs-generated_answer",
                "error-error"
            ]
        );
        assert_eq!(entries[2].text, "socket closed");
    }

    #[test]
    fn ordering_follows_the_timeline() {
        let events = vec![
            log("planning_research", "Planning"),
            log("agent_generated", "Picked an agent"),
            log("starting_research", "Starting"),
        ];
        let headers: Vec<String> = log_entries(&events).into_iter().map(|e| e.header).collect();
        assert_eq!(
            headers,
            vec!["planning_research", "agent_generated", "starting_research"]
        );
    }

    #[test]
    fn metadata_is_carried_over() {
        let events = vec![EventRecord::Logs {
            content: "researching".into(),
            output: "x".into(),
            metadata: Some(serde_json::json!({"url": "https://a.dev"})),
        }];
        assert_eq!(
            log_entries(&events)[0].metadata,
            Some(serde_json::json!({"url": "https://a.dev"}))
        );
    }
}
