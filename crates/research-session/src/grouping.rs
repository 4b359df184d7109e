//! Grouping pass over the ordered event timeline.
//!
//! Related low-level records are clustered into display blocks: runs of agent
//! activity become accordion groups, source URLs become a source list and
//! streamed report tokens merge into one report.

use serde_json::Value;

use crate::event::EventRecord;

/// Status kinds shown as standalone log entries.
pub const STATUS_KINDS: [&str; 4] = [
    "generated_answer",
    "starting_research",
    "planning_research",
    "error",
];

const ADDED_SOURCE_URL: &str = "added_source_url";
const SUBQUERIES: &str = "subqueries";

pub fn is_status_kind(content: &str) -> bool {
    STATUS_KINDS.contains(&content)
}

/// A source the backend picked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLink {
    /// Host name, or the raw URL when it does not parse.
    pub name: String,
    pub url: String,
}

impl SourceLink {
    pub fn from_url(url: &str) -> Self {
        let name = reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(ToOwned::to_owned))
            .unwrap_or_else(|| url.to_string());
        Self {
            name,
            url: url.to_string(),
        }
    }
}

/// One display block borrowed from the timeline.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplayBlock<'a> {
    /// A record shown on its own.
    Single(&'a EventRecord),
    /// Consecutive report outputs, concatenated.
    Report { content: String },
    /// Consecutive agent-activity logs.
    Accordion { items: Vec<&'a EventRecord> },
    /// Consecutive `added_source_url` logs.
    Sources { items: Vec<SourceLink> },
    /// The sub-queries the backend planned.
    Subqueries { metadata: Option<&'a Value> },
}

/// Groups `events` into display blocks, preserving order.
pub fn group_events(events: &[EventRecord]) -> Vec<DisplayBlock<'_>> {
    let mut blocks: Vec<DisplayBlock<'_>> = Vec::new();
    for record in events {
        match record {
            EventRecord::Report { output } => match blocks.last_mut() {
                Some(DisplayBlock::Report { content }) => content.push_str(output),
                _ => blocks.push(DisplayBlock::Report {
                    content: output.clone(),
                }),
            },
            EventRecord::Logs {
                content, output, ..
            } if content == ADDED_SOURCE_URL => {
                let link = SourceLink::from_url(output);
                match blocks.last_mut() {
                    Some(DisplayBlock::Sources { items }) => items.push(link),
                    _ => blocks.push(DisplayBlock::Sources { items: vec![link] }),
                }
            }
            EventRecord::Logs {
                content, metadata, ..
            } if content == SUBQUERIES => blocks.push(DisplayBlock::Subqueries {
                metadata: metadata.as_ref(),
            }),
            EventRecord::Logs { content, .. } if content.is_empty() || is_status_kind(content) => {
                blocks.push(DisplayBlock::Single(record))
            }
            EventRecord::Logs { .. } => match blocks.last_mut() {
                Some(DisplayBlock::Accordion { items }) => items.push(record),
                _ => blocks.push(DisplayBlock::Accordion {
                    items: vec![record],
                }),
            },
            _ => blocks.push(DisplayBlock::Single(record)),
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(content: &str, output: &str) -> EventRecord {
        EventRecord::Logs {
            content: content.into(),
            output: output.into(),
            metadata: None,
        }
    }

    #[test]
    fn consecutive_agent_logs_share_an_accordion() {
        let events = vec![
            log("starting_research", "Starting"),
            log("researching", "Looking up A"),
            log("researching", "Looking up B"),
            log("planning_research", "Planning"),
            log("scraping", "Scraping"),
        ];
        let blocks = group_events(&events);
        assert_eq!(blocks.len(), 4);
        assert!(matches!(blocks[0], DisplayBlock::Single(_)));
        assert!(matches!(&blocks[1], DisplayBlock::Accordion { items } if items.len() == 2));
        assert!(matches!(blocks[2], DisplayBlock::Single(_)));
        assert!(matches!(&blocks[3], DisplayBlock::Accordion { items } if items.len() == 1));
    }

    #[test]
    fn report_tokens_merge_until_interrupted() {
        let events = vec![
            EventRecord::Report {
                output: "Hello ".into(),
            },
            EventRecord::Report {
                output: "world".into(),
            },
            EventRecord::question("follow up"),
            EventRecord::Report {
                output: "again".into(),
            },
        ];
        let blocks = group_events(&events);
        assert_eq!(
            blocks[0],
            DisplayBlock::Report {
                content: "Hello world".into()
            }
        );
        assert_eq!(
            blocks[2],
            DisplayBlock::Report {
                content: "again".into()
            }
        );
    }

    #[test]
    fn source_urls_collect_host_names() {
        let events = vec![
            log(ADDED_SOURCE_URL, "https://docs.rs/tokio/latest"),
            log(ADDED_SOURCE_URL, "not a url"),
        ];
        let blocks = group_events(&events);
        assert_eq!(
            blocks,
            vec![DisplayBlock::Sources {
                items: vec![
                    SourceLink {
                        name: "docs.rs".into(),
                        url: "https://docs.rs/tokio/latest".into(),
                    },
                    SourceLink {
                        name: "not a url".into(),
                        url: "not a url".into(),
                    },
                ]
            }]
        );
    }

    #[test]
    fn subqueries_keep_metadata() {
        let events = vec![EventRecord::Logs {
            content: SUBQUERIES.into(),
            output: String::new(),
            metadata: Some(serde_json::json!(["a", "b"])),
        }];
        let blocks = group_events(&events);
        assert!(matches!(
            blocks[0],
            DisplayBlock::Subqueries { metadata: Some(_) }
        ));
    }
}
