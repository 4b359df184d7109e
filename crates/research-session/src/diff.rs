//! Structural differences between two JSON documents.
//!
//! The output follows the deep-diff record format (`N`, `D`, `E`, `A`) so the
//! serialized differences stay readable by existing result renderers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single segment of a path into a JSON document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSeg {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

/// Element-level change inside an array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ArrayItem {
    #[serde(rename = "N")]
    New { rhs: Value },
    #[serde(rename = "D")]
    Deleted { lhs: Value },
}

/// One structural difference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Difference {
    /// Property present only on the right-hand side.
    #[serde(rename = "N")]
    New {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<PathSeg>,
        rhs: Value,
    },
    /// Property present only on the left-hand side.
    #[serde(rename = "D")]
    Deleted {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<PathSeg>,
        lhs: Value,
    },
    /// Value changed in place (including a change of JSON kind).
    #[serde(rename = "E")]
    Edited {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<PathSeg>,
        lhs: Value,
        rhs: Value,
    },
    /// Array grew or shrank; `index` is the affected element.
    #[serde(rename = "A")]
    Array {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<PathSeg>,
        index: usize,
        item: ArrayItem,
    },
}

impl Difference {
    pub fn path(&self) -> &[PathSeg] {
        match self {
            Self::New { path, .. }
            | Self::Deleted { path, .. }
            | Self::Edited { path, .. }
            | Self::Array { path, .. } => path,
        }
    }
}

/// Computes the differences turning `lhs` into `rhs`.
///
/// Object keys are visited in sorted order so the result is deterministic.
pub fn diff(lhs: &Value, rhs: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(lhs, rhs, &mut path, &mut out);
    out
}

/// Serializes `diff(lhs, rhs)` to the JSON text carried by `differences` records.
pub fn diff_json(lhs: &Value, rhs: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&diff(lhs, rhs))
}

fn walk(lhs: &Value, rhs: &Value, path: &mut Vec<PathSeg>, out: &mut Vec<Difference>) {
    match (lhs, rhs) {
        (Value::Object(left), Value::Object(right)) => {
            let keys: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
            for key in keys {
                path.push(PathSeg::Key(key.clone()));
                match (left.get(key), right.get(key)) {
                    (Some(a), Some(b)) => walk(a, b, path, out),
                    (Some(a), None) => out.push(Difference::Deleted {
                        path: path.clone(),
                        lhs: a.clone(),
                    }),
                    (None, Some(b)) => out.push(Difference::New {
                        path: path.clone(),
                        rhs: b.clone(),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            let common = left.len().min(right.len());
            for (index, (a, b)) in left.iter().zip(right.iter()).enumerate() {
                path.push(PathSeg::Index(index));
                walk(a, b, path, out);
                path.pop();
            }
            for (index, added) in right.iter().enumerate().skip(common) {
                out.push(Difference::Array {
                    path: path.clone(),
                    index,
                    item: ArrayItem::New { rhs: added.clone() },
                });
            }
            for (index, removed) in left.iter().enumerate().skip(common) {
                out.push(Difference::Array {
                    path: path.clone(),
                    index,
                    item: ArrayItem::Deleted {
                        lhs: removed.clone(),
                    },
                });
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(Difference::Edited {
            path: path.clone(),
            lhs: a.clone(),
            rhs: b.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_documents_have_no_differences() {
        let doc = json!({"a": [1, 2, {"b": null}], "c": "x"});
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn reports_new_deleted_and_edited_keys() {
        let lhs = json!({"keep": 1, "gone": true, "nested": {"v": "a"}});
        let rhs = json!({"keep": 1, "added": [1], "nested": {"v": "b"}});
        let changes = diff(&lhs, &rhs);
        assert_eq!(
            changes,
            vec![
                Difference::New {
                    path: vec![PathSeg::Key("added".into())],
                    rhs: json!([1]),
                },
                Difference::Deleted {
                    path: vec![PathSeg::Key("gone".into())],
                    lhs: json!(true),
                },
                Difference::Edited {
                    path: vec![PathSeg::Key("nested".into()), PathSeg::Key("v".into())],
                    lhs: json!("a"),
                    rhs: json!("b"),
                },
            ]
        );
    }

    #[test]
    fn array_growth_and_element_edits() {
        let lhs = json!({"sections": ["intro"]});
        let rhs = json!({"sections": ["Intro", "body"]});
        let changes = diff(&lhs, &rhs);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0].path(),
            &[PathSeg::Key("sections".into()), PathSeg::Index(0)]
        );
        assert_eq!(
            changes[1],
            Difference::Array {
                path: vec![PathSeg::Key("sections".into())],
                index: 1,
                item: ArrayItem::New { rhs: json!("body") },
            }
        );
    }

    #[test]
    fn kind_change_is_a_single_edit() {
        let changes = diff(&json!({"x": {"y": 1}}), &json!({"x": [1]}));
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], Difference::Edited { .. }));
    }

    #[test]
    fn serialized_form_uses_deep_diff_kinds() {
        let text = diff_json(&json!({"a": 1}), &json!({"a": 2})).expect("json");
        let value: Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(value, json!([{"kind": "E", "path": ["a"], "lhs": 1, "rhs": 2}]));
    }

    #[test]
    fn root_level_edit_omits_path() {
        let text = diff_json(&json!(1), &json!("one")).expect("json");
        let value: Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(value, json!([{"kind": "E", "lhs": 1, "rhs": "one"}]));
    }
}
