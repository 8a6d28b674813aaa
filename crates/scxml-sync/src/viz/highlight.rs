//! Resolving payloads and configurations to highlight calls.

use serde_json::Value;

use scxml_core::StatePayload;

/// One call into [`DrawnGraph::highlight`](super::DrawnGraph::highlight).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Highlight {
    /// State to (un)highlight.
    pub state_id: String,
    /// `true` for entry, `false` for exit.
    pub entering: bool,
}

/// One highlight per id, in payload order.
pub fn from_payload(payload: &StatePayload, entering: bool) -> Vec<Highlight> {
    payload
        .ids()
        .iter()
        .map(|id| Highlight {
            state_id: id.clone(),
            entering,
        })
        .collect()
}

/// Active state ids from an instance configuration.
///
/// Nested lists (parallel regions) are flattened in order. Entries that are
/// not strings or lists carry no identifier and are skipped.
pub fn ids_from_configuration(configuration: &Value) -> Vec<String> {
    let mut ids = Vec::new();
    collect(configuration, &mut ids);
    ids
}

fn collect(value: &Value, ids: &mut Vec<String>) {
    match value {
        Value::String(id) => ids.push(id.clone()),
        Value::Array(items) => {
            for item in items {
                collect(item, ids);
            }
        }
        _ => {}
    }
}
