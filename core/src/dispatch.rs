//! Outbound side effects produced by sink handlers.
//!
//! The engine only collects these; matching targets against connected clients and
//! sending them belongs to the transport layer.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Which clients a dispatch is meant for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TargetSelector {
    #[default]
    All,
    ClientIds { client_ids: Vec<String> },
    Group { group_id: String },
}

impl TargetSelector {
    /// Build from the usual `mode` / `clientIds` / `groupId` config triple.
    ///
    /// Client ids are a comma separated list. An unknown mode, or a mode whose
    /// parameter is empty, targets everyone.
    pub fn from_config(mode: &str, client_ids: &str, group_id: &str) -> Self {
        match mode {
            "clientIds" => {
                let ids: Vec<String> = client_ids
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect();
                if ids.is_empty() {
                    TargetSelector::All
                } else {
                    TargetSelector::ClientIds { client_ids: ids }
                }
            }
            "group" if !group_id.trim().is_empty() => TargetSelector::Group {
                group_id: group_id.trim().to_string(),
            },
            _ => TargetSelector::All,
        }
    }
}

/// One side effect emitted during the sink pass of a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    /// Node whose sink handler produced this
    pub node_id: String,
    pub target: TargetSelector,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_from_config() {
        assert_eq!(TargetSelector::from_config("all", "", ""), TargetSelector::All);
        assert_eq!(
            TargetSelector::from_config("clientIds", " a, ,b ", ""),
            TargetSelector::ClientIds {
                client_ids: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(TargetSelector::from_config("clientIds", " , ", ""), TargetSelector::All);
        assert_eq!(
            TargetSelector::from_config("group", "", "stage-left"),
            TargetSelector::Group {
                group_id: "stage-left".into()
            }
        );
        assert_eq!(TargetSelector::from_config("group", "", "  "), TargetSelector::All);
    }

    #[test]
    fn test_selector_json() {
        let json = serde_json::to_value(TargetSelector::ClientIds {
            client_ids: vec!["c1".into()],
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"mode": "clientIds", "clientIds": ["c1"]}));
    }
}
