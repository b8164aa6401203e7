//! Stream-window predicate: a bounded window over a record stream, committed
//! to by a Merkle root and optionally linked to the previous window.

use super::{require_keys, require_object, PredicateBody};
use crate::digest::{self, HashAlgorithm};
use crate::statement::PredicateType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub fn validate(predicate: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    let owner = "Stream window predicate";

    if let Some(stream) = require_object(predicate, "stream", owner, &mut errors) {
        require_keys(stream, &["id", "source"], "Stream", &mut errors);
    }
    if let Some(window) = require_object(predicate, "window", owner, &mut errors) {
        require_keys(window, &["type", "duration"], "Window", &mut errors);
    }
    if let Some(integrity) = require_object(predicate, "integrity", owner, &mut errors) {
        if let Some(tree) = require_object(integrity, "merkleTree", "Integrity", &mut errors) {
            require_keys(tree, &["algorithm", "leafCount", "root"], "MerkleTree", &mut errors);
        }
    }
    if let Some(collector) = require_object(predicate, "collector", owner, &mut errors) {
        require_keys(collector, &["id"], "Collector", &mut errors);
    }

    errors
}

/// Format errors for the Merkle root and the previous-window root, checked
/// only when the declared tree algorithm is one the digest codec knows.
pub(crate) fn check_root_formats(predicate: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(integrity) = predicate.get("integrity") else {
        return errors;
    };
    let Some(algorithm) = integrity
        .pointer("/merkleTree/algorithm")
        .and_then(Value::as_str)
        .and_then(HashAlgorithm::from_id)
    else {
        return errors;
    };

    if let Some(root) = integrity.pointer("/merkleTree/root").and_then(Value::as_str) {
        if let Err(e) = digest::validate(algorithm, root) {
            errors.push(format!("Invalid Merkle root: {e}"));
        }
    }
    if let Some(prev) = integrity
        .pointer("/chain/previousMerkleRoot")
        .and_then(Value::as_str)
    {
        if let Err(e) = digest::validate(algorithm, prev) {
            errors.push(format!("Invalid previous Merkle root: {e}"));
        }
    }
    errors
}

/// The parts of a stream window the chain verifier links on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WindowLink {
    pub stream_id: String,
    pub root: Option<String>,
    pub previous_root: Option<String>,
}

pub(crate) fn window_link(predicate: &Map<String, Value>) -> Option<WindowLink> {
    let stream_id = predicate.get("stream")?.get("id")?.as_str()?.to_string();
    let integrity = predicate.get("integrity");
    let text = |ptr: &str| {
        integrity
            .and_then(|i| i.pointer(ptr))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Some(WindowLink {
        stream_id,
        root: text("/merkleTree/root"),
        previous_root: text("/chain/previousMerkleRoot"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    Tumbling,
    Sliding,
    Session,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeAlignment {
    WallClock,
    EventTime,
    ProcessingTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    /// Source URI (`mqtt://`, `kafka://`, ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "type")]
    pub window_type: WindowType,
    /// ISO 8601 duration.
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<TimeAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleTreeInfo {
    /// Tree hash algorithm. Kept as text: windows may use algorithms the
    /// digest codec does not implement (`sha3-256`, `blake3`).
    pub algorithm: String,
    pub leaf_count: u64,
    pub root: String,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

/// Link from this window to the one before it on the same stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowChainLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_window_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_window_id: Option<String>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
    pub merkle_tree: MerkleTreeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<WindowChainLink>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamCollector {
    pub id: String,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamWindowPredicate {
    pub stream: Stream,
    pub window: Window,
    pub integrity: Integrity,
    pub collector: StreamCollector,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl PredicateBody for StreamWindowPredicate {
    const KIND: PredicateType = PredicateType::StreamWindow;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> Map<String, Value> {
        json!({
            "stream": {"id": "sensor-7", "source": "mqtt://broker/telemetry"},
            "window": {"type": "tumbling", "duration": "PT1M"},
            "integrity": {"merkleTree": {"algorithm": "sha256", "leafCount": 4, "root": "a".repeat(64)}},
            "collector": {"id": "edge-01"}
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn complete_window_has_no_errors() {
        assert!(validate(&complete()).is_empty());
        assert!(check_root_formats(&complete()).is_empty());
    }

    #[test]
    fn integrity_without_merkle_tree_is_an_error() {
        let mut p = complete();
        p.insert("integrity".into(), json!({}));
        assert_eq!(validate(&p), vec!["Integrity missing 'merkleTree' field"]);
    }

    #[test]
    fn merkle_tree_requires_root_algorithm_and_leaf_count() {
        let mut p = complete();
        p.insert("integrity".into(), json!({"merkleTree": {}}));
        let errors = validate(&p);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("'root'")));
    }

    #[test]
    fn zero_leaf_count_is_structurally_fine() {
        let mut p = complete();
        p["integrity"]["merkleTree"]["leafCount"] = json!(0);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn missing_top_level_fields() {
        let errors = validate(&Map::new());
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| e.starts_with("Stream window predicate missing")));
    }

    #[test]
    fn malformed_roots_are_reported() {
        let mut p = complete();
        p["integrity"]["merkleTree"]["root"] = json!("abc");
        p["integrity"]["chain"] = json!({"previousMerkleRoot": "Z".repeat(64)});
        let errors = check_root_formats(&p);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn unknown_tree_algorithm_skips_format_check() {
        let mut p = complete();
        p["integrity"]["merkleTree"]["algorithm"] = json!("blake3");
        p["integrity"]["merkleTree"]["root"] = json!("not-hex");
        assert!(check_root_formats(&p).is_empty());
    }

    #[test]
    fn window_link_extracts_roots() {
        let mut p = complete();
        p["integrity"]["chain"] = json!({"previousMerkleRoot": "b".repeat(64)});
        let link = window_link(&p).unwrap();
        assert_eq!(link.stream_id, "sensor-7");
        assert_eq!(link.root.as_deref(), Some("a".repeat(64).as_str()));
        assert_eq!(link.previous_root.as_deref(), Some("b".repeat(64).as_str()));
    }

    #[test]
    fn typed_round_trip() {
        let typed = StreamWindowPredicate::from_map(&complete()).unwrap();
        assert_eq!(typed.window.window_type, WindowType::Tumbling);
        assert_eq!(typed.integrity.merkle_tree.leaf_count, 4);
        assert_eq!(typed.to_map().unwrap(), complete());
    }
}
